use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::codec::{self, check_table};
use crate::registry::Driver;
use crate::KvsEngine;
use crate::KvsError;
use crate::Result;

/// `SledStore` is a key-value store using `sled` as the backend.
///
/// Each table is a sled `Tree`, so keys iterate in ascending byte order.
pub struct SledStore {
    db: sled::Db,
    trees: HashMap<Vec<u8>, sled::Tree>,
}

impl KvsEngine for SledStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn register(&mut self, table: &[u8]) -> Result<()> {
        let table = check_table(table)?;
        if !self.trees.contains_key(table) {
            let tree = self.db.open_tree(table)?;
            debug!("sled tree {} ready", codec::display(table));
            self.trees.insert(table.to_vec(), tree);
        }
        Ok(())
    }

    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        let tree = self.tree(table)?;
        tree.insert(key, value)?;
        tree.flush()?;
        Ok(())
    }

    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.trees.get(table) {
            Some(tree) => Ok(tree.get(key)?.map(|ivec| ivec.to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        if let Some(tree) = self.trees.get(table) {
            if tree.remove(key)?.is_some() {
                tree.flush()?;
            }
        }
        Ok(())
    }

    fn count(&mut self, table: &[u8]) -> Result<usize> {
        let mut n = 0;
        if let Some(tree) = self.trees.get(table) {
            for item in tree.iter().keys() {
                item?;
                n += 1;
            }
        }
        Ok(n)
    }

    fn iterate(
        &mut self,
        table: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        if let Some(tree) = self.trees.get(table) {
            for item in tree.iter() {
                let (k, v) = item?;
                if !visit(&k[..], &v[..]) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.trees.clear();
        self.db.flush()?;
        Ok(())
    }
}

impl SledStore {
    /// Create a new `SledStore` from a `sled::Db`.
    pub fn new(db: sled::Db) -> Self {
        SledStore {
            db,
            trees: HashMap::new(),
        }
    }

    /// Opens or creates a sled database in the directory `path`.
    pub fn open(path: &Path) -> Result<SledStore> {
        let db = sled::Config::default().path(path).open()?;
        Ok(SledStore::new(db))
    }

    /// The underlying sled database.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Driver for the registry.
    pub fn driver() -> Driver {
        Driver {
            name: "sled",
            default_location: "data/sled",
            open: open_sled,
        }
    }

    fn tree(&self, table: &[u8]) -> Result<&sled::Tree> {
        self.trees
            .get(table)
            .ok_or_else(|| KvsError::TableNotFound(codec::display(table).into_owned()))
    }
}

fn open_sled(path: &Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(SledStore::open(path)?))
}

use std::collections::HashSet;
use std::path::Path;

use ::rocksdb::{ColumnFamily, IteratorMode, Options, DB, DEFAULT_COLUMN_FAMILY_NAME};
use log::debug;

use crate::codec::{self, check_table, namespace};
use crate::registry::Driver;
use crate::{KvsEngine, KvsError, Result};

/// `RocksStore` maps each table to a RocksDB column family.
///
/// Column family names are the hex rendering of the table bytes, so any
/// table name is representable.
pub struct RocksStore {
    db: DB,
    tables: HashSet<Vec<u8>>,
}

impl RocksStore {
    /// Opens or creates a RocksDB directory at `path`, reopening every
    /// column family already present.
    pub fn open(path: &Path) -> Result<RocksStore> {
        std::fs::create_dir_all(path)?;
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = DB::list_cf(&opts, path)
            .unwrap_or_else(|_| vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()]);
        let db = DB::open_cf(&opts, path, cfs)?;
        Ok(RocksStore {
            db,
            tables: HashSet::new(),
        })
    }

    /// The underlying RocksDB handle.
    pub fn db(&self) -> &DB {
        &self.db
    }

    /// Driver for the registry.
    pub fn driver() -> Driver {
        Driver {
            name: "rocksdb",
            default_location: "data/rocksdb",
            open: open_rocksdb,
        }
    }

    fn cf(&self, table: &[u8]) -> Option<&ColumnFamily> {
        if !self.tables.contains(table) {
            return None;
        }
        self.db.cf_handle(&namespace(table))
    }
}

fn open_rocksdb(path: &Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(RocksStore::open(path)?))
}

impl KvsEngine for RocksStore {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn register(&mut self, table: &[u8]) -> Result<()> {
        let name = namespace(check_table(table)?);
        if self.db.cf_handle(&name).is_none() {
            self.db.create_cf(&name, &Options::default())?;
            debug!("rocksdb column family {} created", name);
        }
        self.tables.insert(table.to_vec());
        Ok(())
    }

    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .cf(table)
            .ok_or_else(|| KvsError::TableNotFound(codec::display(table).into_owned()))?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.cf(table) {
            Some(cf) => Ok(self.db.get_cf(cf, key)?),
            None => Ok(None),
        }
    }

    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        if let Some(cf) = self.cf(table) {
            self.db.delete_cf(cf, key)?;
        }
        Ok(())
    }

    fn count(&mut self, table: &[u8]) -> Result<usize> {
        let mut n = 0;
        if let Some(cf) = self.cf(table) {
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
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
        if let Some(cf) = self.cf(table) {
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (k, v) = item?;
                if !visit(&k[..], &v[..]) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tables.clear();
        self.db.flush()?;
        Ok(())
    }
}

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::codec::{self, check_table};
use crate::registry::Driver;
use crate::{KvsEngine, KvsError, Result};

/// `MemoryStore` keeps every table in an ordered in-memory map.
///
/// Nothing is persisted; the storage location passed by the registry is
/// ignored. Useful for tests and throwaway processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Driver for the registry.
    pub fn driver() -> Driver {
        Driver {
            name: "memory",
            default_location: "",
            open: open_memory,
        }
    }
}

fn open_memory(_: &Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(MemoryStore::new()))
}

impl KvsEngine for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn register(&mut self, table: &[u8]) -> Result<()> {
        self.tables.entry(check_table(table)?.to_vec()).or_default();
        Ok(())
    }

    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        let map = self
            .tables
            .get_mut(table)
            .ok_or_else(|| KvsError::TableNotFound(codec::display(table).into_owned()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.get(table).and_then(|m| m.get(key).cloned()))
    }

    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        if let Some(map) = self.tables.get_mut(table) {
            map.remove(key);
        }
        Ok(())
    }

    fn count(&mut self, table: &[u8]) -> Result<usize> {
        Ok(self.tables.get(table).map_or(0, BTreeMap::len))
    }

    fn iterate(
        &mut self,
        table: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        if let Some(map) = self.tables.get(table) {
            for (k, v) in map {
                if !visit(k.as_slice(), v.as_slice()) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tables.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_requires_register() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.put(b"t", b"k", b"v"),
            Err(KvsError::TableNotFound(_))
        ));
        store.register(b"t").unwrap();
        store.put(b"t", b"k", b"v").unwrap();
        assert_eq!(store.get(b"t", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn tables_are_isolated() {
        let mut store = MemoryStore::new();
        store.register(b"a").unwrap();
        store.register(b"b").unwrap();
        store.put(b"a", b"k", b"1").unwrap();
        assert_eq!(store.get(b"b", b"k").unwrap(), None);
        assert_eq!(store.count(b"a").unwrap(), 1);
        assert_eq!(store.count(b"b").unwrap(), 0);
    }

    #[test]
    fn iterates_in_key_order() {
        let mut store = MemoryStore::new();
        store.register(b"t").unwrap();
        for k in [b"c", b"a", b"b"] {
            store.put(b"t", k, k).unwrap();
        }
        let mut seen = Vec::new();
        store
            .iterate(b"t", &mut |k, _| {
                seen.push(k.to_vec());
                true
            })
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}

//! The convenience entry point over a [`Registry`].
//!
//! [`Gkv`] owns one active instance and remembers the table it was opened
//! with. Error policy is intentionally asymmetric: [`Gkv::put`] and
//! [`Gkv::count`] fail before [`Gkv::open`], while [`Gkv::get`] returns an
//! empty value, both before `open` and when the engine reports an error.
//! Use [`Gkv::lookup`] to tell those cases apart.

use std::path::Path;

use log::{debug, info, warn};

use crate::codec;
use crate::registry::Registry;
use crate::{KvsEngine, KvsError, Result};

/// Facade forwarding to the instance built from a [`Registry`].
///
/// ```rust
/// # use gkv::{Gkv, MemoryStore, Registry};
/// let mut db = Gkv::new(Registry::with(MemoryStore::driver()));
/// db.open(b"users", None)?;
/// db.put(b"users", b"alice", b"30")?;
/// assert_eq!(db.get(b"users", b"alice"), b"30");
/// assert_eq!(db.count(b"users")?, 1);
/// db.close()?;
/// # Ok::<(), gkv::KvsError>(())
/// ```
pub struct Gkv {
    registry: Registry,
    db: Option<Box<dyn KvsEngine>>,
    table: Option<Vec<u8>>,
}

impl Gkv {
    /// Creates a facade with nothing open yet.
    pub fn new(registry: Registry) -> Self {
        Gkv {
            registry,
            db: None,
            table: None,
        }
    }

    /// The registry this facade opens from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to register another driver
    /// before the next `open`.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Opens the registered driver at `path` (or its default location) and
    /// registers `table` on it.
    ///
    /// An instance that is already open is closed first.
    pub fn open(&mut self, table: &[u8], path: Option<&Path>) -> Result<()> {
        self.close()?;
        let mut db = self.registry.open(path)?;
        if let Err(e) = db.register(table) {
            if let Err(close_err) = db.close() {
                warn!("closing {} after failed register: {}", db.name(), close_err);
            }
            return Err(e);
        }
        info!(
            "gkv opened with driver {}, table {}",
            db.name(),
            codec::display(table)
        );
        self.db = Some(db);
        self.table = Some(table.to_vec());
        Ok(())
    }

    /// Releases the active instance. Succeeds trivially when nothing is open.
    pub fn close(&mut self) -> Result<()> {
        self.table = None;
        match self.db.take() {
            Some(mut db) => {
                debug!("closing driver {}", db.name());
                db.close()
            }
            None => Ok(()),
        }
    }

    /// Whether an instance is open.
    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// The table passed to the last successful `open`.
    pub fn table(&self) -> Option<&[u8]> {
        self.table.as_deref()
    }

    /// Name of the active driver.
    pub fn driver_name(&self) -> Option<&'static str> {
        self.db.as_ref().map(|db| db.name())
    }

    /// Sets the value for a table and key.
    pub fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.active()?.put(table, key, value)
    }

    /// Retrieves the value for a table and key.
    ///
    /// Returns an empty vector when the key is absent, when the service is
    /// not started, and when the engine fails.
    pub fn get(&mut self, table: &[u8], key: &[u8]) -> Vec<u8> {
        match self.lookup(table, key) {
            Ok(value) => value.unwrap_or_default(),
            Err(KvsError::ServiceNotStarted) => Vec::new(),
            Err(e) => {
                warn!("get {} failed: {}", codec::display(key), e);
                Vec::new()
            }
        }
    }

    /// Retrieves the value for a table and key, keeping absence and failure
    /// distinct.
    pub fn lookup(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.active()?.get(table, key)
    }

    /// Removes a key. Removing a missing key is not an error.
    pub fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        self.active()?.delete(table, key)
    }

    /// Returns the number of keys in a table.
    pub fn count(&mut self, table: &[u8]) -> Result<usize> {
        self.active()?.count(table)
    }

    /// Visits every pair of a table until `visit` returns `false`.
    pub fn iterate<F>(&mut self, table: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.active()?.iterate(table, &mut visit)
    }

    fn active(&mut self) -> Result<&mut (dyn KvsEngine + 'static)> {
        self.db.as_deref_mut().ok_or(KvsError::ServiceNotStarted)
    }
}

impl Drop for Gkv {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing on drop: {}", e);
        }
    }
}

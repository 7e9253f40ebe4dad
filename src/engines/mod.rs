use crate::Result;

/// The `KvsEngine` trait
///
/// Every storage backend implements this contract. Tables must be registered
/// on an instance before they accept writes.
pub trait KvsEngine: Send {
    /// Name of the driver that produced this instance.
    fn name(&self) -> &'static str;
    /// Create a table if it doesn't already exist. Safe to call repeatedly.
    fn register(&mut self, table: &[u8]) -> Result<()>;
    /// Set the value for a table and key, replacing any previous value.
    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()>;
    /// Get the value for a table and key. If the key does not exist, return `None`.
    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Remove a key. Removing a missing key is not an error.
    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()>;
    /// Number of keys in a table.
    ///
    /// Walks live state where the engine keeps no count, so concurrent
    /// writers can make the result drift from any single point in time.
    fn count(&mut self, table: &[u8]) -> Result<usize>;
    /// Visit every pair in the table until `visit` returns `false`.
    fn iterate(&mut self, table: &[u8], visit: &mut dyn FnMut(&[u8], &[u8]) -> bool)
        -> Result<()>;
    /// Release all engine resources.
    fn close(&mut self) -> Result<()>;
}

mod kvs;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocksdb;
mod sled;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use kvs::KvStore;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksStore;
pub use self::sled::SledStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

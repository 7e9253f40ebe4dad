// use this code to force every public item to have documentation:
#![deny(missing_docs)]
//! A uniform key-value interface over interchangeable storage engines.
//!
//! Register one backend [`Driver`] in a [`Registry`], open it through the
//! [`Gkv`] facade, and read or write raw bytes in named tables without
//! depending on which engine sits underneath.

pub mod codec;
mod engines;
mod errors;
mod facade;
pub mod registry;

pub use engines::KvsEngine;
pub use engines::{KvStore, MemoryStore, SledStore};
#[cfg(feature = "rocksdb")]
pub use engines::RocksStore;
#[cfg(feature = "sqlite")]
pub use engines::SqliteStore;
pub use errors::KvsError;
pub use errors::Result;
pub use facade::Gkv;
pub use registry::{Driver, Registry};

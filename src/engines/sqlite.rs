use std::collections::HashMap;
use std::path::Path;

use futures::TryStreamExt;
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::runtime::{Builder, Runtime};

use crate::codec::{self, derive_id, sql_identifier};
use crate::registry::Driver;
use crate::{KvsEngine, KvsError, Result};

/// `SqliteStore` keeps each table as a SQLite table of `(id, k, v)` rows.
///
/// `id` is the fixed-width digest of the key and is the primary key; `k` and
/// `v` hold the original bytes as BLOBs. sqlx is async, so the store owns a
/// current-thread tokio runtime and blocks on it; do not call it from inside
/// another runtime.
pub struct SqliteStore {
    pool: SqlitePool,
    tables: HashMap<Vec<u8>, String>,
    // dropped last, after the pool
    runtime: Runtime,
}

impl SqliteStore {
    /// Opens or creates the database file at `path`.
    pub fn open(path: &Path) -> Result<SqliteStore> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let runtime = Builder::new_current_thread().enable_all().build()?;

        info!("Opening SQLite store at: {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = runtime.block_on(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;

        Ok(SqliteStore {
            runtime,
            pool,
            tables: HashMap::new(),
        })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Driver for the registry.
    pub fn driver() -> Driver {
        Driver {
            name: "sqlite",
            default_location: "data/data.db",
            open: open_sqlite,
        }
    }

    fn ident(&self, table: &[u8]) -> Result<&str> {
        self.tables
            .get(table)
            .map(String::as_str)
            .ok_or_else(|| KvsError::TableNotFound(codec::display(table).into_owned()))
    }
}

fn open_sqlite(path: &Path) -> Result<Box<dyn KvsEngine>> {
    Ok(Box::new(SqliteStore::open(path)?))
}

impl KvsEngine for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn register(&mut self, table: &[u8]) -> Result<()> {
        let ident = sql_identifier(table)?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT NOT NULL PRIMARY KEY,
                k BLOB NOT NULL,
                v BLOB NOT NULL
            )",
            ident
        );
        self.runtime
            .block_on(sqlx::query(&sql).execute(&self.pool))?;
        debug!("sqlite table {} ready", ident);
        self.tables.insert(table.to_vec(), ident);
        Ok(())
    }

    fn put(&mut self, table: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        let sql = format!("REPLACE INTO {} (id, k, v) VALUES (?, ?, ?)", self.ident(table)?);
        self.runtime.block_on(
            sqlx::query(&sql)
                .bind(derive_id(key))
                .bind(key)
                .bind(value)
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn get(&mut self, table: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>> {
        let ident = match self.tables.get(table) {
            Some(ident) => ident,
            None => return Ok(None),
        };
        let sql = format!("SELECT v FROM {} WHERE id = ? LIMIT 1", ident);
        let value = self.runtime.block_on(
            sqlx::query_scalar::<_, Vec<u8>>(&sql)
                .bind(derive_id(key))
                .fetch_optional(&self.pool),
        )?;
        Ok(value)
    }

    fn delete(&mut self, table: &[u8], key: &[u8]) -> Result<()> {
        let ident = match self.tables.get(table) {
            Some(ident) => ident,
            None => return Ok(()),
        };
        let sql = format!("DELETE FROM {} WHERE id = ?", ident);
        self.runtime.block_on(
            sqlx::query(&sql)
                .bind(derive_id(key))
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn count(&mut self, table: &[u8]) -> Result<usize> {
        let ident = match self.tables.get(table) {
            Some(ident) => ident,
            None => return Ok(0),
        };
        let sql = format!("SELECT COUNT(*) FROM {}", ident);
        let n = self
            .runtime
            .block_on(sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool))?;
        Ok(n as usize)
    }

    fn iterate(
        &mut self,
        table: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let ident = match self.tables.get(table) {
            Some(ident) => ident,
            None => return Ok(()),
        };
        let sql = format!("SELECT k, v FROM {} ORDER BY k", ident);
        let pool = &self.pool;
        self.runtime.block_on(async {
            let mut rows = sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(&sql).fetch(pool);
            while let Some((k, v)) = rows.try_next().await? {
                if !visit(k.as_slice(), v.as_slice()) {
                    break;
                }
            }
            Ok::<(), KvsError>(())
        })
    }

    fn close(&mut self) -> Result<()> {
        self.tables.clear();
        self.runtime.block_on(self.pool.close());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn injection_in_table_name_is_inert() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("kv.db")).unwrap();
        let evil: &[u8] = b"t\"; DROP TABLE victim; --";
        store.register(b"victim").unwrap();
        store.put(b"victim", b"k", b"v").unwrap();
        store.register(evil).unwrap();
        store.put(evil, b"k", b"other").unwrap();
        assert_eq!(store.get(b"victim", b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get(evil, b"k").unwrap(), Some(b"other".to_vec()));
        store.close().unwrap();
    }

    #[test]
    fn reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.register(b"users").unwrap();
            store.put(b"users", b"alice", b"30").unwrap();
            assert!(!store.pool().is_closed());
            store.close().unwrap();
            assert!(store.pool().is_closed());
        }
        let mut store = SqliteStore::open(&path).unwrap();
        store.register(b"users").unwrap();
        assert_eq!(store.count(b"users").unwrap(), 1);
        assert_eq!(store.get(b"users", b"alice").unwrap(), Some(b"30".to_vec()));
        store.close().unwrap();
    }

    #[test]
    fn non_utf8_table_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("kv.db")).unwrap();
        assert!(matches!(
            store.register(&[0xff, 0x00]),
            Err(KvsError::InvalidTable(_))
        ));
        store.close().unwrap();
    }
}

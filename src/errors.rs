/// Error types for gkv
#[derive(Debug)]
pub enum KvsError {
    /// IO error
    Io(std::io::Error),
    /// Serde error
    Serde(serde_json::Error),
    /// Sled error
    Sled(sled::Error),
    /// Base64 decode error
    Decode(base64::DecodeError),
    /// SQLite error
    #[cfg(feature = "sqlite")]
    Sqlx(sqlx::Error),
    /// RocksDB error
    #[cfg(feature = "rocksdb")]
    Rocks(rocksdb::Error),
    /// No driver has been registered
    NoDriver,
    /// Facade used before `open`
    ServiceNotStarted,
    /// Empty table name
    EmptyTable,
    /// Table name the backend cannot represent
    InvalidTable(String),
    /// Table was never registered on this instance
    TableNotFound(String),
    /// Other error
    Other(String),
}

impl From<std::io::Error> for KvsError {
    fn from(err: std::io::Error) -> KvsError {
        KvsError::Io(err)
    }
}

impl From<serde_json::Error> for KvsError {
    fn from(err: serde_json::Error) -> KvsError {
        KvsError::Serde(err)
    }
}

impl From<sled::Error> for KvsError {
    fn from(err: sled::Error) -> KvsError {
        KvsError::Sled(err)
    }
}

impl From<base64::DecodeError> for KvsError {
    fn from(err: base64::DecodeError) -> KvsError {
        KvsError::Decode(err)
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for KvsError {
    fn from(err: sqlx::Error) -> KvsError {
        KvsError::Sqlx(err)
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for KvsError {
    fn from(err: rocksdb::Error) -> KvsError {
        KvsError::Rocks(err)
    }
}

impl From<String> for KvsError {
    fn from(value: String) -> Self {
        KvsError::Other(value)
    }
}

impl std::fmt::Display for KvsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            KvsError::Io(e) => write!(f, "IO error: {}", e),
            KvsError::Serde(e) => write!(f, "Serde error: {}", e),
            KvsError::Sled(e) => write!(f, "Sled error: {}", e),
            KvsError::Decode(e) => write!(f, "Decode error: {}", e),
            #[cfg(feature = "sqlite")]
            KvsError::Sqlx(e) => write!(f, "SQLite error: {}", e),
            #[cfg(feature = "rocksdb")]
            KvsError::Rocks(e) => write!(f, "RocksDB error: {}", e),
            KvsError::NoDriver => write!(f, "no driver available"),
            KvsError::ServiceNotStarted => write!(f, "the db service is not started"),
            KvsError::EmptyTable => write!(f, "table name must not be empty"),
            KvsError::InvalidTable(s) => write!(f, "Invalid table: {}", s),
            KvsError::TableNotFound(s) => write!(f, "Table not found: {}", s),
            KvsError::Other(s) => write!(f, "Unknown error: {}", s),
        }
    }
}

impl std::error::Error for KvsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KvsError::Io(e) => Some(e),
            KvsError::Serde(e) => Some(e),
            KvsError::Sled(e) => Some(e),
            KvsError::Decode(e) => Some(e),
            #[cfg(feature = "sqlite")]
            KvsError::Sqlx(e) => Some(e),
            #[cfg(feature = "rocksdb")]
            KvsError::Rocks(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for gkv
pub type Result<T> = std::result::Result<T, KvsError>;

//! Conversions between raw byte sequences and the representations each
//! backend stores natively.
//!
//! Keys, values and table names are opaque bytes everywhere in the public
//! API. Backends that persist text (the JSON log of [`KvStore`]) go through
//! [`encode`]/[`decode`], which round-trip arbitrary bytes exactly. Backends
//! without a per-table keyspace or with fixed-width identifiers use
//! [`derive_id`], [`sql_identifier`] and [`namespace`].
//!
//! [`KvStore`]: crate::KvStore

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{KvsError, Result};

/// Rejects empty table names.
pub fn check_table(table: &[u8]) -> Result<&[u8]> {
    if table.is_empty() {
        return Err(KvsError::EmptyTable);
    }
    Ok(table)
}

/// Encodes bytes as standard base64 text.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes text produced by [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}

/// Deterministic fixed-length identifier for a key: the lowercase hex BLAKE3
/// digest, always 64 characters.
pub fn derive_id(key: &[u8]) -> String {
    blake3::hash(key).to_hex().to_string()
}

/// Renders a table as a quoted SQL identifier.
///
/// The table must be valid UTF-8 and free of NUL; embedded double quotes are
/// doubled so the name can never terminate the identifier early.
pub fn sql_identifier(table: &[u8]) -> Result<String> {
    let name = std::str::from_utf8(check_table(table)?)
        .map_err(|_| KvsError::InvalidTable(display(table).into_owned()))?;
    if name.contains('\0') {
        return Err(KvsError::InvalidTable(name.escape_default().to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Lowercase hex rendering of a table, for engines whose namespaces must be
/// plain strings.
pub fn namespace(table: &[u8]) -> String {
    table.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Lossy text rendering for logs and terminal output. Not reversible.
pub fn display(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// `#[serde(with = "...")]` adapter storing byte fields as base64 strings.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Writes the bytes as a base64 string.
    pub fn serialize<T, S>(bytes: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(bytes.as_ref()))
    }

    /// Reads a base64 string back into bytes.
    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::decode(&text).map_err(serde::de::Error::custom)
    }
}

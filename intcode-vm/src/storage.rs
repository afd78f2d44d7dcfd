//! # Session State Storage
//!
//! Persistent key-value storage for suspended sessions.
//! Unlike a live [`Machine`](crate::Machine), stored state outlives the
//! invocation that produced it: the gateway saves a snapshot when a program
//! runs out of input and loads it again when more input arrives.
//!
//! Keys are connection ids. Writes are last-write-wins per key; nothing
//! stronger is promised.

use crate::error::{self, Result};
use crate::session::SessionRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Storage backend trait
///
/// Implement this trait to add new storage backends (a database, a remote
/// key-value service, ...).
pub trait StateStore: Send + Sync {
    /// Store the record for a connection, replacing any previous one
    fn put(&self, connection_id: &str, record: &SessionRecord) -> Result<()>;

    /// Load the record for a connection, if any
    fn get(&self, connection_id: &str) -> Result<Option<SessionRecord>>;

    /// Forget a connection. Deleting a missing key is not an error.
    fn delete(&self, connection_id: &str) -> Result<()>;

    /// All stored connection ids
    fn keys(&self) -> Result<Vec<String>>;

    /// Get backend name for debugging
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-memory storage (volatile, but useful for testing and single-process servers)
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(op: &'static str) -> crate::error::Error {
    error::storage_failed("state store lock poisoned").with_operation(op)
}

impl StateStore for MemoryStore {
    fn put(&self, connection_id: &str, record: &SessionRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned("storage::put"))?;
        records.insert(connection_id.to_string(), record.clone());
        Ok(())
    }

    fn get(&self, connection_id: &str) -> Result<Option<SessionRecord>> {
        let records = self.records.read().map_err(|_| poisoned("storage::get"))?;
        Ok(records.get(connection_id).cloned())
    }

    fn delete(&self, connection_id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned("storage::delete"))?;
        records.remove(connection_id);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let records = self.records.read().map_err(|_| poisoned("storage::keys"))?;
        Ok(records.keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// File-based Backend (JSON files)
// =============================================================================

/// File-based storage, one JSON document per connection
///
/// Characters that file systems reject (and `%` itself) are percent-escaped
/// in file names, so distinct connection ids never share a file and
/// [`StateStore::keys`] gives back the ids exactly as stored.
///
/// Structure:
/// ```text
/// {base_path}/
///   {connection_id}.json
/// ```
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)
            .map_err(|e| error::io_error(format!("Failed to create state dir: {}", e)))?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", encode_key(key)))
    }
}

const RESERVED: &[char] = &['%', '/', '\\', ':', '*', '?', '"', '<', '>', '|', '='];

fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for c in key.chars() {
        if RESERVED.contains(&c) || c.is_ascii_control() {
            encoded.push_str(&format!("%{:02X}", c as u32));
        } else {
            encoded.push(c);
        }
    }
    encoded
}

/// Inverse of [`encode_key`]; `None` for names this store did not write
fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

impl StateStore for FileStore {
    fn put(&self, connection_id: &str, record: &SessionRecord) -> Result<()> {
        let path = self.key_to_path(connection_id);
        let content = serde_json::to_string_pretty(record).map_err(|e| {
            error::serialization_error(e.to_string()).with_operation("storage::put")
        })?;
        std::fs::write(&path, content).map_err(|e| {
            error::io_error(format!("Failed to write {}: {}", path.display(), e))
                .with_operation("storage::put")
                .with_context("connection_id", connection_id)
        })?;
        Ok(())
    }

    fn get(&self, connection_id: &str) -> Result<Option<SessionRecord>> {
        let path = self.key_to_path(connection_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(error::io_error(format!("Failed to read {}: {}", path.display(), e))
                    .with_operation("storage::get")
                    .with_context("connection_id", connection_id))
            }
        };

        let record = serde_json::from_str(&content).map_err(|e| {
            error::serialization_error(format!("Failed to parse {}: {}", path.display(), e))
                .with_operation("storage::get")
                .with_context("connection_id", connection_id)
        })?;
        Ok(Some(record))
    }

    fn delete(&self, connection_id: &str) -> Result<()> {
        let path = self.key_to_path(connection_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                error::io_error(format!("Failed to delete {}: {}", path.display(), e))
                    .with_operation("storage::delete")
            })?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.base_path)
            .map_err(|e| error::io_error(format!("Failed to read state dir: {}", e)))?;

        Ok(entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                    path.file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(decode_key)
                } else {
                    None
                }
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

//! Ordered key-value storage abstraction.
//!
//! The [`KvStore`] trait is the metadata side of the hybrid store: an
//! ordered map from string keys to opaque byte values with range scans.
//! Point and segment records are stored as raw UTF-8 JSON under the
//! key layout `point:<id>`, `seg:in:<from>:<to>`, `seg:out:<to>:<from>`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Impl | Backing | Use |
//! |------|---------|-----|
//! | [`memory::MemoryKv`] | `BTreeMap` behind `RwLock` | tests, ephemeral mode |
//! | [`sqlite::SqliteKv`] | single `kv` table via sqlx | durable CLI mode |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Ordered byte-key map with range scans and atomic per-key writes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Insert or overwrite a key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch a value; `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key, reporting whether it was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Key-presence probe without fetching the value.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// All `(key, value)` pairs with `start <= key <= end_inclusive`,
    /// in ascending key order.
    async fn range_scan(&self, start: &str, end_inclusive: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Total number of keys.
    async fn count(&self) -> Result<u64>;

    /// Drop every key.
    async fn clear(&self) -> Result<()>;

    /// Reclaim space in the backing store; a no-op where not applicable.
    async fn compact(&self) -> Result<()>;
}

/// Upper bound for a prefix scan: every key starting with `prefix`
/// sorts at or below this, in both UTF-8 byte order and SQLite's
/// default text collation.
pub fn prefix_end(prefix: &str) -> String {
    format!("{prefix}\u{10FFFF}")
}

/// Store `value` under `key` as JSON bytes.
pub async fn put_json<T: Serialize + Sync>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(key, &bytes).await
}

/// Fetch and decode a JSON value; `None` if the key is absent.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| Error::Inconsistency {
                key: key.to_string(),
                message: format!("undecodable record: {e}"),
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

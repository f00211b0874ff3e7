//! In-memory [`KvStore`] for tests and ephemeral deployments.
//!
//! A `BTreeMap` behind `std::sync::RwLock`; range scans fall out of the
//! map's ordering. All futures resolve immediately.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;

use super::KvStore;

#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap();
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap();
        Ok(entries.contains_key(key))
    }

    async fn range_scan(&self, start: &str, end_inclusive: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().unwrap();
        let range = (
            Bound::Included(start.to_string()),
            Bound::Included(end_inclusive.to_string()),
        );
        Ok(entries
            .range(range)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let entries = self.entries.read().unwrap();
        Ok(entries.len() as u64)
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
        Ok(())
    }

    async fn compact(&self) -> Result<()> {
        Ok(())
    }
}

//! In-memory storage backend.
//!
//! Used when the worker runs without durable storage, and as the storage
//! fake in strategy and lifecycle tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::http::Response;
use crate::sync::{PendingItem, SyncStore};

use super::store::{CacheEntry, CacheStore};

#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<HashMap<String, HashMap<String, CacheEntry>>>,
  pending: Mutex<Vec<PendingItem>>,
  next_id: Mutex<i64>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, partition: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.entry(partition.to_string()).or_default();
    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      partitions
        .get(partition)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entries = partitions.entry(partition.to_string()).or_default();
    entries.insert(
      key.to_string(),
      CacheEntry {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn delete_partition(&self, partition: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partitions.remove(partition);
    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut names: Vec<String> = partitions.keys().cloned().collect();
    names.sort();
    Ok(names)
  }
}

impl SyncStore for MemoryStore {
  fn enqueue(&self, payload: &serde_json::Value) -> Result<i64> {
    let mut next_id = self
      .next_id
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *next_id += 1;
    let id = *next_id;

    let mut pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    pending.push(PendingItem {
      id,
      payload: payload.clone(),
      queued_at: Utc::now(),
    });
    Ok(id)
  }

  fn pending(&self) -> Result<Vec<PendingItem>> {
    let pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(pending.clone())
  }

  fn remove(&self, id: i64) -> Result<()> {
    let mut pending = self
      .pending
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    pending.retain(|item| item.id != id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_put_overwrites_single_entry() {
    let store = MemoryStore::new();
    store.put("p", "k", &Response::new(200)).unwrap();
    store.put("p", "k", &Response::new(204)).unwrap();

    let entry = store.get("p", "k").unwrap().unwrap();
    assert_eq!(entry.response.status, 204);
  }

  #[test]
  fn test_open_creates_enumerable_partition() {
    let store = MemoryStore::new();
    store.open("jihyung-v2.0.0").unwrap();
    assert_eq!(store.partition_names().unwrap(), vec!["jihyung-v2.0.0"]);
  }

  #[test]
  fn test_delete_partition_removes_entries() {
    let store = MemoryStore::new();
    store.put("p", "k", &Response::new(200)).unwrap();
    store.delete_partition("p").unwrap();
    assert!(store.get("p", "k").unwrap().is_none());
    assert!(store.partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_sync_store_roundtrip() {
    let store = MemoryStore::new();
    let id = store.enqueue(&serde_json::json!({"title": "note"})).unwrap();
    assert_eq!(store.pending().unwrap().len(), 1);
    store.remove(id).unwrap();
    assert!(store.pending().unwrap().is_empty());
  }
}

//! SQLite storage backend.
//!
//! Cached responses and pending sync items share one database file so a
//! worker restart neither loses the offline cache nor drops queued writes.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::http::Response;
use crate::sync::{PendingItem, SyncStore};

use super::store::{CacheEntry, CacheStore};

pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the database at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the database at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// In-memory database, used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory db: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jihyung-worker").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const SCHEMA: &str = r#"
-- Partition registry (a partition can exist before it holds entries)
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per request identity per partition; a put overwrites
CREATE TABLE IF NOT EXISTS response_cache (
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_partition
    ON response_cache(partition);

-- Writes authored while offline, awaiting replay
CREATE TABLE IF NOT EXISTS pending_sync (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload BLOB NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStore for SqliteStore {
  fn open(&self, partition: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to open partition: {}", e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM response_cache
         WHERE partition = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![partition, key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers_json, body, cached_at_str)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CacheEntry {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to register partition: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (partition, request_key, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![partition, key, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn delete_partition(&self, partition: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM response_cache WHERE partition = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to delete partition entries: {}", e))?;

    conn
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete partition: {}", e))?;

    Ok(())
  }

  fn partition_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }
}

impl SyncStore for SqliteStore {
  fn enqueue(&self, payload: &serde_json::Value) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute("INSERT INTO pending_sync (payload) VALUES (?)", params![data])
      .map_err(|e| eyre!("Failed to enqueue sync item: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn pending(&self) -> Result<Vec<PendingItem>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM pending_sync ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(i64, Vec<u8>, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to list pending items: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut items = Vec::with_capacity(rows.len());
    for (id, data, queued_at_str) in rows {
      let payload = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to parse pending payload: {}", e))?;
      items.push(PendingItem {
        id,
        payload,
        queued_at: parse_datetime(&queued_at_str)?,
      });
    }

    Ok(items)
  }

  fn remove(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM pending_sync WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove sync item: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let response = Response::new(200)
      .with_header("content-type", "text/html")
      .with_body(b"<html></html>".to_vec());

    store.put("jihyung-v2.0.0", "abc", &response).unwrap();

    let entry = store.get("jihyung-v2.0.0", "abc").unwrap().unwrap();
    assert_eq!(entry.response.status, 200);
    assert_eq!(
      entry.response.headers.get("content-type").map(String::as_str),
      Some("text/html")
    );
    assert_eq!(entry.response.body, b"<html></html>");
  }

  #[test]
  fn test_put_registers_partition() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("jihyung-v2.0.0-api", "k", &Response::new(200)).unwrap();
    assert_eq!(
      store.partition_names().unwrap(),
      vec!["jihyung-v2.0.0-api".to_string()]
    );
  }

  #[test]
  fn test_delete_partition() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.put("old", "k", &Response::new(200)).unwrap();
    store.delete_partition("old").unwrap();
    assert!(store.get("old", "k").unwrap().is_none());
    assert!(store.partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_pending_sync_order_and_removal() {
    let store = SqliteStore::open_in_memory().unwrap();
    let first = store.enqueue(&serde_json::json!({"title": "a"})).unwrap();
    let second = store.enqueue(&serde_json::json!({"title": "b"})).unwrap();
    assert!(second > first);

    let items = store.pending().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].payload["title"], "a");

    store.remove(first).unwrap();
    let items = store.pending().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, second);
  }
}

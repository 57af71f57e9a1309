//! Cache storage trait.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::Response;

/// A stored response together with the time it entered the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
  /// Turn the entry back into a servable response.
  ///
  /// Cache hits carry an `x-cache-date` header so the page can show how old
  /// the data it is looking at is.
  pub fn into_response(self) -> Response {
    let cached_at = self.cached_at.to_rfc3339();
    self.response.with_header("x-cache-date", cached_at)
  }
}

/// Partition-addressed storage for cached responses.
///
/// Partitions are created lazily by `open` or the first `put`. A `put`
/// overwrites: at most one entry exists per request identity per partition.
pub trait CacheStore: Send + Sync {
  /// Ensure a partition exists without writing to it.
  fn open(&self, partition: &str) -> Result<()>;

  fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>>;

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()>;

  /// Delete a partition and all entries in it.
  fn delete_partition(&self, partition: &str) -> Result<()>;

  /// Names of every partition currently enumerable.
  fn partition_names(&self) -> Result<Vec<String>>;
}

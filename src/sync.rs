//! Background sync queue.
//!
//! Writes authored while offline are held in a durable store and replayed
//! against the backend once connectivity returns. Replay is per-item:
//! failures are logged and the item retained for a later retry, so the batch
//! never aborts. Delivery is at-least-once: an item is removed only after a
//! confirmed 2xx replay, and payloads carry a client-generated `client_id`
//! the backend can de-duplicate on.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::Request;
use crate::net::Network;

/// A locally queued write awaiting replay.
#[derive(Debug, Clone)]
pub struct PendingItem {
  pub id: i64,
  pub payload: serde_json::Value,
  pub queued_at: DateTime<Utc>,
}

/// Durable storage for pending items, outside the cache partitions.
pub trait SyncStore: Send + Sync {
  fn enqueue(&self, payload: &serde_json::Value) -> Result<i64>;

  /// All pending items, oldest first.
  fn pending(&self) -> Result<Vec<PendingItem>>;

  fn remove(&self, id: i64) -> Result<()>;
}

/// Outcome of one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
  pub synced: usize,
  pub failed: usize,
}

pub struct SyncQueue<S: SyncStore, N: Network> {
  store: Arc<S>,
  network: Arc<N>,
  endpoint: String,
}

impl<S: SyncStore, N: Network> SyncQueue<S, N> {
  pub fn new(store: Arc<S>, network: Arc<N>, endpoint: impl Into<String>) -> Self {
    Self {
      store,
      network,
      endpoint: endpoint.into(),
    }
  }

  /// Queue a write for later replay. Objects without a `client_id` get one
  /// assigned so the backend can de-duplicate repeated deliveries.
  pub fn enqueue(&self, mut payload: serde_json::Value) -> Result<i64> {
    if let Some(object) = payload.as_object_mut() {
      object
        .entry("client_id")
        .or_insert_with(|| serde_json::Value::String(generate_client_id()));
    }
    self.store.enqueue(&payload)
  }

  /// Replay every pending item against the sync endpoint.
  pub async fn replay(&self) -> Result<ReplayOutcome> {
    let items = self.store.pending()?;
    if items.is_empty() {
      debug!("No pending sync items");
      return Ok(ReplayOutcome::default());
    }

    info!(count = items.len(), "Replaying pending sync items");
    let mut outcome = ReplayOutcome::default();

    for item in items {
      let body = match serde_json::to_vec(&item.payload) {
        Ok(body) => body,
        Err(err) => {
          warn!(id = item.id, %err, "Skipping unserializable sync item");
          outcome.failed += 1;
          continue;
        }
      };

      let request = Request::post_json(&self.endpoint, body);
      match self.network.fetch(request).await {
        Ok(response) if response.is_ok() => {
          if let Err(err) = self.store.remove(item.id) {
            warn!(id = item.id, %err, "Synced item could not be removed; it may replay again");
          }
          outcome.synced += 1;
        }
        Ok(response) => {
          warn!(id = item.id, status = response.status, "Sync replay rejected; item retained");
          outcome.failed += 1;
        }
        Err(err) => {
          warn!(id = item.id, %err, "Sync replay failed; item retained");
          outcome.failed += 1;
        }
      }
    }

    info!(synced = outcome.synced, failed = outcome.failed, "Sync replay finished");
    Ok(outcome)
  }
}

/// Opaque id for backend de-duplication.
fn generate_client_id() -> String {
  let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(nanos.to_be_bytes());
  hasher.update(std::process::id().to_be_bytes());
  hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::http::{Method, Response};
  use crate::net::FakeNetwork;
  use serde_json::json;

  const ENDPOINT: &str = "https://app.example/api/notes";

  fn queue(network: Arc<FakeNetwork>) -> SyncQueue<MemoryStore, FakeNetwork> {
    SyncQueue::new(Arc::new(MemoryStore::new()), network, ENDPOINT)
  }

  #[tokio::test]
  async fn test_replay_posts_each_item() {
    let network = Arc::new(FakeNetwork::new());
    network.respond(ENDPOINT, Response::new(201));
    let queue = queue(Arc::clone(&network));

    queue.enqueue(json!({"title": "a", "content": "x"})).unwrap();
    queue.enqueue(json!({"title": "b", "content": "y"})).unwrap();

    let outcome = queue.replay().await.unwrap();
    assert_eq!(outcome, ReplayOutcome { synced: 2, failed: 0 });

    let requests = network.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.method == Method::Post));
  }

  #[tokio::test]
  async fn test_synced_items_are_removed() {
    let network = Arc::new(FakeNetwork::new());
    network.respond(ENDPOINT, Response::new(201));
    let queue = queue(network);

    queue.enqueue(json!({"title": "a"})).unwrap();
    queue.replay().await.unwrap();

    assert!(queue.store.pending().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_failed_items_are_retained() {
    let network = Arc::new(FakeNetwork::new());
    network.fail(ENDPOINT, "connection refused");
    let queue = queue(network);

    queue.enqueue(json!({"title": "a"})).unwrap();
    let outcome = queue.replay().await.unwrap();

    assert_eq!(outcome.failed, 1);
    assert_eq!(queue.store.pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_one_failure_does_not_block_the_batch() {
    let network = Arc::new(FakeNetwork::new());
    network.respond_once(ENDPOINT, Response::new(201));
    network.fail_once(ENDPOINT, "connection reset");
    network.respond_once(ENDPOINT, Response::new(201));
    let queue = queue(Arc::clone(&network));

    queue.enqueue(json!({"title": "a"})).unwrap();
    queue.enqueue(json!({"title": "b"})).unwrap();
    queue.enqueue(json!({"title": "c"})).unwrap();

    let outcome = queue.replay().await.unwrap();
    assert_eq!(outcome, ReplayOutcome { synced: 2, failed: 1 });

    // All three were attempted; only the failed one remains.
    assert_eq!(network.request_count(ENDPOINT), 3);
    assert_eq!(queue.store.pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_non_2xx_status_counts_as_failure() {
    let network = Arc::new(FakeNetwork::new());
    network.respond(ENDPOINT, Response::new(500));
    let queue = queue(network);

    queue.enqueue(json!({"title": "a"})).unwrap();
    let outcome = queue.replay().await.unwrap();

    assert_eq!(outcome.failed, 1);
    assert_eq!(queue.store.pending().unwrap().len(), 1);
  }

  #[test]
  fn test_enqueue_assigns_client_id() {
    let queue = queue(Arc::new(FakeNetwork::new()));
    queue.enqueue(json!({"title": "a"})).unwrap();

    let items = queue.store.pending().unwrap();
    assert!(items[0].payload["client_id"].is_string());
  }

  #[test]
  fn test_enqueue_keeps_existing_client_id() {
    let queue = queue(Arc::new(FakeNetwork::new()));
    queue.enqueue(json!({"title": "a", "client_id": "given"})).unwrap();

    let items = queue.store.pending().unwrap();
    assert_eq!(items[0].payload["client_id"], "given");
  }
}

//! Worker events and the wait-until task registry.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::http::{Request, Response};
use crate::notify::Notification;

/// Platform-delivered events driving the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  /// Intercepted page request; the response goes back over the reply channel
  Fetch {
    request: Request,
    reply: oneshot::Sender<Response>,
  },
  /// Connectivity restored; replay pending writes for a recognized tag
  Sync {
    tag: String,
  },
  /// A locally-authored write to defer until connectivity returns
  QueueWrite {
    payload: serde_json::Value,
  },
  /// Push delivery with an optional plain-text payload
  Push {
    payload: Option<String>,
  },
  NotificationClick {
    notification: Notification,
    action: Option<String>,
  },
  /// Structured message from a page client
  Message {
    message: ClientMessage,
    reply: Option<oneshot::Sender<MessageReply>>,
  },
}

/// Messages a page client can send to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
  /// Force immediate activation of a waiting worker
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Ask for the active version string
  #[serde(rename = "GET_VERSION")]
  GetVersion,
  /// Proactively cache a list of URLs
  #[serde(rename = "CACHE_URLS")]
  CacheUrls { urls: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum MessageReply {
  #[serde(rename = "VERSION")]
  Version { version: String, cache: String },
  #[serde(rename = "ACK")]
  Ack,
}

/// Explicit wait-until registry.
///
/// Strategies register background continuations (the stale-while-revalidate
/// cache refresh) here; the event loop settles the registry before the event
/// counts as complete, so the worker is never torn down mid-write.
#[derive(Debug, Default)]
pub struct WaitUntil {
  tasks: Vec<JoinHandle<()>>,
}

impl WaitUntil {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn spawn<F>(&mut self, future: F)
  where
    F: std::future::Future<Output = ()> + Send + 'static,
  {
    self.tasks.push(tokio::spawn(future));
  }

  /// Await every registered task.
  pub async fn settle(self) {
    for result in futures::future::join_all(self.tasks).await {
      if let Err(err) = result {
        warn!(%err, "Background task panicked");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  #[test]
  fn test_client_message_wire_format() {
    let msg: ClientMessage = serde_json::from_str(r#"{"type": "SKIP_WAITING"}"#).unwrap();
    assert_eq!(msg, ClientMessage::SkipWaiting);

    let msg: ClientMessage =
      serde_json::from_str(r#"{"type": "CACHE_URLS", "urls": ["/a.js", "/b.css"]}"#).unwrap();
    assert_eq!(
      msg,
      ClientMessage::CacheUrls {
        urls: vec!["/a.js".to_string(), "/b.css".to_string()]
      }
    );
  }

  #[test]
  fn test_version_reply_wire_format() {
    let reply = MessageReply::Version {
      version: "v2.0.0".to_string(),
      cache: "jihyung-v2.0.0".to_string(),
    };
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["type"], "VERSION");
    assert_eq!(json["version"], "v2.0.0");
  }

  #[tokio::test]
  async fn test_settle_waits_for_spawned_work() {
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = Arc::clone(&done);

    let mut wait = WaitUntil::new();
    wait.spawn(async move {
      tokio::time::sleep(std::time::Duration::from_millis(20)).await;
      done_clone.store(true, Ordering::SeqCst);
    });

    wait.settle().await;
    assert!(done.load(Ordering::SeqCst));
  }
}

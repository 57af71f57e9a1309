//! The worker runtime: owns every component and dispatches platform events.
//!
//! Execution is single-threaded and cooperative: events arrive over an mpsc
//! channel and each one is handled to completion, including settling its
//! wait-until registry, before the next is taken. Writes to a partition are
//! therefore serialized, but no ordering holds across distinct
//! request/response cycles for the same URL.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheStore, PartitionSet};
use crate::classify::Classifier;
use crate::config::Config;
use crate::event::{ClientMessage, MessageReply, WaitUntil, WorkerEvent};
use crate::http::{Request, Response};
use crate::lifecycle::LifecycleController;
use crate::net::Network;
use crate::notify::{ClickAction, Clients, Notification, NotificationDispatcher};
use crate::strategy::StrategyExecutor;
use crate::sync::{SyncQueue, SyncStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
  /// Not yet installed
  Idle,
  /// Installed, ready to activate immediately
  Waiting,
  Active,
}

/// Handle for submitting platform events to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  fn send(&self, event: WorkerEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Worker is no longer running"))
  }

  pub fn install(&self) -> Result<()> {
    self.send(WorkerEvent::Install)
  }

  pub fn activate(&self) -> Result<()> {
    self.send(WorkerEvent::Activate)
  }

  /// Submit an intercepted request and await the worker's response.
  pub async fn fetch(&self, request: Request) -> Result<Response> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Fetch { request, reply })?;
    rx.await.map_err(|_| eyre!("Worker dropped the fetch event"))
  }

  pub fn sync(&self, tag: &str) -> Result<()> {
    self.send(WorkerEvent::Sync {
      tag: tag.to_string(),
    })
  }

  /// Defer a locally-authored write for replay once connectivity returns.
  pub fn queue_write(&self, payload: serde_json::Value) -> Result<()> {
    self.send(WorkerEvent::QueueWrite { payload })
  }

  pub fn push(&self, payload: Option<String>) -> Result<()> {
    self.send(WorkerEvent::Push { payload })
  }

  pub fn notification_click(
    &self,
    notification: Notification,
    action: Option<String>,
  ) -> Result<()> {
    self.send(WorkerEvent::NotificationClick {
      notification,
      action,
    })
  }

  /// Send a client message and await the reply.
  pub async fn message(&self, message: ClientMessage) -> Result<MessageReply> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Message {
      message,
      reply: Some(reply),
    })?;
    rx.await.map_err(|_| eyre!("Worker dropped the message"))
  }
}

pub struct Worker<S, N, C>
where
  S: CacheStore + SyncStore + 'static,
  N: Network,
  C: Clients + 'static,
{
  classifier: Classifier,
  executor: StrategyExecutor<S, N>,
  sync: SyncQueue<S, N>,
  lifecycle: LifecycleController<S, N, C>,
  notifier: NotificationDispatcher,
  clients: Arc<C>,
  store: Arc<S>,
  network: Arc<N>,
  partitions: PartitionSet,
  origin: String,
  sync_tag: String,
  sweep_interval: Duration,
  state: LifecycleState,
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl<S, N, C> Worker<S, N, C>
where
  S: CacheStore + SyncStore + 'static,
  N: Network,
  C: Clients + 'static,
{
  pub fn new(config: &Config, store: Arc<S>, network: Arc<N>, clients: Arc<C>) -> (Self, WorkerHandle) {
    let partitions =
      PartitionSet::new(config.worker.cache_name.as_str(), config.worker.version.as_str());

    let executor = StrategyExecutor::new(
      Arc::clone(&store),
      Arc::clone(&network),
      partitions.clone(),
      config.worker.offline_page.as_str(),
    );
    let sync = SyncQueue::new(Arc::clone(&store), Arc::clone(&network), config.sync_url());
    let lifecycle = LifecycleController::new(
      Arc::clone(&store),
      Arc::clone(&network),
      Arc::clone(&clients),
      partitions.clone(),
      config.worker.origin.as_str(),
      config.precache.clone(),
    );
    let notifier =
      NotificationDispatcher::new(config.worker.notification_body.as_str(), "/");

    let (tx, rx) = mpsc::unbounded_channel();
    let worker = Self {
      classifier: Classifier::new(config.worker.api_prefix.as_str()),
      executor,
      sync,
      lifecycle,
      notifier,
      clients,
      store,
      network,
      partitions,
      origin: config.worker.origin.clone(),
      sync_tag: config.worker.sync_tag.clone(),
      sweep_interval: Duration::from_secs(config.worker.sweep_interval_hours.max(1) * 3600),
      state: LifecycleState::Idle,
      rx,
    };

    (worker, WorkerHandle { tx })
  }

  /// Run until every handle is dropped.
  pub async fn run(&mut self) -> Result<()> {
    let mut sweep = tokio::time::interval(self.sweep_interval);
    sweep.tick().await; // the immediate first tick

    loop {
      tokio::select! {
        event = self.rx.recv() => match event {
          Some(event) => self.dispatch(event).await,
          None => break,
        },
        _ = sweep.tick() => {
          debug!("Running periodic stale-partition sweep");
          if let Err(err) = self.lifecycle.purge_stale() {
            warn!(%err, "Periodic sweep failed");
          }
        }
      }
    }

    info!("Worker shutting down");
    Ok(())
  }

  /// Handle one event to completion, background continuations included.
  async fn dispatch(&mut self, event: WorkerEvent) {
    let mut wait = WaitUntil::new();

    match event {
      WorkerEvent::Install => match self.lifecycle.on_install().await {
        Ok(_) => {
          // Readiness is signaled immediately rather than waiting for
          // existing pages to close.
          self.state = LifecycleState::Waiting;
        }
        Err(err) => error!(%err, "Install failed"),
      },

      WorkerEvent::Activate => self.activate(),

      WorkerEvent::Fetch { request, reply } => {
        let class = self.classifier.classify(&request);
        debug!(url = %request.url, ?class, "Handling fetch");
        let response = self.executor.execute(class, request, &mut wait).await;
        if reply.send(response).is_err() {
          debug!("Fetch requester went away before the response was ready");
        }
      }

      WorkerEvent::Sync { tag } => {
        if tag == self.sync_tag {
          if let Err(err) = self.sync.replay().await {
            warn!(%err, "Sync replay errored");
          }
        } else {
          debug!(%tag, "Ignoring unrecognized sync tag");
        }
      }

      WorkerEvent::QueueWrite { payload } => {
        if let Err(err) = self.sync.enqueue(payload) {
          warn!(%err, "Failed to queue offline write");
        }
      }

      WorkerEvent::Push { payload } => {
        let notification = self.notifier.build(payload.as_deref());
        if let Err(err) = self.clients.show_notification(&notification) {
          warn!(%err, "Failed to show notification");
        }
      }

      WorkerEvent::NotificationClick {
        notification,
        action,
      } => match self.notifier.on_click(&notification, action.as_deref()) {
        ClickAction::OpenWindow(url) => {
          if let Err(err) = self.clients.open_or_focus(&url) {
            warn!(%err, "Failed to open client window");
          }
        }
        ClickAction::Dismiss => {}
      },

      WorkerEvent::Message { message, reply } => {
        let response = self.handle_message(message).await;
        if let Some(reply) = reply {
          let _ = reply.send(response);
        }
      }
    }

    wait.settle().await;
  }

  fn activate(&mut self) {
    if let Err(err) = self.lifecycle.on_activate() {
      error!(%err, "Activation cleanup failed");
    }
    self.state = LifecycleState::Active;
  }

  async fn handle_message(&mut self, message: ClientMessage) -> MessageReply {
    match message {
      ClientMessage::SkipWaiting => {
        if self.state == LifecycleState::Waiting {
          info!("Skip-waiting requested, activating now");
          self.activate();
        }
        MessageReply::Ack
      }

      ClientMessage::GetVersion => MessageReply::Version {
        version: self.partitions.version().to_string(),
        cache: self.partitions.main(),
      },

      ClientMessage::CacheUrls { urls } => {
        let partition = self.partitions.statics();
        for url in urls {
          let absolute = match self.resolve(&url) {
            Ok(absolute) => absolute,
            Err(err) => {
              warn!(%url, %err, "Skipping uncacheable URL");
              continue;
            }
          };

          let request = Request::get(&absolute);
          let key = request.identity();
          match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => {
              if let Err(err) = self.store.put(&partition, &key, &response) {
                warn!(url = %absolute, %err, "Failed to cache requested URL");
              }
            }
            Ok(response) => {
              warn!(url = %absolute, status = response.status, "Requested URL not cacheable")
            }
            Err(err) => warn!(url = %absolute, %err, "Failed to fetch requested URL"),
          }
        }
        MessageReply::Ack
      }
    }
  }

  fn resolve(&self, url: &str) -> Result<String> {
    let base = Url::parse(&self.origin).map_err(|e| eyre!("Bad origin {}: {}", self.origin, e))?;
    let absolute = base.join(url).map_err(|e| eyre!("Bad URL {}: {}", url, e))?;
    Ok(absolute.to_string())
  }
}

//! Install, activation and stale-partition cleanup.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheStore, PartitionSet};
use crate::http::Request;
use crate::net::Network;
use crate::notify::Clients;

/// How install seeding went; pre-cache failures never abort installation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
  pub seeded: usize,
  pub failed: usize,
}

pub struct LifecycleController<S: CacheStore, N: Network, C: Clients> {
  store: Arc<S>,
  network: Arc<N>,
  clients: Arc<C>,
  partitions: PartitionSet,
  origin: String,
  precache: Vec<String>,
}

impl<S: CacheStore, N: Network, C: Clients> LifecycleController<S, N, C> {
  pub fn new(
    store: Arc<S>,
    network: Arc<N>,
    clients: Arc<C>,
    partitions: PartitionSet,
    origin: impl Into<String>,
    precache: Vec<String>,
  ) -> Self {
    Self {
      store,
      network,
      clients,
      partitions,
      origin: origin.into(),
      precache,
    }
  }

  /// Open the current-version partition and seed it with the pre-cache
  /// manifest. Seeding is best-effort: a path that cannot be fetched or
  /// stored is logged and skipped.
  pub async fn on_install(&self) -> Result<InstallReport> {
    let partition = self.partitions.main();
    self.store.open(&partition)?;

    let mut report = InstallReport::default();
    for path in &self.precache {
      let url = match self.resolve(path) {
        Ok(url) => url,
        Err(err) => {
          warn!(%path, %err, "Skipping unresolvable pre-cache path");
          report.failed += 1;
          continue;
        }
      };

      let request = Request::get(&url);
      let key = request.identity();
      match self.network.fetch(request).await {
        Ok(response) if response.is_ok() => {
          if let Err(err) = self.store.put(&partition, &key, &response) {
            warn!(%url, %err, "Failed to store pre-cache entry");
            report.failed += 1;
          } else {
            report.seeded += 1;
          }
        }
        Ok(response) => {
          warn!(%url, status = response.status, "Pre-cache fetch not OK");
          report.failed += 1;
        }
        Err(err) => {
          warn!(%url, %err, "Pre-cache fetch failed");
          report.failed += 1;
        }
      }
    }

    info!(
      version = self.partitions.version(),
      seeded = report.seeded,
      failed = report.failed,
      "Install complete"
    );
    Ok(report)
  }

  /// Purge every partition of ours whose name no longer matches the active
  /// version, then take control of all open page clients.
  pub fn on_activate(&self) -> Result<usize> {
    let purged = self.purge_stale()?;

    if let Err(err) = self.clients.claim() {
      warn!(%err, "Failed to claim clients");
    }

    info!(version = self.partitions.version(), purged, "Activated");
    Ok(purged)
  }

  /// Delete stale partitions. Also run periodically as a safety net against
  /// missed activation cleanups.
  pub fn purge_stale(&self) -> Result<usize> {
    let mut purged = 0;
    for name in self.store.partition_names()? {
      if self.partitions.is_ours(&name) && !self.partitions.is_current(&name) {
        match self.store.delete_partition(&name) {
          Ok(()) => {
            info!(partition = %name, "Deleted stale partition");
            purged += 1;
          }
          Err(err) => warn!(partition = %name, %err, "Failed to delete stale partition"),
        }
      }
    }
    Ok(purged)
  }

  fn resolve(&self, path: &str) -> Result<String> {
    let base = Url::parse(&self.origin).map_err(|e| eyre!("Bad origin {}: {}", self.origin, e))?;
    let url = base
      .join(path)
      .map_err(|e| eyre!("Bad pre-cache path {}: {}", path, e))?;
    Ok(url.to_string())
  }
}

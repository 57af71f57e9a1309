//! Per-class caching strategies.
//!
//! Every intercepted request resolves to a response here: network-first for
//! API calls, cache-first for images, stale-while-revalidate for static
//! assets, network-with-cached-document fallback for navigations, and a
//! default passthrough. Failures are absorbed at this level: the page never
//! sees a raw error, only a (possibly synthesized) response.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheStore, PartitionSet};
use crate::classify::ResourceClass;
use crate::event::WaitUntil;
use crate::fallback;
use crate::http::{Request, Response};
use crate::net::Network;

pub struct StrategyExecutor<S: CacheStore, N: Network> {
  store: Arc<S>,
  network: Arc<N>,
  partitions: PartitionSet,
  /// Path of the dedicated offline page, e.g. "/offline.html"
  offline_page: String,
}

impl<S: CacheStore + 'static, N: Network> StrategyExecutor<S, N> {
  pub fn new(
    store: Arc<S>,
    network: Arc<N>,
    partitions: PartitionSet,
    offline_page: impl Into<String>,
  ) -> Self {
    Self {
      store,
      network,
      partitions,
      offline_page: offline_page.into(),
    }
  }

  /// Run the strategy selected by the request's class.
  pub async fn execute(
    &self,
    class: ResourceClass,
    request: Request,
    wait: &mut WaitUntil,
  ) -> Response {
    match class {
      ResourceClass::Api => self.network_first(request).await,
      ResourceClass::Image => self.cache_first(request).await,
      ResourceClass::Static => self.stale_while_revalidate(request, wait).await,
      ResourceClass::Navigation => self.navigation(request).await,
      ResourceClass::Passthrough => self.passthrough(request).await,
      ResourceClass::Ignored => self.direct(request).await,
    }
  }

  /// Network-first, for API calls. Successful GET responses are cached; on
  /// network failure the cached copy is served, and with no cached copy the
  /// page gets the synthesized offline error.
  async fn network_first(&self, request: Request) -> Response {
    let partition = self.partitions.api();
    let key = request.identity();
    let is_read = request.method.is_read();

    match self.network.fetch(request).await {
      Ok(response) => {
        if is_read && response.is_ok() {
          self.store_response(&partition, &key, &response);
        }
        response
      }
      Err(err) => {
        debug!(%err, "API fetch failed, falling back to cache");
        match self.lookup(&partition, &key) {
          Some(entry) => entry.into_response(),
          None => fallback::offline_api_error(),
        }
      }
    }
  }

  /// Cache-first, for images. Misses go to the network and are cached for
  /// next time; total failure yields an empty 404 rather than an exception.
  async fn cache_first(&self, request: Request) -> Response {
    let partition = self.partitions.images();
    let key = request.identity();

    if let Some(entry) = self.lookup(&partition, &key) {
      return entry.into_response();
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_response(&partition, &key, &response);
        }
        response
      }
      Err(err) => {
        debug!(%err, "Image fetch failed with no cached copy");
        fallback::image_not_found()
      }
    }
  }

  /// Stale-while-revalidate, for scripts, styles and fonts. A cached copy is
  /// returned immediately while the refresh runs as a background
  /// continuation registered on the event; with no cached copy the network
  /// response is awaited directly.
  async fn stale_while_revalidate(&self, request: Request, wait: &mut WaitUntil) -> Response {
    let partition = self.partitions.statics();
    let key = request.identity();

    if let Some(entry) = self.lookup(&partition, &key) {
      let store = Arc::clone(&self.store);
      let network = Arc::clone(&self.network);
      wait.spawn(async move {
        match network.fetch(request).await {
          Ok(response) if response.is_ok() => {
            if let Err(err) = store.put(&partition, &key, &response) {
              warn!(%err, "Revalidation write failed");
            }
          }
          Ok(response) => {
            debug!(status = response.status, "Revalidation fetch not cacheable");
          }
          Err(err) => {
            debug!(%err, "Revalidation fetch failed, cached copy stands");
          }
        }
      });
      return entry.into_response();
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_response(&partition, &key, &response);
        }
        response
      }
      Err(err) => fallback::fetch_failed(&err.to_string()),
    }
  }

  /// Navigations fetch the document and cache it on success. On failure:
  /// the cached copy of this document, then the cached root document, then
  /// the offline page.
  async fn navigation(&self, request: Request) -> Response {
    let partition = self.partitions.main();
    let key = request.identity();
    let url = request.url.clone();

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_response(&partition, &key, &response);
        }
        response
      }
      Err(err) => {
        debug!(%err, %url, "Navigation fetch failed, serving cached document");

        if let Some(entry) = self.lookup(&partition, &key) {
          return entry.into_response();
        }

        if let Some(root) = sibling_url(&url, "/") {
          let root_key = Request::get(root).identity();
          if let Some(entry) = self.lookup(&partition, &root_key) {
            return entry.into_response();
          }
        }

        if let Some(page) = sibling_url(&url, &self.offline_page) {
          let page_key = Request::get(page).identity();
          if let Some(entry) = self.lookup(&partition, &page_key) {
            return entry.into_response();
          }
        }

        fallback::offline_page()
      }
    }
  }

  /// Default rule: network, then any cached response for the same identity.
  async fn passthrough(&self, request: Request) -> Response {
    let partition = self.partitions.main();
    let key = request.identity();

    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(err) => match self.lookup(&partition, &key) {
        Some(entry) => entry.into_response(),
        None => fallback::fetch_failed(&err.to_string()),
      },
    }
  }

  /// Ignored traffic goes straight to the network, untouched by any cache.
  async fn direct(&self, request: Request) -> Response {
    match self.network.fetch(request).await {
      Ok(response) => response,
      Err(err) => fallback::fetch_failed(&err.to_string()),
    }
  }

  /// Cache lookup; storage errors count as a miss.
  fn lookup(&self, partition: &str, key: &str) -> Option<CacheEntry> {
    match self.store.get(partition, key) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(%err, partition, "Cache read failed, treating as miss");
        None
      }
    }
  }

  /// Cache write; failures (quota, storage errors) are non-fatal and the
  /// live response is still served.
  fn store_response(&self, partition: &str, key: &str, response: &Response) {
    if let Err(err) = self.store.put(partition, key, response) {
      warn!(%err, partition, "Cache write failed");
    }
  }
}

/// Same-origin URL for the given path.
fn sibling_url(url: &str, path: &str) -> Option<String> {
  let parsed = Url::parse(url).ok()?;
  parsed.join(path).ok().map(|u| u.to_string())
}

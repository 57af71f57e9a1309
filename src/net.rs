//! Network collaborator.
//!
//! The backend and every other origin the page talks to are reached through
//! the `Network` trait, so strategies can be exercised against a scripted
//! fake without a server.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::future::Future;

use crate::http::{Method, Request, Response};

pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Real network access over reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: Request) -> Result<Response> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let mut headers = BTreeMap::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers.insert(name.as_str().to_string(), value.to_string());
      }
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body for {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

/// Scripted network for tests.
///
/// Each URL has an optional queue of one-shot outcomes consumed in order,
/// then a persistent default. Every issued request is recorded.
#[cfg(test)]
pub struct FakeNetwork {
  routes: std::sync::Mutex<std::collections::HashMap<String, Route>>,
  requests: std::sync::Mutex<Vec<Request>>,
}

#[cfg(test)]
#[derive(Default)]
struct Route {
  queue: std::collections::VecDeque<Scripted>,
  default: Option<Scripted>,
}

#[cfg(test)]
#[derive(Clone)]
enum Scripted {
  Respond(Response),
  Fail(String),
}

#[cfg(test)]
impl Scripted {
  fn into_result(self) -> Result<Response> {
    match self {
      Scripted::Respond(response) => Ok(response),
      Scripted::Fail(message) => Err(eyre!("{}", message)),
    }
  }
}

#[cfg(test)]
impl FakeNetwork {
  pub fn new() -> Self {
    Self {
      routes: std::sync::Mutex::new(std::collections::HashMap::new()),
      requests: std::sync::Mutex::new(Vec::new()),
    }
  }

  /// Set the default response for a URL (replaces any previous default).
  pub fn respond(&self, url: &str, response: Response) {
    let mut routes = self.routes.lock().unwrap();
    routes.entry(url.to_string()).or_default().default = Some(Scripted::Respond(response));
  }

  /// Make a URL fail by default (replaces any previous default).
  pub fn fail(&self, url: &str, message: &str) {
    let mut routes = self.routes.lock().unwrap();
    routes.entry(url.to_string()).or_default().default = Some(Scripted::Fail(message.to_string()));
  }

  /// Queue a one-shot response consumed before the default.
  pub fn respond_once(&self, url: &str, response: Response) {
    let mut routes = self.routes.lock().unwrap();
    routes
      .entry(url.to_string())
      .or_default()
      .queue
      .push_back(Scripted::Respond(response));
  }

  /// Queue a one-shot failure consumed before the default.
  pub fn fail_once(&self, url: &str, message: &str) {
    let mut routes = self.routes.lock().unwrap();
    routes
      .entry(url.to_string())
      .or_default()
      .queue
      .push_back(Scripted::Fail(message.to_string()));
  }

  /// Every request issued so far, in order.
  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self, url: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url == url)
      .count()
  }
}

#[cfg(test)]
impl Network for FakeNetwork {
  async fn fetch(&self, request: Request) -> Result<Response> {
    let url = request.url.clone();
    self.requests.lock().unwrap().push(request);

    let mut routes = self.routes.lock().unwrap();
    let route = routes
      .get_mut(&url)
      .ok_or_else(|| eyre!("Unscripted fetch: {}", url))?;

    if let Some(outcome) = route.queue.pop_front() {
      return outcome.into_result();
    }
    route
      .default
      .clone()
      .ok_or_else(|| eyre!("Unscripted fetch: {}", url))?
      .into_result()
  }
}

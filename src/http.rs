//! Platform-independent request and response types.
//!
//! The worker never touches browser objects directly; everything it
//! intercepts or produces is expressed with these tagged structures so the
//! classifier and strategies stay unit-testable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Read requests are the only ones whose responses may be cached.
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get | Method::Head)
  }
}

/// Request mode, mirroring the fetch mode of the originating page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
  /// Full-page document load
  Navigate,
  #[default]
  Cors,
  NoCors,
  SameOrigin,
}

/// An intercepted network request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub method: Method,
  pub url: String,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub mode: RequestMode,
  /// Request body for writes; reads carry none.
  #[serde(default)]
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      headers: BTreeMap::new(),
      mode: RequestMode::Cors,
      body: None,
    }
  }

  /// A full-page navigation request.
  pub fn navigate(url: impl Into<String>) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Self {
      method: Method::Post,
      url: url.into(),
      headers,
      mode: RequestMode::Cors,
      body: Some(body),
    }
  }

  /// Stable cache key for this request's identity (method + URL).
  ///
  /// SHA256 hash for stable, fixed-length keys.
  pub fn identity(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as stored in a partition or returned to the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: Vec::new(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = body;
    self
  }

  /// 2xx status
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identity_is_stable() {
    let a = Request::get("https://app.example/api/notes");
    let b = Request::get("https://app.example/api/notes");
    assert_eq!(a.identity(), b.identity());
  }

  #[test]
  fn test_identity_distinguishes_method_and_url() {
    let get = Request::get("https://app.example/api/notes");
    let post = Request::post_json("https://app.example/api/notes", vec![]);
    let other = Request::get("https://app.example/api/tasks");
    assert_ne!(get.identity(), post.identity());
    assert_ne!(get.identity(), other.identity());
  }

  #[test]
  fn test_navigation_identity_matches_plain_get() {
    // Navigation fallback looks up the root document under its GET identity.
    let nav = Request::navigate("https://app.example/");
    let get = Request::get("https://app.example/");
    assert_eq!(nav.identity(), get.identity());
  }

  #[test]
  fn test_is_ok() {
    assert!(Response::new(200).is_ok());
    assert!(Response::new(204).is_ok());
    assert!(!Response::new(404).is_ok());
    assert!(!Response::new(503).is_ok());
  }
}

//! Request classification.
//!
//! Every intercepted request is assigned one resource class, which selects
//! the caching strategy and the target partition. Classification is a pure
//! function of the request URL and mode.

use url::Url;

use crate::http::{Request, RequestMode};

/// Resource class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
  /// Backend API call (network-first)
  Api,
  /// Image asset (cache-first)
  Image,
  /// Script, style or font (stale-while-revalidate)
  Static,
  /// Full-page document load
  Navigation,
  /// Anything else (network with cache fallback)
  Passthrough,
  /// Browser-extension traffic, never intercepted
  Ignored,
}

/// URL schemes the worker refuses to intercept.
const EXTENSION_SCHEMES: &[&str] = &["chrome-extension", "moz-extension", "safari-web-extension"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"];

/// Scripts, styles and fonts all share the stale-while-revalidate partition.
const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot"];

/// Classifies requests against a fixed rule set, built once at worker start.
#[derive(Debug, Clone)]
pub struct Classifier {
  api_prefix: String,
}

impl Classifier {
  pub fn new(api_prefix: impl Into<String>) -> Self {
    Self {
      api_prefix: api_prefix.into(),
    }
  }

  /// Rule order: extension origins are ignored outright, then API prefix,
  /// then image extensions, then static extensions, then navigation mode.
  pub fn classify(&self, request: &Request) -> ResourceClass {
    let url = match Url::parse(&request.url) {
      Ok(url) => url,
      Err(_) => {
        // Unparseable URLs can still be navigations (e.g. relative paths
        // handed over by an embedding layer); otherwise leave them alone.
        return if request.mode == RequestMode::Navigate {
          ResourceClass::Navigation
        } else {
          ResourceClass::Passthrough
        };
      }
    };

    if EXTENSION_SCHEMES.contains(&url.scheme()) {
      return ResourceClass::Ignored;
    }

    if url.path().starts_with(&self.api_prefix) {
      return ResourceClass::Api;
    }

    if let Some(ext) = path_extension(url.path()) {
      if IMAGE_EXTENSIONS.contains(&ext) {
        return ResourceClass::Image;
      }
      if STATIC_EXTENSIONS.contains(&ext) {
        return ResourceClass::Static;
      }
    }

    if request.mode == RequestMode::Navigate {
      return ResourceClass::Navigation;
    }

    ResourceClass::Passthrough
  }
}

/// Lowercased extension of the final path segment, if any.
fn path_extension(path: &str) -> Option<&str> {
  let segment = path.rsplit('/').next()?;
  let (_, ext) = segment.rsplit_once('.')?;
  if ext.is_empty() {
    None
  } else {
    Some(ext)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new("/api/")
  }

  #[test]
  fn test_extension_origin_is_ignored() {
    let req = Request::get("chrome-extension://abcdef/content.js");
    assert_eq!(classifier().classify(&req), ResourceClass::Ignored);
  }

  #[test]
  fn test_api_prefix() {
    let req = Request::get("https://app.example/api/notes");
    assert_eq!(classifier().classify(&req), ResourceClass::Api);
  }

  #[test]
  fn test_api_prefix_beats_extension() {
    // An API route that happens to end in an image extension is still API.
    let req = Request::get("https://app.example/api/notes/export.png");
    assert_eq!(classifier().classify(&req), ResourceClass::Api);
  }

  #[test]
  fn test_image_extensions() {
    for ext in ["png", "webp", "svg"] {
      let req = Request::get(format!("https://app.example/assets/logo.{ext}"));
      assert_eq!(classifier().classify(&req), ResourceClass::Image);
    }
  }

  #[test]
  fn test_static_extensions() {
    for ext in ["js", "css", "woff2"] {
      let req = Request::get(format!("https://app.example/assets/main.{ext}"));
      assert_eq!(classifier().classify(&req), ResourceClass::Static);
    }
  }

  #[test]
  fn test_navigation_mode() {
    let req = Request::navigate("https://app.example/notes/42");
    assert_eq!(classifier().classify(&req), ResourceClass::Navigation);
  }

  #[test]
  fn test_passthrough() {
    let req = Request::get("https://app.example/robots.txt");
    assert_eq!(classifier().classify(&req), ResourceClass::Passthrough);
  }

  #[test]
  fn test_query_string_does_not_confuse_extension() {
    let req = Request::get("https://app.example/assets/app.js?v=123");
    assert_eq!(classifier().classify(&req), ResourceClass::Static);
  }
}

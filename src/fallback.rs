//! Synthesized responses for requests that neither network nor cache can
//! satisfy. The page always receives a valid response object, never a raw
//! failure.

use chrono::Utc;
use serde_json::json;

use crate::http::Response;

/// Minimal offline document served when neither the requested page nor the
/// configured offline page is cached.
const OFFLINE_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Offline</title></head>
<body>
  <h1>You're offline</h1>
  <p>Jihyung can't reach the server right now. Your notes will sync when the connection is restored.</p>
</body>
</html>
"#;

/// Offline error shape for failed API calls, HTTP 503.
pub fn offline_api_error() -> Response {
  let body = json!({
    "error": "offline",
    "message": "You appear to be offline. Changes will be synced when the connection is restored.",
    "offline": true,
    "timestamp": Utc::now().to_rfc3339(),
  });

  Response::new(503)
    .with_header("content-type", "application/json")
    .with_body(body.to_string().into_bytes())
}

/// Empty 404 for images that are in neither cache nor reachable over the
/// network; failing the resource load outright would break page rendering.
pub fn image_not_found() -> Response {
  Response::new(404)
}

/// Built-in offline page for failed navigations.
pub fn offline_page() -> Response {
  Response::new(200)
    .with_header("content-type", "text/html; charset=utf-8")
    .with_body(OFFLINE_HTML.as_bytes().to_vec())
}

/// Synthesized failure for passthrough requests with no cached copy. The
/// platform would surface a rejected fetch here; this runtime resolves every
/// fetch event, so the error is carried in a 502 instead.
pub fn fetch_failed(message: &str) -> Response {
  Response::new(502)
    .with_header("content-type", "text/plain")
    .with_body(message.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_offline_api_error_shape() {
    let response = offline_api_error();
    assert_eq!(response.status, 503);

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["offline"], true);
    assert_eq!(body["error"], "offline");
    assert!(body["message"].is_string());
    // Timestamp must be parseable ISO 8601
    let ts = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
  }

  #[test]
  fn test_image_not_found_is_empty_404() {
    let response = image_not_found();
    assert_eq!(response.status, 404);
    assert!(response.body.is_empty());
  }

  #[test]
  fn test_offline_page_is_html() {
    let response = offline_page();
    assert_eq!(response.status, 200);
    assert!(String::from_utf8_lossy(&response.body).contains("offline"));
  }
}

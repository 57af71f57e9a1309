//! Push notification dispatch.
//!
//! Push payloads are plain text; the dispatcher turns them into a structured
//! notification with `open`/`dismiss` actions and a target URL, and routes
//! clicks back into the page through the `Clients` seam.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A rendered notification, ephemeral: shown, then discarded on dismiss or
/// activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub actions: Vec<NotificationAction>,
  /// Target URL carried in the notification data, used on click.
  pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// What a notification click asks the page layer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  /// Open or focus a client window at the URL.
  OpenWindow(String),
  /// Close the notification, nothing else.
  Dismiss,
}

/// Page-client operations the worker needs from its host.
pub trait Clients: Send + Sync {
  /// Take control of all open page clients.
  fn claim(&self) -> Result<()>;

  /// Open a window at the URL, or focus an existing one showing it.
  fn open_or_focus(&self, url: &str) -> Result<()>;

  fn show_notification(&self, notification: &Notification) -> Result<()>;
}

/// Host adapter for running without a window manager: client operations are
/// logged and otherwise succeed.
pub struct NoopClients;

impl Clients for NoopClients {
  fn claim(&self) -> Result<()> {
    info!("Claimed page clients");
    Ok(())
  }

  fn open_or_focus(&self, url: &str) -> Result<()> {
    info!(url, "Open or focus client window");
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, body = %notification.body, "Show notification");
    Ok(())
  }
}

pub struct NotificationDispatcher {
  default_body: String,
  target_url: String,
}

impl NotificationDispatcher {
  pub fn new(default_body: impl Into<String>, target_url: impl Into<String>) -> Self {
    Self {
      default_body: default_body.into(),
      target_url: target_url.into(),
    }
  }

  /// Build a notification from a push payload, falling back to the default
  /// message when the push carries no text.
  pub fn build(&self, payload: Option<&str>) -> Notification {
    let body = match payload {
      Some(text) if !text.trim().is_empty() => text.to_string(),
      _ => self.default_body.clone(),
    };

    Notification {
      title: "Jihyung".to_string(),
      body,
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Open".to_string(),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Dismiss".to_string(),
        },
      ],
      url: self.target_url.clone(),
    }
  }

  /// Route a click. The notification body itself behaves like `open`.
  pub fn on_click(&self, notification: &Notification, action: Option<&str>) -> ClickAction {
    match action {
      Some("dismiss") => ClickAction::Dismiss,
      _ => ClickAction::OpenWindow(notification.url.clone()),
    }
  }
}

#[cfg(test)]
pub struct FakeClients {
  pub claims: std::sync::Mutex<usize>,
  pub opened: std::sync::Mutex<Vec<String>>,
  pub shown: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl FakeClients {
  pub fn new() -> Self {
    Self {
      claims: std::sync::Mutex::new(0),
      opened: std::sync::Mutex::new(Vec::new()),
      shown: std::sync::Mutex::new(Vec::new()),
    }
  }
}

#[cfg(test)]
impl Clients for FakeClients {
  fn claim(&self) -> Result<()> {
    *self.claims.lock().unwrap() += 1;
    Ok(())
  }

  fn open_or_focus(&self, url: &str) -> Result<()> {
    self.opened.lock().unwrap().push(url.to_string());
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dispatcher() -> NotificationDispatcher {
    NotificationDispatcher::new("You have new updates in Jihyung", "/")
  }

  #[test]
  fn test_payload_text_becomes_body() {
    let notification = dispatcher().build(Some("New note shared with you"));
    assert_eq!(notification.body, "New note shared with you");
  }

  #[test]
  fn test_missing_payload_uses_default() {
    let notification = dispatcher().build(None);
    assert_eq!(notification.body, "You have new updates in Jihyung");

    let notification = dispatcher().build(Some("   "));
    assert_eq!(notification.body, "You have new updates in Jihyung");
  }

  #[test]
  fn test_notification_carries_actions_and_url() {
    let notification = dispatcher().build(None);
    let actions: Vec<&str> = notification.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["open", "dismiss"]);
    assert_eq!(notification.url, "/");
  }

  #[test]
  fn test_click_routing() {
    let dispatcher = dispatcher();
    let notification = dispatcher.build(None);

    assert_eq!(
      dispatcher.on_click(&notification, Some("open")),
      ClickAction::OpenWindow("/".to_string())
    );
    // Clicking the body itself opens too
    assert_eq!(
      dispatcher.on_click(&notification, None),
      ClickAction::OpenWindow("/".to_string())
    );
    assert_eq!(
      dispatcher.on_click(&notification, Some("dismiss")),
      ClickAction::Dismiss
    );
  }
}

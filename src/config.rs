use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
  #[serde(default)]
  pub worker: WorkerConfig,
  /// Paths guaranteed present after install (best-effort seeded).
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Origin the page is served from; pre-cache paths and the sync endpoint
  /// resolve against it.
  pub origin: String,
  /// Base name of the cache partitions.
  pub cache_name: String,
  /// Worker version; bumping it is the only cache invalidation mechanism.
  pub version: String,
  /// Path prefix of backend API calls.
  pub api_prefix: String,
  /// Path pending offline writes are replayed to.
  pub sync_endpoint: String,
  /// Sync event tag the worker recognizes.
  pub sync_tag: String,
  /// Path of the dedicated offline fallback page.
  pub offline_page: String,
  /// Hours between stale-partition sweeps.
  pub sweep_interval_hours: u64,
  /// Use the SQLite store; false keeps everything in memory.
  pub durable: bool,
  /// Default notification body when a push carries no text.
  pub notification_body: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      cache_name: "jihyung".to_string(),
      version: "v2.0.0".to_string(),
      api_prefix: "/api/".to_string(),
      sync_endpoint: "/api/notes".to_string(),
      sync_tag: "sync-notes".to_string(),
      offline_page: "/offline.html".to_string(),
      sweep_interval_hours: 24,
      durable: true,
      notification_body: "You have new updates in Jihyung".to_string(),
    }
  }
}

fn default_precache() -> Vec<String> {
  vec![
    "/".to_string(),
    "/manifest.json".to_string(),
    "/offline.html".to_string(),
  ]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jihyung-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jihyung-worker/config.yaml
  ///
  /// Every field has a default, so a missing file yields a working config.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self {
        precache: default_precache(),
        ..Self::default()
      }),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("jihyung-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jihyung-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Absolute URL of the sync endpoint.
  pub fn sync_url(&self) -> String {
    format!(
      "{}{}",
      self.worker.origin.trim_end_matches('/'),
      self.worker.sync_endpoint
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::load(None).unwrap_or_default();
    assert_eq!(config.worker.api_prefix, "/api/");
    assert_eq!(config.worker.version, "v2.0.0");
    assert_eq!(config.worker.sweep_interval_hours, 24);
  }

  #[test]
  fn test_parse_partial_yaml() {
    let config: Config = serde_yaml::from_str(
      r#"
worker:
  origin: "https://notes.example"
  version: "v3.1.0"
"#,
    )
    .unwrap();

    assert_eq!(config.worker.origin, "https://notes.example");
    assert_eq!(config.worker.version, "v3.1.0");
    // Unspecified fields keep their defaults.
    assert_eq!(config.worker.cache_name, "jihyung");
    assert_eq!(config.precache, vec!["/", "/manifest.json", "/offline.html"]);
  }

  #[test]
  fn test_sync_url_joins_origin_and_path() {
    let mut config = Config::default();
    config.worker.origin = "https://notes.example/".to_string();
    config.worker.sync_endpoint = "/api/notes".to_string();
    assert_eq!(config.sync_url(), "https://notes.example/api/notes");
  }
}

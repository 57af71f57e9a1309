mod cache;
mod classify;
mod config;
mod event;
mod fallback;
mod http;
mod lifecycle;
mod net;
mod notify;
mod strategy;
mod sync;
mod worker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jihyung-worker")]
#[command(about = "Offline caching and background sync worker for Jihyung")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jihyung-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory for the cache database and logs
  #[arg(short, long)]
  data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let _log_guard = init_logging(args.data_dir.as_deref())?;

  if config.worker.durable {
    let store = match &args.data_dir {
      Some(dir) => cache::SqliteStore::open_at(&dir.join("cache.db"))?,
      None => cache::SqliteStore::open()?,
    };
    run(config, Arc::new(store)).await
  } else {
    run(config, Arc::new(cache::MemoryStore::new())).await
  }
}

async fn run<S>(config: config::Config, store: Arc<S>) -> Result<()>
where
  S: cache::CacheStore + sync::SyncStore + 'static,
{
  let network = Arc::new(net::HttpNetwork::new()?);
  let clients = Arc::new(notify::NoopClients);

  let (mut worker, handle) = worker::Worker::new(&config, store, network, clients);

  handle.install()?;
  handle.activate()?;
  // Replay anything still queued from a previous run.
  handle.sync(&config.worker.sync_tag)?;

  let runner = tokio::spawn(async move { worker.run().await });

  info!(version = %config.worker.version, "Worker running, press Ctrl-C to stop");
  tokio::signal::ctrl_c().await?;

  drop(handle);
  runner.await??;

  Ok(())
}

/// File logging with an env-filtered subscriber. The returned guard must stay
/// alive for the duration of the process.
fn init_logging(data_dir: Option<&Path>) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let dir = match data_dir {
    Some(dir) => dir.to_path_buf(),
    None => dirs::data_dir()
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("jihyung-worker"),
  };
  std::fs::create_dir_all(&dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(&dir, "worker.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

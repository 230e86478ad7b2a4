mod app;
mod assets;
mod config;
mod dataset;
mod event;
mod favorites;
mod select;
mod store;
mod ui;
mod update;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sage")]
#[command(about = "Offline-first wisdom cards in the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: searches ./sage.yaml, then XDG config dir)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Serve the cached application shell on this port instead of running the reader
  #[arg(long, value_name = "PORT")]
  serve: Option<u16>,
}

fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config.storage_dir()?)?;

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .map_err(|e| eyre!("Failed to build async runtime: {}", e))?;

  match args.serve {
    Some(port) => runtime.block_on(serve_shell(&config, port)),
    None => runtime.block_on(run_reader(config)),
  }
}

async fn run_reader(config: config::Config) -> Result<()> {
  println!("sage: wisdom cards in the terminal. Type 'help' for commands.");

  let mut app = app::App::new(config)?;
  app.run().await
}

/// Logs go to a file under the data directory so stdout stays free for the
/// reader itself.
fn init_logging(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = data_dir.join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let file = tracing_appender::rolling::daily(log_dir, "sage.log");
  let (writer, guard) = tracing_appender::non_blocking(file);

  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

/// Serve the cached application shell over loopback. The cache answers first;
/// the network only fills in what the cache does not hold.
async fn serve_shell(config: &config::Config, port: u16) -> Result<()> {
  let assets = assets::AssetCache::open(
    &config.storage_dir()?.join("assets.db"),
    config.shell_origin()?,
  )?;
  let http = dataset::build_http_client(config.fetch_timeout())?;

  if config.shell.mirror {
    match assets.install(&http).await {
      Ok(()) => {
        if let Err(e) = assets.activate() {
          warn!("Failed to prune old shell generations: {}", e);
        }
      }
      Err(e) => warn!("Shell install failed, serving what is already cached: {}", e),
    }
  }

  let addr = format!("127.0.0.1:{}", port);
  let server =
    tiny_http::Server::http(&addr).map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;
  info!("Serving application shell on http://{}", addr);
  println!("Serving application shell on http://{}", addr);

  for request in server.incoming_requests() {
    let path = request.url().to_string();
    match assets.resolve(&http, &path).await {
      Ok(asset) => {
        let mut response =
          tiny_http::Response::from_data(asset.body).with_status_code(asset.status);
        if let Some(content_type) = &asset.content_type {
          if let Ok(header) = tiny_http::Header::from_bytes("Content-Type", content_type.as_bytes())
          {
            response.add_header(header);
          }
        }
        let _ = request.respond(response);
      }
      Err(e) => {
        warn!("No answer for '{}': {}", path, e);
        let response =
          tiny_http::Response::from_data(b"unavailable".to_vec()).with_status_code(503);
        let _ = request.respond(response);
      }
    }
  }

  Ok(())
}

//! scorebook server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and serves the JSON API over HTTP.
//!
//! # Seeding
//!
//! ```sh
//! cargo run -p scorebook-server -- seed school.json
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use scorebook_server::{SeedFile, ServerConfig};
use scorebook_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Scorebook score and ranking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Recompute every average and ranking from the stored scores, then exit.
  Rebuild,
  /// Load reference data and scores from a JSON file, rebuild, then exit.
  Seed {
    /// JSON file with school_years, terms, grades, classrooms, students,
    /// subjects, exams, and optionally scores.
    file: PathBuf,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let store = Arc::new(store);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, &cfg).await,
    Command::Rebuild => {
      let report = scorebook_server::rebuild(store).await?;
      info!(cascades = report.cascades, skipped = report.skipped, "rebuilt");
      Ok(())
    }
    Command::Seed { file } => {
      let seed = SeedFile::read(&file)?;
      let report = scorebook_server::seed(store, seed).await?;
      info!(cascades = report.cascades, skipped = report.skipped, "seeded");
      Ok(())
    }
  }
}

async fn serve(store: Arc<SqliteStore>, cfg: &ServerConfig) -> anyhow::Result<()> {
  let app = scorebook_api::api_router(store).layer(TraceLayer::new_for_http());
  let address = cfg.address();

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

//! Configuration and seeding for the `scorebook` server binary.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use scorebook_core::{
  engine::{RebuildReport, Recomputer},
  school::SchoolData,
  score::Score,
  store::ScoreStore,
};
use scorebook_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::info;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `SCOREBOOK_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl ServerConfig {
  /// Layer the defaults, the TOML file at `path` (if it exists), and the
  /// environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "scorebook.db")?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SCOREBOOK"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Seeding ──────────────────────────────────────────────────────────────────

/// Contents of a seed file: the reference data plus an optional list of
/// scores.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
  #[serde(flatten)]
  pub school: SchoolData,
  #[serde(default)]
  pub scores: Vec<Score>,
}

impl SeedFile {
  pub fn read(path: &Path) -> anyhow::Result<Self> {
    let text = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read seed file {path:?}"))?;
    serde_json::from_str(&text)
      .with_context(|| format!("failed to parse seed file {path:?}"))
  }
}

/// Load `seed` into `store`, then rebuild every aggregate.
///
/// Scores are validated before anything is written.
pub async fn seed(
  store: Arc<SqliteStore>,
  seed: SeedFile,
) -> anyhow::Result<RebuildReport> {
  let scores = seed
    .scores
    .into_iter()
    .map(|s| Score::new(s.student_code, s.exam_code, s.value))
    .collect::<Result<Vec<_>, _>>()
    .context("invalid score in seed file")?;

  store
    .load_school_data(seed.school)
    .await
    .context("failed to load school data")?;
  let count = scores.len();
  store
    .put_scores(scores)
    .await
    .context("failed to write scores")?;
  info!(scores = count, "seeded store");

  rebuild(store).await
}

/// Recompute every aggregate in `store` from its scores.
pub async fn rebuild(store: Arc<SqliteStore>) -> anyhow::Result<RebuildReport> {
  Recomputer::new(store)
    .rebuild()
    .await
    .context("rebuild failed")
}

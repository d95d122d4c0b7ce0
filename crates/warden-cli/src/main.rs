//! `warden`: inspect the local authorization projection.
//!
//! Reads `warden.toml` (or the path given with `--config`) and `WARDEN_*`
//! environment variables, opens the SQLite store and prints what it holds.
//! Never talks to the graph engine.
//!
//! # Usage
//!
//! ```
//! warden relationships 6f1c2a0e-assessment --json
//! warden token
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_core::model::Relationship;
use warden_store_sqlite::Projection;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Warden authorization store inspector")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "warden.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// List the sharing relationships recorded for an assessment.
  Relationships {
    assessment_id: String,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
  },
  /// Print the cached consistency token.
  Token,
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("warden.db") }

fn load_config(path: PathBuf) -> anyhow::Result<CliConfig> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("WARDEN"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise CliConfig")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = load_config(cli.config)?;
  let store_path = expand_tilde(&cfg.store_path);

  let projection = Projection::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::debug!(path = ?store_path, "store opened");

  let tokens = projection.tokens();
  let mut session = projection.begin().await.context("failed to begin transaction")?;
  tokens.acquire_shared_lock(&mut session).await?;

  match cli.command {
    Command::Relationships { assessment_id, json } => {
      let rows = projection
        .list_relationships(&mut session, &assessment_id)
        .await
        .with_context(|| format!("failed to list relationships of {assessment_id}"))?;
      if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
      } else {
        print_table(&rows);
      }
    }
    Command::Token => match tokens.read(&mut session).await? {
      Some(token) => println!("{token}"),
      None => tracing::info!("no consistency token recorded"),
    },
  }

  session.commit().await?;
  Ok(())
}

fn print_table(rows: &[Relationship]) {
  if rows.is_empty() {
    tracing::info!("no relationships recorded");
    return;
  }
  println!("{:<25}  {:<8}  {:<8}  SUBJECT", "CREATED", "RELATION", "TYPE");
  for row in rows {
    println!(
      "{:<25}  {:<8}  {:<8}  {}",
      row.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
      row.kind,
      row.subject_type(),
      row.subject_id(),
    );
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_config_file_uses_defaults() {
    let cfg = load_config(PathBuf::from("does-not-exist.toml")).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("warden.db"));
  }

  #[test]
  fn paths_without_tilde_are_kept() {
    assert_eq!(expand_tilde(Path::new("/var/lib/warden.db")), PathBuf::from("/var/lib/warden.db"));
  }

  #[test]
  fn cli_parses_relationships() {
    let cli = Cli::parse_from(["warden", "relationships", "a1", "--json"]);
    assert_eq!(cli.config, PathBuf::from("warden.toml"));
    assert!(matches!(
      cli.command,
      Command::Relationships { ref assessment_id, json: true } if assessment_id == "a1"
    ));
  }
}

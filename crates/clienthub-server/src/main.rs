//! clienthub-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `CLIENTHUB_*` environment variables, opens the SQLite store, and serves
//! the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! ```
//! cargo run -p clienthub-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use clienthub_api::{ApiConfig, AppState, MagicLinkDelivery};
use clienthub_store_sqlite::SqliteStore;
use rand_core::OsRng;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "ClientHub server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerConfig {
  host:                   String,
  port:                   u16,
  store_path:             PathBuf,
  session_ttl_hours:      i64,
  magic_link_ttl_minutes: i64,
  magic_link_delivery:    MagicLinkDelivery,
  trial_days:             i64,
  public_base_url:        Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let api = ApiConfig::default();
    Self {
      host:                   "127.0.0.1".to_owned(),
      port:                   8080,
      store_path:             PathBuf::from("~/.local/share/clienthub/clienthub.db"),
      session_ttl_hours:      api.session_ttl_hours,
      magic_link_ttl_minutes: api.magic_link_ttl_minutes,
      magic_link_delivery:    api.magic_link_delivery,
      trial_days:             api.trial_days,
      public_base_url:        None,
    }
  }
}

impl ServerConfig {
  fn api(&self) -> ApiConfig {
    ApiConfig {
      session_ttl_hours:      self.session_ttl_hours,
      magic_link_ttl_minutes: self.magic_link_ttl_minutes,
      magic_link_delivery:    self.magic_link_delivery,
      trial_days:             self.trial_days,
      public_base_url:        self
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port)),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CLIENTHUB").try_parsing(true))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if server_cfg.magic_link_delivery == MagicLinkDelivery::Response {
    tracing::warn!("magic links are returned in responses; do not use this in production");
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let state = AppState {
    store:  Arc::new(store),
    config: Arc::new(server_cfg.api()),
  };

  let app = clienthub_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(store = ?store_path, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
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

//! Runtime configuration, deserialised from `gatehouse.toml` and overlaid
//! with `GATEHOUSE_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use gatehouse_api::ApiConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  /// SQLite database file. A leading `~/` is expanded.
  pub store_path:       PathBuf,
  pub store_timeout_ms: u64,
  pub mail_timeout_ms:  u64,
  pub mail_from:        String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:             "127.0.0.1".to_string(),
      port:             8080,
      store_path:       PathBuf::from("gatehouse.db"),
      store_timeout_ms: 5_000,
      mail_timeout_ms:  10_000,
      mail_from:        "gatehouse@localhost".to_string(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("GATEHOUSE"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn api(&self) -> ApiConfig {
    ApiConfig {
      store_timeout: Duration::from_millis(self.store_timeout_ms),
      mail_timeout:  Duration::from_millis(self.mail_timeout_ms),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
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

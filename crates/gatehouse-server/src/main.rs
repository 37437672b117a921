//! `gatehouse` server binary.
//!
//! Reads `gatehouse.toml` (or the path given with `--config`), opens the
//! SQLite store, and serves the JSON API over HTTP.
//!
//! # Bootstrapping
//!
//! The API only lets admins create persons, so the first admin is created
//! from the command line:
//!
//! ```text
//! gatehouse add-person --username root --role admin --password '…'
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use gatehouse_api::{AppState, auth::hash_password, mail::LogMailer};
use gatehouse_core::{
  person::{NewPerson, Role, Site, check_password, default_password},
  store::AccessStore,
};
use gatehouse_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Gatehouse facility access-control server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "gatehouse.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,

  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,

  /// Create a person directly in the store.
  AddPerson {
    #[arg(long)]
    username:   String,
    #[arg(long)]
    role:       Role,
    #[arg(long)]
    email:      Option<String>,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name:  String,
    #[arg(long)]
    document:   Option<String>,
    #[arg(long)]
    site:       Option<Site>,
    /// Defaults to the last four characters of the document.
    #[arg(long)]
    password:   Option<String>,
  },

  /// Report shifts whose open/closed state is inconsistent.
  AuditShifts {
    /// Repair what the audit finds.
    #[arg(long)]
    apply: bool,
  },
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

  match cli.command.unwrap_or(Command::Serve) {
    Command::HashPassword => {
      let password = read_password()?;
      println!("{}", hash_password(&password)?);
      Ok(())
    }
    Command::Serve => {
      let (server_cfg, store) = open(&cli.config).await?;
      serve(server_cfg, store).await
    }
    Command::AddPerson {
      username,
      role,
      email,
      first_name,
      last_name,
      document,
      site,
      password,
    } => {
      let (_, store) = open(&cli.config).await?;
      let password = match password {
        Some(p) => {
          check_password(&p)?;
          p
        }
        None => default_password(document.as_deref()),
      };
      let input = NewPerson {
        email,
        first_name,
        last_name,
        home_site: site,
        document,
        ..NewPerson::new(username, role, hash_password(&password)?)
      }
      .normalize()?;
      let person = store.create_person(input).await.context("failed to create person")?;
      println!("{} {} {}", person.person_id, person.role, person.username);
      Ok(())
    }
    Command::AuditShifts { apply } => {
      let (_, store) = open(&cli.config).await?;
      let audit = store.audit_shifts(apply).await.context("shift audit failed")?;
      println!(
        "{} shifts checked, {} inconsistencies, {} repaired",
        audit.total, audit.inconsistent, audit.repaired
      );
      Ok(())
    }
  }
}

/// Load configuration and open the store it points at.
async fn open(config_path: &Path) -> anyhow::Result<(ServerConfig, SqliteStore)> {
  let server_cfg = ServerConfig::load(config_path)?;
  let store_path = server_cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  Ok((server_cfg, store))
}

async fn serve(server_cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let mailer = Arc::new(LogMailer::new(server_cfg.mail_from.clone()));
  let state = AppState::new(store, mailer, server_cfg.api());
  let app = gatehouse_api::router(state).layer(TraceLayer::new_for_http());

  let address = server_cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use zonegate::{
    AppState, SharedState, api,
    clock::SystemClock,
    config::{AppConfig, RetryPolicy},
    db,
    token::TokenService,
};

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    /// Listen address for the HTTP server
    #[arg(long, env = "ZONEGATE_LISTEN", value_name = "ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
    /// Path to the SQLite database shared with PowerDNS
    #[arg(long, env = "ZONEGATE_DB_PATH", value_name = "PATH")]
    db_path: PathBuf,
    /// Ed25519 private key (PKCS#8 PEM) used to sign tokens. A throwaway
    /// key is generated when omitted.
    #[arg(long, env = "ZONEGATE_TOKEN_KEY", value_name = "PATH")]
    token_key: Option<PathBuf>,
    /// Token lifetime in seconds
    #[arg(long, env = "ZONEGATE_TOKEN_TTL", value_name = "SECS", default_value_t = 3600)]
    token_ttl: u64,
    /// SOA primary nameserver written into new zones
    #[arg(long, env = "SOA_MNAME", value_name = "FQDN")]
    soa_primary: String,
    /// SOA responsible mailbox written into new zones
    #[arg(long, env = "SOA_RNAME", value_name = "FQDN")]
    soa_contact: String,
    /// TTL for records submitted with ttl 0
    #[arg(long, env = "ZONEGATE_DEFAULT_TTL", value_name = "SECS", default_value_t = 3600)]
    default_ttl: u32,
    /// Refuse to create a zone whose name another account already holds
    #[arg(long, env = "ZONEGATE_EXCLUSIVE_ZONE_NAMES")]
    exclusive_zone_names: bool,
    /// Attempts per request when a transaction hits a locked database
    #[arg(long, env = "ZONEGATE_RETRY_ATTEMPTS", value_name = "N", default_value_t = 3)]
    retry_attempts: u32,
    /// How long SQLite waits on a lock before giving up, in milliseconds
    #[arg(long, env = "ZONEGATE_BUSY_TIMEOUT_MS", value_name = "MS", default_value_t = 5000)]
    busy_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = build_app_config(&cli)?;
    let state = init_shared_state(&cli, config).await?;

    let app = api::create_router(state);

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind to {}", cli.listen))?;

    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

async fn init_shared_state(cli: &Cli, config: AppConfig) -> Result<SharedState> {
    if let Some(parent) = cli.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create db directory {}", parent.display()))?;
    }

    let db = db::init_db(&cli.db_path, Duration::from_millis(cli.busy_timeout_ms))
        .await
        .with_context(|| format!("failed to open database {}", cli.db_path.display()))?;

    let signing_key = match &cli.token_key {
        Some(path) => TokenService::load_signing_key(path)?,
        None => {
            warn!("no --token-key given, tokens will not survive a restart");
            TokenService::generate_signing_key()
        }
    };

    Ok(Arc::new(AppState::new(
        config,
        db,
        signing_key,
        Arc::new(SystemClock),
    )))
}

fn build_app_config(cli: &Cli) -> Result<AppConfig> {
    let soa_primary = normalize_fqdn(&cli.soa_primary)
        .with_context(|| format!("invalid soa-primary '{}'", cli.soa_primary))?;
    let soa_contact = normalize_fqdn(&cli.soa_contact)
        .with_context(|| format!("invalid soa-contact '{}'", cli.soa_contact))?;

    if cli.default_ttl == 0 {
        bail!("--default-ttl must be positive");
    }
    if cli.token_ttl == 0 {
        bail!("--token-ttl must be positive");
    }
    if cli.retry_attempts == 0 {
        bail!("--retry-attempts must be at least 1");
    }

    Ok(AppConfig {
        soa_primary,
        soa_contact,
        default_ttl: cli.default_ttl,
        token_ttl: Duration::from_secs(cli.token_ttl),
        exclusive_zone_names: cli.exclusive_zone_names,
        retry: RetryPolicy {
            max_attempts: cli.retry_attempts,
            ..RetryPolicy::default()
        },
        ..AppConfig::default()
    })
}

fn normalize_fqdn(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        bail!("FQDN cannot be empty");
    }
    if trimmed.chars().any(char::is_whitespace) {
        bail!("FQDN cannot contain whitespace");
    }
    Ok(format!("{}.", trimmed))
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install CTRL+C handler: {err}");
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

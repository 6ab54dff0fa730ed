// Path: crates/daemon/src/main.rs

//! The key-storage daemon binary: parses CLI options, initializes
//! structured logging and the Prometheus metrics sink, loads the daemon
//! and access-control configuration files, opens the persistent key
//! database, and runs the accept loop until `SIGINT`/`SIGTERM`.
//!
//! `clap::Parser` for options, `tracing` init called first thing, a
//! `tokio::main` entry point.

mod config;
mod handlers;
mod provider;
mod runtime;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crypto_daemon_access::AccessControlMatrix;
use crypto_daemon_keystore::KeyStoreEngine;
use crypto_daemon_types::error::KeyStoreError;
use crypto_daemon_types::ids::Uuid;

use config::DaemonConfig;
use provider::CryptoProviderFactory;
use state::DaemonState;

/// Seconds the accept loop waits for in-flight connections to finish
/// their current request after a shutdown signal before exiting anyway.
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[clap(name = "crypto-daemon", about = "Process-isolated cryptographic service daemon")]
struct Opts {
    /// Path to the Unix-domain socket clients connect to.
    #[clap(long, default_value = "/run/crypto-daemon/crypto-daemon.sock")]
    socket_path: PathBuf,

    /// Root directory of the persistent key database.
    #[clap(long, default_value = "/var/lib/crypto-daemon/keys")]
    db_root: PathBuf,

    /// Path to the daemon configuration JSON file (`Server.*` /
    /// `X.509.*`). Defaults to an empty document (access control
    /// disabled, X.509 unconfigured) if absent.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Path to the access-control configuration JSON file
    /// (`userIDs: [...]`). Required only when `Server.keyAccessControl`
    /// is `true`.
    #[clap(long)]
    access_control: Option<PathBuf>,

    /// Known crypto-provider uuids this daemon will accept a
    /// `RegisterCryptoProvider` handshake for, as lowercase hex strings
    /// (concrete providers are an external collaborator).
    #[clap(long = "crypto-provider", value_parser = parse_uuid_hex)]
    crypto_providers: Vec<Uuid>,

    /// Address the Prometheus `/metrics`, `/healthz`, `/readyz` endpoints
    /// listen on.
    #[clap(long, default_value = "127.0.0.1:9464")]
    metrics_addr: SocketAddr,

    /// Seconds to wait for in-flight connections to drain after a
    /// shutdown signal.
    #[clap(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    drain_timeout_secs: u64,
}

fn parse_uuid_hex(s: &str) -> Result<Uuid, String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex uuid {s:?}: {e}"))?;
    let array: [u8; 16] = bytes
        .try_into()
        .map_err(|_| format!("uuid {s:?} must decode to exactly 16 bytes"))?;
    Ok(Uuid::from_bytes(array))
}

fn load_daemon_config(path: Option<&PathBuf>) -> Result<DaemonConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading daemon config {path:?}"))?;
            DaemonConfig::from_json(&text).with_context(|| format!("parsing daemon config {path:?}"))
        }
        None => Ok(DaemonConfig::from_json("{}").expect("empty document is always valid JSON")),
    }
}

fn load_access_matrix(path: Option<&PathBuf>, enabled: bool) -> Result<AccessControlMatrix> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading access-control config {path:?}"))?;
            let config = crypto_daemon_access::load_from_json(&text)
                .with_context(|| format!("parsing access-control config {path:?}"))?;
            Ok(AccessControlMatrix::from_config(&config, enabled))
        }
        None if enabled => {
            anyhow::bail!("Server.keyAccessControl is true but no --access-control file was given")
        }
        None => Ok(AccessControlMatrix::disabled()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    crypto_daemon_telemetry::init::init_tracing()?;
    let metrics_sink = crypto_daemon_telemetry::prometheus::install()
        .context("installing the Prometheus metrics sink")?;
    let _ = crypto_daemon_telemetry::sinks::SINK.set(metrics_sink);

    let opts = Opts::parse();
    let config = load_daemon_config(opts.config.as_ref())?;
    let access = load_access_matrix(opts.access_control.as_ref(), config.server.key_access_control)?;

    let engine = KeyStoreEngine::open(opts.db_root.clone(), access, config.server.idsm_reporting)
        .unwrap_or_else(|e| abort_on_corruption(&opts.db_root, e));

    let providers = CryptoProviderFactory::new(opts.crypto_providers.iter().copied());
    let state = Arc::new(DaemonState::new(engine, providers, config));
    let dispatch = Arc::new(handlers::build_dispatch_table());

    tracing::info!(
        socket = %opts.socket_path.display(),
        db_root = %opts.db_root.display(),
        max_connections = state.config.server.max_connection_num,
        key_access_control = state.config.server.key_access_control,
        "crypto-daemon starting"
    );

    tokio::spawn(crypto_daemon_telemetry::http::run_server(opts.metrics_addr));

    runtime::run_accept_loop(
        opts.socket_path,
        state,
        dispatch,
        shutdown_signal(),
        Duration::from_secs(opts.drain_timeout_secs),
    )
    .await
}

/// `KeyStoreError::Corrupted` means the on-disk database cannot be
/// trusted to reflect a consistent state; we abort rather than continue
/// with a partial database, including when a slot document's `meta.uuid`
/// disagrees with the index.
fn abort_on_corruption(db_root: &std::path::Path, err: KeyStoreError) -> ! {
    tracing::error!(db_root = %db_root.display(), error = %err, "key database failed to load; aborting");
    std::process::abort()
}

/// Resolves once either `SIGINT` or `SIGTERM` is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

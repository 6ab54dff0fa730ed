// Path: crates/daemon/src/runtime.rs

//! The accept loop: binds the local-stream-IPC listening socket, spawns
//! one task per accepted connection, and drains active connections on
//! `SIGINT`/`SIGTERM`.
//!
//! Local stream IPC is a Unix domain socket here. Peer credentials are
//! queried once per connection via `UnixStream::peer_cred()` and carried
//! for the connection's lifetime,
//! since UDS credentials cannot change after `accept()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;

use crypto_daemon_rpc::broker::{serve_connection, Connection as BrokerConnection, PeerCredentials};
use crypto_daemon_rpc::dispatch::DispatchTable;
use crypto_daemon_types::ids::{ProcessId, UserId};

use crate::state::{ConnState, DaemonState};

/// Removes a stale socket file left behind by a prior, uncleanly-stopped
/// instance before binding. A live daemon never has another process
/// holding this path (cross-host / multi-instance coordination over the
/// same socket is out of scope).
fn clear_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn peer_credentials(stream: &UnixStream) -> std::io::Result<PeerCredentials> {
    let cred = stream.peer_cred()?;
    Ok(PeerCredentials {
        user: UserId(cred.uid()),
        process: ProcessId(cred.pid().unwrap_or(0)),
    })
}

/// Runs the accept loop against `socket_path` until `shutdown` resolves,
/// then stops accepting and waits (bounded by `drain_timeout`) for
/// in-flight connections to finish their current request before
/// returning.
pub async fn run_accept_loop(
    socket_path: PathBuf,
    state: Arc<DaemonState>,
    dispatch: Arc<DispatchTable<BrokerConnection<ConnState>>>,
    shutdown: impl std::future::Future<Output = ()>,
    drain_timeout: std::time::Duration,
) -> anyhow::Result<()> {
    clear_stale_socket(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!(path = %socket_path.display(), "listening");

    // One reactor thread accepts; each accepted connection is serialized
    // internally by `serve_connection`'s single-task loop.
    let max_connections = state.config.server.max_connection_num as usize;
    let admission = Arc::new(Semaphore::new(max_connections.max(1)));
    let mut in_flight: tokio::task::JoinSet<()> = tokio::task::JoinSet::new();

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let credentials = match peer_credentials(&stream) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to query peer credentials, dropping connection");
                        continue;
                    }
                };

                let permit = match admission.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(
                            max_connections,
                            "rejecting connection: at configured connection limit"
                        );
                        continue;
                    }
                };

                let state = state.clone();
                let dispatch = dispatch.clone();
                crypto_daemon_telemetry::rpc_metrics().inc_connections_active();
                in_flight.spawn(async move {
                    let _permit = permit;
                    handle_connection(stream, credentials, state, dispatch).await;
                    crypto_daemon_telemetry::rpc_metrics().dec_connections_active();
                });
            }
        }
    }

    let drain = async {
        while in_flight.join_next().await.is_some() {}
    };
    if tokio::time::timeout(drain_timeout, drain).await.is_err() {
        tracing::warn!(
            remaining = in_flight.len(),
            "drain timeout elapsed with connections still active; exiting anyway"
        );
    }
    Ok(())
}

async fn handle_connection(
    mut stream: UnixStream,
    credentials: PeerCredentials,
    state: Arc<DaemonState>,
    dispatch: Arc<DispatchTable<BrokerConnection<ConnState>>>,
) {
    let connection_id = state.next_connection_id();
    let mut connection = BrokerConnection::new(credentials, Arc::new(ConnState { shared: state.clone(), connection_id }));

    tracing::debug!(user = credentials.user.0, process = credentials.process.0, "connection accepted");
    let result = serve_connection(&mut stream, &mut connection, &dispatch).await;

    // Every proxy this connection ever registered is dropped here, in
    // registration order, along with the `ConnState` itself — releasing
    // this connection's engine observer slot.
    state.engine.register_observer(connection_id, None);
    match result {
        Ok(()) => tracing::debug!("connection closed"),
        Err(e) => tracing::debug!(error = %e, "connection closed with a framing error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crypto_daemon_access::AccessControlMatrix;
    use crypto_daemon_keystore::KeyStoreEngine;

    use crate::config::DaemonConfig;
    use crate::handlers::build_dispatch_table;
    use crate::provider::CryptoProviderFactory;

    #[tokio::test]
    async fn accept_loop_shuts_down_on_signal_and_drains() {
        let db_dir = tempfile::tempdir().unwrap();
        let sock_dir = tempfile::tempdir().unwrap();
        let socket_path = sock_dir.path().join("crypto-daemon.sock");

        let engine = KeyStoreEngine::open(db_dir.path(), AccessControlMatrix::disabled(), false).unwrap();
        let config = DaemonConfig::from_json("{}").unwrap();
        let state = Arc::new(DaemonState::new(engine, CryptoProviderFactory::new([]), config));
        let dispatch = Arc::new(build_dispatch_table());

        let (tx, rx) = tokio::sync::oneshot::channel();
        let socket_path_clone = socket_path.clone();
        let task = tokio::spawn(async move {
            run_accept_loop(
                socket_path_clone,
                state,
                dispatch,
                async {
                    let _ = rx.await;
                },
                Duration::from_secs(2),
            )
            .await
        });

        // Give the listener a moment to bind before signaling shutdown.
        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket_path.exists());

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}

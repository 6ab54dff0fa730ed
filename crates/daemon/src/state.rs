// Path: crates/daemon/src/state.rs

//! The daemon-wide shared state every connection's handlers read:
//! the key-storage engine, the crypto-provider factory, and the daemon
//! configuration. One instance is built at startup and shared (via `Arc`)
//! across every `Connection` the accept loop spawns.

use std::sync::atomic::{AtomicU64, Ordering};

use crypto_daemon_keystore::KeyStoreEngine;

use crate::config::DaemonConfig;
use crate::provider::CryptoProviderFactory;

/// Shared, read-mostly daemon state composed once at startup: the broker
/// composes the codec, key-storage, crypto-provider-factory, and schema
/// validator collaborators through this struct.
pub struct DaemonState {
    /// The single key-storage engine instance, shared across every
    /// connection.
    pub engine: KeyStoreEngine,
    /// Known crypto providers this daemon will accept a handshake for.
    pub providers: CryptoProviderFactory,
    /// The parsed daemon configuration.
    pub config: DaemonConfig,
    next_connection_id: AtomicU64,
}

impl DaemonState {
    /// Builds the shared state.
    pub fn new(engine: KeyStoreEngine, providers: CryptoProviderFactory, config: DaemonConfig) -> Self {
        Self {
            engine,
            providers,
            config,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh [`crypto_daemon_keystore::ConnectionId`] for a
    /// newly accepted connection, used to key the engine's per-connection
    /// observer registration.
    pub fn next_connection_id(&self) -> crypto_daemon_keystore::ConnectionId {
        crypto_daemon_keystore::ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// The `S` type parameter of `crypto_daemon_rpc::broker::Connection<S>` for
/// this daemon: a handle to the shared daemon state plus the identity the
/// engine's observer registration is keyed on. Built once per accepted
/// connection, before the request/response loop starts.
pub struct ConnState {
    /// The daemon-wide shared state.
    pub shared: std::sync::Arc<DaemonState>,
    /// This connection's identity for [`KeyStoreEngine::register_observer`].
    pub connection_id: crypto_daemon_keystore::ConnectionId,
}

/// A connection carrying this daemon's state.
pub type Connection = crypto_daemon_rpc::broker::Connection<ConnState>;

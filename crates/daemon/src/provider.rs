// Path: crates/daemon/src/provider.rs

//! The crypto-provider factory and the server-side skeleton markers
//! installed into a connection's [`ProxyRegistry`] during the handshake.
//! Concrete cryptographic operations are an external collaborator; this
//! module only tracks *which* provider uuids the daemon knows about and
//! mirrors that knowledge across the IPC boundary as proxy-mirrored
//! skeleton objects.

use std::collections::HashSet;

use crypto_daemon_types::ids::Uuid;

/// The server-side skeleton installed under a client's chosen `ProxyId`
/// once `RegisterCryptoProvider` resolves against a known provider.
/// Concrete encrypt/sign/derive dispatch against this handle is the
/// external crypto provider's concern, not this daemon's.
#[derive(Debug, Clone, Copy)]
pub struct CryptoProviderHandle {
    /// The registered provider's uuid.
    pub uuid: Uuid,
}

/// The singleton skeleton installed under a client's chosen `ProxyId` once
/// `RegisterKeyStorageProvider` runs. Carries no state of its own — the
/// actual [`crypto_daemon_keystore::KeyStoreEngine`] lives in the daemon's
/// shared state and is reached through `Connection::state`, not through
/// this marker; the marker only proves the handshake ran so keystorage
/// detail-tasks can validate their `target_proxy`.
#[derive(Debug, Clone, Copy)]
pub struct KeyStorageProviderHandle;

/// The skeleton installed once `RegisterX509Provider` succeeds. X.509
/// certificate validation logic itself is out of scope; this marker only
/// proves the provider was configured and registered.
#[derive(Debug, Clone, Copy)]
pub struct X509ProviderHandle;

/// The set of crypto-provider uuids this daemon instance will accept a
/// `RegisterCryptoProvider` handshake for, supplied at startup (CLI flag
/// or provisioning file) since concrete providers are out of scope.
#[derive(Debug, Clone, Default)]
pub struct CryptoProviderFactory {
    known: HashSet<Uuid>,
}

impl CryptoProviderFactory {
    /// Builds a factory that recognizes exactly `known`.
    pub fn new(known: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// Looks up `uuid`, returning a fresh skeleton handle if it is known.
    pub fn resolve(&self, uuid: Uuid) -> Option<CryptoProviderHandle> {
        self.known.contains(&uuid).then_some(CryptoProviderHandle { uuid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_only_known_providers() {
        let known = Uuid::from_bytes([1u8; 16]);
        let unknown = Uuid::from_bytes([2u8; 16]);
        let factory = CryptoProviderFactory::new([known]);
        assert!(factory.resolve(known).is_some());
        assert!(factory.resolve(unknown).is_none());
    }
}

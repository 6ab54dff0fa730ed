// Path: crates/daemon/src/handlers/handshake.rs

//! The three-step provider-registration handshake: every other
//! `BasicTask` requires one of these to have already installed its
//! skeleton under the `target_proxy` those requests name.

use crypto_daemon_rpc::dispatch::DispatchTable;
use crypto_daemon_rpc::message::{handshake_detail, BasicTask};
use crypto_daemon_rpc::wire::WireDecode;
use crypto_daemon_types::error::SecurityErrc;
use crypto_daemon_types::ids::{ProxyId, Uuid};

use crate::provider::{KeyStorageProviderHandle, X509ProviderHandle};
use crate::state::Connection;

use super::respond;

pub fn register(table: &mut DispatchTable<Connection>) {
    let basic = BasicTask::Handshake.code();
    table.register(
        basic,
        handshake_detail::REGISTER_CRYPTO_PROVIDER,
        Box::new(register_crypto_provider),
    );
    table.register(
        basic,
        handshake_detail::REGISTER_KEY_STORAGE_PROVIDER,
        Box::new(register_key_storage_provider),
    );
    table.register(
        basic,
        handshake_detail::REGISTER_X509_PROVIDER,
        Box::new(register_x509_provider),
    );
}

fn register_crypto_provider(
    _header: &crypto_daemon_rpc::message::MessageHeader,
    body: &[u8],
    conn: &Connection,
) -> Result<Vec<u8>, crypto_daemon_types::error::RpcError> {
    let mut cursor = body;
    let provider_uuid = Uuid::decode(&mut cursor)?;
    let proxy_id = ProxyId::decode(&mut cursor)?;

    let result = match conn.state.shared.providers.resolve(provider_uuid) {
        Some(handle) => {
            conn.proxies.lock().register_at(proxy_id, Box::new(handle));
            Ok(())
        }
        None => Err(SecurityErrc::UnknownIdentifier),
    };
    Ok(respond(result))
}

fn register_key_storage_provider(
    _header: &crypto_daemon_rpc::message::MessageHeader,
    body: &[u8],
    conn: &Connection,
) -> Result<Vec<u8>, crypto_daemon_types::error::RpcError> {
    let mut cursor = body;
    let proxy_id = ProxyId::decode(&mut cursor)?;
    conn.proxies.lock().register_at(proxy_id, Box::new(KeyStorageProviderHandle));
    Ok(respond(Ok(())))
}

fn register_x509_provider(
    _header: &crypto_daemon_rpc::message::MessageHeader,
    body: &[u8],
    conn: &Connection,
) -> Result<Vec<u8>, crypto_daemon_types::error::RpcError> {
    let mut cursor = body;
    let proxy_id = ProxyId::decode(&mut cursor)?;

    let result = if conn.state.shared.config.x509.is_some() {
        conn.proxies.lock().register_at(proxy_id, Box::new(X509ProviderHandle));
        Ok(())
    } else {
        Err(SecurityErrc::Unsupported)
    };
    Ok(respond(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crypto_daemon_access::AccessControlMatrix;
    use crypto_daemon_keystore::KeyStoreEngine;
    use crypto_daemon_rpc::broker::PeerCredentials;
    use crypto_daemon_rpc::wire::WireEncode;
    use crypto_daemon_types::ids::{ProcessId, UserId};
    use tempfile::tempdir;

    use crate::config::DaemonConfig;
    use crate::provider::CryptoProviderFactory;
    use crate::state::{ConnState, DaemonState};

    use super::*;

    fn test_connection(providers: CryptoProviderFactory, config: DaemonConfig) -> Connection {
        let root = tempdir().unwrap();
        let engine = KeyStoreEngine::open(root.path(), AccessControlMatrix::disabled(), false).unwrap();
        let shared = Arc::new(DaemonState::new(engine, providers, config));
        let connection_id = shared.next_connection_id();
        Connection::new(
            PeerCredentials {
                user: UserId(1),
                process: ProcessId(1),
            },
            Arc::new(ConnState { shared, connection_id }),
        )
    }

    fn encode_body(parts: impl FnOnce(&mut bytes::BytesMut)) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        parts(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn unknown_provider_is_unknown_identifier() {
        let conn = test_connection(CryptoProviderFactory::new([]), DaemonConfig::from_json("{}").unwrap());
        let header = crypto_daemon_rpc::message::MessageHeader {
            basic_task: BasicTask::Handshake.code(),
            detail_task: handshake_detail::REGISTER_CRYPTO_PROVIDER,
            target_proxy: 0,
            arg_proxies: vec![],
        };
        let body = encode_body(|buf| {
            Uuid::from_bytes([9u8; 16]).encode(buf);
            ProxyId(1).encode(buf);
        });
        let response = register_crypto_provider(&header, &body, &conn).unwrap();
        let mut cursor = &response[..];
        let result = crypto_daemon_rpc::wire::WireResult::<()>::decode(&mut cursor).unwrap();
        assert_eq!(result.0, Err(SecurityErrc::UnknownIdentifier));
    }

    #[test]
    fn known_provider_installs_a_skeleton_under_the_chosen_proxy() {
        let known = Uuid::from_bytes([1u8; 16]);
        let conn = test_connection(CryptoProviderFactory::new([known]), DaemonConfig::from_json("{}").unwrap());
        let header = crypto_daemon_rpc::message::MessageHeader {
            basic_task: BasicTask::Handshake.code(),
            detail_task: handshake_detail::REGISTER_CRYPTO_PROVIDER,
            target_proxy: 0,
            arg_proxies: vec![],
        };
        let body = encode_body(|buf| {
            known.encode(buf);
            ProxyId(5).encode(buf);
        });
        let response = register_crypto_provider(&header, &body, &conn).unwrap();
        let mut cursor = &response[..];
        let result = crypto_daemon_rpc::wire::WireResult::<()>::decode(&mut cursor).unwrap();
        assert_eq!(result.0, Ok(()));
        assert!(conn.proxies.lock().get(ProxyId(5)).is_ok());
    }

    #[test]
    fn x509_handshake_unsupported_without_configured_section() {
        let conn = test_connection(CryptoProviderFactory::new([]), DaemonConfig::from_json("{}").unwrap());
        let header = crypto_daemon_rpc::message::MessageHeader {
            basic_task: BasicTask::Handshake.code(),
            detail_task: handshake_detail::REGISTER_X509_PROVIDER,
            target_proxy: 0,
            arg_proxies: vec![],
        };
        let body = encode_body(|buf| ProxyId(1).encode(buf));
        let response = register_x509_provider(&header, &body, &conn).unwrap();
        let mut cursor = &response[..];
        let result = crypto_daemon_rpc::wire::WireResult::<()>::decode(&mut cursor).unwrap();
        assert_eq!(result.0, Err(SecurityErrc::Unsupported));
    }
}

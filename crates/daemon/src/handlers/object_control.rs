// Path: crates/daemon/src/handlers/object_control.rs

//! Proxy lifecycle control, dispatched under `BasicTask::ObjectControl`:
//! early release of a single proxy before connection teardown, and a
//! liveness check that a proxy is still registered.

use crypto_daemon_rpc::dispatch::DispatchTable;
use crypto_daemon_rpc::message::{object_control_detail, BasicTask, MessageHeader};
use crypto_daemon_rpc::wire::WireDecode;
use crypto_daemon_types::error::{RpcError, SecurityErrc};
use crypto_daemon_types::ids::ProxyId;

use crate::state::Connection;

use super::respond;

pub fn register(table: &mut DispatchTable<Connection>) {
    let basic = BasicTask::ObjectControl.code();
    table.register(basic, object_control_detail::RELEASE, Box::new(release));
    table.register(basic, object_control_detail::PING, Box::new(ping));
}

fn release(_header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    let mut cursor = body;
    let proxy_id = ProxyId::decode(&mut cursor)?;
    let result = match conn.proxies.lock().release(proxy_id) {
        Some(_) => Ok(()),
        None => Err(SecurityErrc::UnreservedResource),
    };
    Ok(respond(result))
}

fn ping(_header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    let mut cursor = body;
    let proxy_id = ProxyId::decode(&mut cursor)?;
    let result = conn
        .proxies
        .lock()
        .get(proxy_id)
        .map(|_| ())
        .map_err(|_| SecurityErrc::UnreservedResource);
    Ok(respond(result))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crypto_daemon_access::AccessControlMatrix;
    use crypto_daemon_keystore::KeyStoreEngine;
    use crypto_daemon_rpc::broker::PeerCredentials;
    use crypto_daemon_rpc::wire::{WireEncode, WireResult};
    use crypto_daemon_types::ids::{ProcessId, UserId};
    use tempfile::tempdir;

    use crate::config::DaemonConfig;
    use crate::provider::CryptoProviderFactory;
    use crate::state::{ConnState, DaemonState};

    use super::*;

    fn test_connection() -> Connection {
        let root = tempdir().unwrap();
        let engine = KeyStoreEngine::open(root.path(), AccessControlMatrix::disabled(), false).unwrap();
        let shared = Arc::new(DaemonState::new(
            engine,
            CryptoProviderFactory::new([]),
            DaemonConfig::from_json("{}").unwrap(),
        ));
        let connection_id = shared.next_connection_id();
        Connection::new(
            PeerCredentials {
                user: UserId(1),
                process: ProcessId(1),
            },
            Arc::new(ConnState { shared, connection_id }),
        )
    }

    fn header(detail_task: u32) -> MessageHeader {
        MessageHeader {
            basic_task: BasicTask::ObjectControl.code(),
            detail_task,
            target_proxy: 0,
            arg_proxies: vec![],
        }
    }

    fn encode_proxy(id: ProxyId) -> Vec<u8> {
        let mut buf = bytes::BytesMut::new();
        id.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn ping_unregistered_proxy_is_unreserved_resource() {
        let conn = test_connection();
        let response = ping(&header(object_control_detail::PING), &encode_proxy(ProxyId(7)), &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<()>::decode(&mut cursor).unwrap().0, Err(SecurityErrc::UnreservedResource));
    }

    #[test]
    fn release_then_ping_reports_gone() {
        let conn = test_connection();
        conn.proxies.lock().register_at(ProxyId(3), Box::new(()));

        let response = release(&header(object_control_detail::RELEASE), &encode_proxy(ProxyId(3)), &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<()>::decode(&mut cursor).unwrap().0, Ok(()));

        let response = ping(&header(object_control_detail::PING), &encode_proxy(ProxyId(3)), &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<()>::decode(&mut cursor).unwrap().0, Err(SecurityErrc::UnreservedResource));
    }
}

// Path: crates/daemon/src/handlers/keystorage.rs

//! Operations against the key storage engine, dispatched under
//! `BasicTask::KeyStorage` against the
//! `CompositeKeyStorageProvider` skeleton a connection installs during the
//! handshake. Every handler here first confirms `header.target_proxy`
//! names that skeleton, except [`read_container`] and
//! [`poll_observed_updates`], whose target is the container/queue proxy
//! the operation itself acts on.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

use crypto_daemon_keystore::{Observer, OwnerContainer, UserContainer, VolatileContainer};
use crypto_daemon_rpc::dispatch::DispatchTable;
use crypto_daemon_rpc::message::{keystorage_detail, BasicTask, MessageHeader};
use crypto_daemon_rpc::wire::{WireDecode, WireEncode};
use crypto_daemon_types::error::{RpcError, SecurityErrc};
use crypto_daemon_types::ids::{CryptoObjectUid, SlotNumber, Uuid};

use crate::provider::KeyStorageProviderHandle;
use crate::state::Connection;

use super::wire_adapters::{decode_content_props, decode_object_type, encode_content_props, encode_object_type, encode_prototype_props};
use super::{call_context, respond, respond_plain};

/// The per-connection subscription queue installed by `RegisterObserver`
/// and drained by `PollObservedUpdates`. The engine calls `on_slot_updated`
/// synchronously from whatever thread committed the write, so writes to
/// the backing `Vec` must be short and non-blocking — observer
/// callbacks must not block.
pub struct ObserverQueue(Mutex<Vec<SlotNumber>>);

impl ObserverQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    fn drain(&self) -> Vec<SlotNumber> {
        std::mem::take(&mut self.0.lock())
    }
}

impl Observer for ObserverQueue {
    fn on_slot_updated(&self, slot: SlotNumber) {
        self.0.lock().push(slot);
    }
}

fn require_keystorage_provider(header: &MessageHeader, conn: &Connection) -> Result<(), RpcError> {
    conn.proxies
        .lock()
        .get_downcast::<KeyStorageProviderHandle>(header.target())
        .map(|_| ())
}

pub fn register(table: &mut DispatchTable<Connection>) {
    let basic = BasicTask::KeyStorage.code();
    table.register(basic, keystorage_detail::FIND_SLOT_BY_UUID, Box::new(find_slot_by_uuid));
    table.register(basic, keystorage_detail::FIND_SLOT_BY_SPECIFIER, Box::new(find_slot_by_specifier));
    table.register(basic, keystorage_detail::FIND_OBJECT, Box::new(find_object));
    table.register(basic, keystorage_detail::FIND_REFERRING_SLOT, Box::new(find_referring_slot));
    table.register(basic, keystorage_detail::IS_EMPTY, Box::new(is_empty));
    table.register(basic, keystorage_detail::OPEN_AS_USER, Box::new(open_as_user));
    table.register(basic, keystorage_detail::OPEN_AS_OWNER, Box::new(open_as_owner));
    table.register(basic, keystorage_detail::SAVE_COPY, Box::new(save_copy));
    table.register(basic, keystorage_detail::CLEAR, Box::new(clear));
    table.register(basic, keystorage_detail::GET_PROTOTYPED_PROPS, Box::new(get_prototyped_props));
    table.register(basic, keystorage_detail::GET_CONTENT_PROPS, Box::new(get_content_props));
    table.register(basic, keystorage_detail::BEGIN_TRANSACTION, Box::new(begin_transaction));
    table.register(basic, keystorage_detail::COMMIT_TRANSACTION, Box::new(commit_transaction));
    table.register(basic, keystorage_detail::ROLLBACK_TRANSACTION, Box::new(rollback_transaction));
    table.register(basic, keystorage_detail::RESET_REFERENCE, Box::new(reset_reference));
    table.register(
        basic,
        keystorage_detail::CAN_LOAD_TO_CRYPTO_PROVIDER,
        Box::new(can_load_to_crypto_provider),
    );
    table.register(basic, keystorage_detail::REGISTER_OBSERVER, Box::new(register_observer));
    table.register(basic, keystorage_detail::READ_CONTAINER, Box::new(read_container));
    table.register(basic, keystorage_detail::POLL_OBSERVED_UPDATES, Box::new(poll_observed_updates));
}

fn find_slot_by_uuid(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot_uid = Uuid::decode(&mut cursor)?;
    let found = conn.state.shared.engine.find_slot_by_uuid(slot_uid);
    Ok(respond_plain(found))
}

fn find_slot_by_specifier(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let name = String::decode(&mut cursor)?;
    let result = conn
        .state
        .shared
        .engine
        .find_slot_by_specifier(&name)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn find_object(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let couid = CryptoObjectUid::decode(&mut cursor)?;
    let object_type = decode_object_type(&mut cursor)?;
    let provider_filter = Uuid::decode(&mut cursor)?;
    let previous_found = SlotNumber::decode(&mut cursor)?;
    let found = conn
        .state
        .shared
        .engine
        .find_object(couid, object_type, provider_filter, previous_found);
    Ok(respond_plain(found))
}

fn find_referring_slot(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let target_slot = SlotNumber::decode(&mut cursor)?;
    let previous_found = SlotNumber::decode(&mut cursor)?;
    let result = conn
        .state
        .shared
        .engine
        .find_referring_slot(target_slot, previous_found)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn is_empty(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let result = conn.state.shared.engine.is_empty(slot).map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn open_as_user(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let subscribe = bool::decode(&mut cursor)?;
    let ctx = call_context(conn);
    match conn.state.shared.engine.open_as_user(ctx, slot, subscribe) {
        Ok(container) => {
            let proxy_id = conn.proxies.lock().register(Box::new(container));
            Ok(respond(Ok(proxy_id)))
        }
        Err(e) => Ok(respond::<crypto_daemon_types::ids::ProxyId>(Err(SecurityErrc::from(&e)))),
    }
}

fn open_as_owner(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let ctx = call_context(conn);
    match conn.state.shared.engine.open_as_owner(ctx, slot) {
        Ok(container) => {
            let proxy_id = conn.proxies.lock().register(Box::new(container));
            Ok(respond(Ok(proxy_id)))
        }
        Err(e) => Ok(respond::<crypto_daemon_types::ids::ProxyId>(Err(SecurityErrc::from(&e)))),
    }
}

fn save_copy(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let target_slot = SlotNumber::decode(&mut cursor)?;
    let props = decode_content_props(&mut cursor)?;
    let payload = Vec::<u8>::decode(&mut cursor)?;
    let source = VolatileContainer::new(props, payload);
    let ctx = call_context(conn);
    let result = conn
        .state
        .shared
        .engine
        .save_copy(ctx, target_slot, &source)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn clear(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let ctx = call_context(conn);
    let result = conn.state.shared.engine.clear(ctx, slot).map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn get_prototyped_props(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let result = conn.state.shared.engine.get_prototyped_props(slot);
    let mut buf = BytesMut::new();
    match result {
        Ok(props) => {
            true.encode(&mut buf);
            encode_prototype_props(&mut buf, &props);
        }
        Err(e) => {
            false.encode(&mut buf);
            (SecurityErrc::from(&e) as u64).encode(&mut buf);
        }
    }
    Ok(buf.to_vec())
}

fn get_content_props(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let ctx = call_context(conn);
    let result = conn.state.shared.engine.get_content_props(ctx, slot);
    let mut buf = BytesMut::new();
    match result {
        Ok(props) => {
            true.encode(&mut buf);
            encode_content_props(&mut buf, &props);
        }
        Err(e) => {
            false.encode(&mut buf);
            (SecurityErrc::from(&e) as u64).encode(&mut buf);
        }
    }
    Ok(buf.to_vec())
}

fn begin_transaction(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let scope = Vec::<SlotNumber>::decode(&mut cursor)?;
    let ctx = call_context(conn);
    let result = conn
        .state
        .shared
        .engine
        .begin_transaction(ctx, scope)
        .map(|id| id.0)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn commit_transaction(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let id = crypto_daemon_keystore::TransactionId(u64::decode(&mut cursor)?);
    let result = conn
        .state
        .shared
        .engine
        .commit_transaction(id)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn rollback_transaction(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let id = crypto_daemon_keystore::TransactionId(u64::decode(&mut cursor)?);
    let result = conn
        .state
        .shared
        .engine
        .rollback_transaction(id)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn reset_reference(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let referrer_slot = SlotNumber::decode(&mut cursor)?;
    let referenced_slot = SlotNumber::decode(&mut cursor)?;
    let ctx = call_context(conn);
    let result = conn
        .state
        .shared
        .engine
        .reset_reference(ctx, referrer_slot, referenced_slot)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn can_load_to_crypto_provider(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let slot = SlotNumber::decode(&mut cursor)?;
    let provider_uuid = Uuid::decode(&mut cursor)?;
    let result = conn
        .state
        .shared
        .engine
        .can_load_to_crypto_provider(slot, provider_uuid)
        .map_err(|e| SecurityErrc::from(&e));
    Ok(respond(result))
}

fn register_observer(header: &MessageHeader, body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    require_keystorage_provider(header, conn)?;
    let mut cursor = body;
    let proxy_id = crypto_daemon_types::ids::ProxyId::decode(&mut cursor)?;
    let queue = ObserverQueue::new();
    conn.state
        .shared
        .engine
        .register_observer(conn.state.connection_id, Some(queue.clone() as Arc<dyn Observer>));
    conn.proxies.lock().register_at(proxy_id, Box::new(queue));
    Ok(respond(Ok(())))
}

fn read_container(header: &MessageHeader, _body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    let target = header.target();
    let result = {
        let proxies = conn.proxies.lock();
        if let Ok(owner) = proxies.get_downcast::<OwnerContainer>(target) {
            owner.read()
        } else {
            proxies.get_downcast::<UserContainer>(target)?.read()
        }
    };
    let mut buf = BytesMut::new();
    match result.map_err(|e| SecurityErrc::from(&e)) {
        Ok((props, payload)) => {
            true.encode(&mut buf);
            encode_content_props(&mut buf, &props);
            payload.encode(&mut buf);
        }
        Err(e) => {
            false.encode(&mut buf);
            (e as u64).encode(&mut buf);
        }
    }
    Ok(buf.to_vec())
}

fn poll_observed_updates(header: &MessageHeader, _body: &[u8], conn: &Connection) -> Result<Vec<u8>, RpcError> {
    let target = header.target();
    let updates = {
        let proxies = conn.proxies.lock();
        proxies.get_downcast::<Arc<ObserverQueue>>(target)?.drain()
    };
    Ok(respond_plain(updates))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crypto_daemon_access::AccessControlMatrix;
    use crypto_daemon_keystore::{KeyStoreEngine, ObjectType, PrototypeProps};
    use crypto_daemon_rpc::broker::PeerCredentials;
    use crypto_daemon_rpc::wire::WireResult;
    use crypto_daemon_types::ids::{ProcessId, ProxyId, UserId};
    use tempfile::tempdir;

    use crate::config::DaemonConfig;
    use crate::provider::CryptoProviderFactory;
    use crate::state::{ConnState, DaemonState};

    use super::*;

    fn test_connection() -> (Connection, tempfile::TempDir) {
        let root = tempdir().unwrap();
        let engine = KeyStoreEngine::open(root.path(), AccessControlMatrix::disabled(), false).unwrap();
        engine
            .create_slot(
                SlotNumber(1),
                Uuid::from_bytes([1u8; 16]),
                UserId(1),
                Uuid::NIL,
                PrototypeProps::permissive(ObjectType::Opaque, 1024),
            )
            .unwrap();
        let shared = Arc::new(DaemonState::new(
            engine,
            CryptoProviderFactory::new([]),
            DaemonConfig::from_json("{}").unwrap(),
        ));
        let connection_id = shared.next_connection_id();
        let conn = Connection::new(
            PeerCredentials {
                user: UserId(1),
                process: ProcessId(1),
            },
            Arc::new(ConnState { shared, connection_id }),
        );
        conn.proxies.lock().register_at(ProxyId(1), Box::new(KeyStorageProviderHandle));
        (conn, root)
    }

    fn header(detail_task: u32) -> MessageHeader {
        MessageHeader {
            basic_task: BasicTask::KeyStorage.code(),
            detail_task,
            target_proxy: 1,
            arg_proxies: vec![],
        }
    }

    fn encode(parts: impl FnOnce(&mut BytesMut)) -> Vec<u8> {
        let mut buf = BytesMut::new();
        parts(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn missing_keystorage_handshake_is_unreserved_resource() {
        let (conn, _root) = test_connection();
        let bad_header = MessageHeader {
            basic_task: BasicTask::KeyStorage.code(),
            detail_task: keystorage_detail::IS_EMPTY,
            target_proxy: 99,
            arg_proxies: vec![],
        };
        let body = encode(|buf| SlotNumber(1).encode(buf));
        let err = is_empty(&bad_header, &body, &conn).unwrap_err();
        assert!(matches!(err, RpcError::UnreservedResource(_)));
    }

    #[test]
    fn is_empty_reports_true_for_a_freshly_created_slot() {
        let (conn, _root) = test_connection();
        let body = encode(|buf| SlotNumber(1).encode(buf));
        let response = is_empty(&header(keystorage_detail::IS_EMPTY), &body, &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<bool>::decode(&mut cursor).unwrap().0, Ok(true));
    }

    #[test]
    fn save_copy_then_is_empty_reports_false() {
        let (conn, _root) = test_connection();
        let body = encode(|buf| {
            SlotNumber(1).encode(buf);
            encode_content_props(
                buf,
                &crypto_daemon_keystore::ContentProps {
                    object_type: ObjectType::Opaque,
                    couid: CryptoObjectUid {
                        generator: Uuid::from_bytes([2u8; 16]),
                        version: 0,
                    },
                    dependency_couid: None,
                    allowed_usage: 0,
                    bit_size: 0,
                    algorithm_id: 0,
                    exportable: true,
                },
            );
            vec![1u8, 2, 3].encode(buf);
        });
        let response = save_copy(&header(keystorage_detail::SAVE_COPY), &body, &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<()>::decode(&mut cursor).unwrap().0, Ok(()));

        let body = encode(|buf| SlotNumber(1).encode(buf));
        let response = is_empty(&header(keystorage_detail::IS_EMPTY), &body, &conn).unwrap();
        let mut cursor = &response[..];
        assert_eq!(WireResult::<bool>::decode(&mut cursor).unwrap().0, Ok(false));
    }

    #[test]
    fn observer_queue_reports_updates_after_save_copy() {
        let (conn, _root) = test_connection();
        let register_body = encode(|buf| ProxyId(42).encode(buf));
        register_observer(&header(keystorage_detail::REGISTER_OBSERVER), &register_body, &conn).unwrap();

        let open_body = encode(|buf| {
            SlotNumber(1).encode(buf);
            true.encode(buf);
        });
        let response = open_as_user(&header(keystorage_detail::OPEN_AS_USER), &open_body, &conn).unwrap();
        let mut cursor = &response[..];
        assert!(matches!(
            WireResult::<ProxyId>::decode(&mut cursor).unwrap().0,
            Err(SecurityErrc::EmptyContainer)
        ));

        let save_body = encode(|buf| {
            SlotNumber(1).encode(buf);
            encode_content_props(
                buf,
                &crypto_daemon_keystore::ContentProps {
                    object_type: ObjectType::Opaque,
                    couid: CryptoObjectUid {
                        generator: Uuid::from_bytes([2u8; 16]),
                        version: 0,
                    },
                    dependency_couid: None,
                    allowed_usage: 0,
                    bit_size: 0,
                    algorithm_id: 0,
                    exportable: true,
                },
            );
            vec![9u8].encode(buf);
        });
        save_copy(&header(keystorage_detail::SAVE_COPY), &save_body, &conn).unwrap();

        let poll_header = MessageHeader {
            basic_task: BasicTask::KeyStorage.code(),
            detail_task: keystorage_detail::POLL_OBSERVED_UPDATES,
            target_proxy: 42,
            arg_proxies: vec![],
        };
        let response = poll_observed_updates(&poll_header, &[], &conn).unwrap();
        let mut cursor = &response[..];
        let updates = Vec::<SlotNumber>::decode(&mut cursor).unwrap();
        assert_eq!(updates, vec![SlotNumber(1)]);
    }
}

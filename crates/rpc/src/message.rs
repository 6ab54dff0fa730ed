//! The two-level dispatch key and the positional header shared by every
//! request and response message.

use bytes::{Buf, BufMut};

use crypto_daemon_types::error::RpcError;
use crypto_daemon_types::ids::ProxyId;

use crate::wire::{WireDecode, WireEncode};

/// The coarse dispatch category (`basic_task`'s meaning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicTask {
    /// The three-step provider-registration handshake.
    Handshake,
    /// Operations against a registered crypto provider.
    Provider,
    /// Operations against the key storage engine.
    KeyStorage,
    /// Operations against the X.509 provider, if configured.
    X509,
    /// Proxy lifecycle control (release, ping).
    ObjectControl,
}

impl BasicTask {
    /// The wire-numeric value for this category.
    pub const fn code(self) -> u32 {
        match self {
            Self::Handshake => 0,
            Self::Provider => 1,
            Self::KeyStorage => 2,
            Self::X509 => 3,
            Self::ObjectControl => 4,
        }
    }
}

/// Detail tasks under `BasicTask::Handshake`.
pub mod handshake_detail {
    /// `RegisterCryptoProvider(provider_uuid, proxy_id)`.
    pub const REGISTER_CRYPTO_PROVIDER: u32 = 0;
    /// `RegisterKeyStorageProvider(proxy_id)`.
    pub const REGISTER_KEY_STORAGE_PROVIDER: u32 = 1;
    /// `RegisterX509Provider(proxy_id)`.
    pub const REGISTER_X509_PROVIDER: u32 = 2;
}

/// Detail tasks under `BasicTask::KeyStorage`, dispatched against the
/// `CompositeKeyStorageProvider` skeleton registered during the handshake.
pub mod keystorage_detail {
    /// `FindSlotByUuid(slot_uid) -> Option<(SlotNumber, provider_uuid)>`.
    pub const FIND_SLOT_BY_UUID: u32 = 0;
    /// `FindSlotBySpecifier(name) -> Result<(SlotNumber, provider_uuid)>`.
    pub const FIND_SLOT_BY_SPECIFIER: u32 = 1;
    /// `FindObject(couid, type, provider_filter, previous_found) -> SlotNumber`.
    pub const FIND_OBJECT: u32 = 2;
    /// `FindReferringSlot(target_slot, previous_found) -> Result<SlotNumber>`.
    pub const FIND_REFERRING_SLOT: u32 = 3;
    /// `IsEmpty(slot) -> Result<bool>`.
    pub const IS_EMPTY: u32 = 4;
    /// `OpenAsUser(slot, subscribe) -> Result<ProxyId>` (a `UserContainer`).
    pub const OPEN_AS_USER: u32 = 5;
    /// `OpenAsOwner(slot) -> Result<ProxyId>` (an `OwnerContainer`).
    pub const OPEN_AS_OWNER: u32 = 6;
    /// `SaveCopy(target_slot, source_proxy_or_inline, couid, ...) -> Result<()>`.
    pub const SAVE_COPY: u32 = 7;
    /// `Clear(slot) -> Result<()>`.
    pub const CLEAR: u32 = 8;
    /// `GetPrototypedProps(slot) -> Result<PrototypeProps>`.
    pub const GET_PROTOTYPED_PROPS: u32 = 9;
    /// `GetContentProps(slot) -> Result<ContentProps>`.
    pub const GET_CONTENT_PROPS: u32 = 10;
    /// `BeginTransaction(scope) -> Result<TransactionId>`.
    pub const BEGIN_TRANSACTION: u32 = 11;
    /// `CommitTransaction(id) -> Result<()>`.
    pub const COMMIT_TRANSACTION: u32 = 12;
    /// `RollbackTransaction(id) -> Result<()>`.
    pub const ROLLBACK_TRANSACTION: u32 = 13;
    /// `ResetReference(referrer_slot, referenced_slot) -> Result<()>`.
    pub const RESET_REFERENCE: u32 = 14;
    /// `CanLoadToCryptoProvider(slot, provider_uuid) -> Result<bool>`.
    pub const CAN_LOAD_TO_CRYPTO_PROVIDER: u32 = 15;
    /// `RegisterObserver(proxy_id) -> Result<()>` — installs a freshly
    /// allocated update queue under the caller-chosen `proxy_id` (the same
    /// client-names-it-explicitly pattern the handshake skeletons use) and
    /// subscribes it as this connection's single observer slot, displacing
    /// any previous registration.
    pub const REGISTER_OBSERVER: u32 = 16;
    /// `Read(container_proxy) -> Result<(ContentProps, payload)>` against
    /// an already-open `OwnerContainer`/`UserContainer` proxy.
    pub const READ_CONTAINER: u32 = 17;
    /// `PollObservedUpdates(queue_proxy) -> Vec<SlotNumber>` — drains the
    /// slots reported updated since the last poll.
    pub const POLL_OBSERVED_UPDATES: u32 = 18;
}

/// Detail tasks under `BasicTask::ObjectControl`.
pub mod object_control_detail {
    /// `Release(proxy_id) -> Result<()>` — drops one proxy early, before
    /// connection teardown.
    pub const RELEASE: u32 = 0;
    /// `Ping(proxy_id) -> Result<()>` — liveness check that `proxy_id` is
    /// still registered.
    pub const PING: u32 = 1;
}

/// The fixed header every request/response message begins with:
/// `basic_task`, `detail_task`, `target_proxy`, `arg_proxies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Coarse dispatch category.
    pub basic_task: u32,
    /// Operation within `basic_task`.
    pub detail_task: u32,
    /// The receiver object's `ProxyId` (0 for handshake messages).
    pub target_proxy: u64,
    /// `ProxyId`s of object-typed arguments.
    pub arg_proxies: Vec<u64>,
}

impl MessageHeader {
    /// The typed receiver proxy id.
    pub fn target(&self) -> ProxyId {
        ProxyId(self.target_proxy)
    }
}

impl WireEncode for MessageHeader {
    fn encode(&self, buf: &mut impl BufMut) {
        self.basic_task.encode(buf);
        self.detail_task.encode(buf);
        self.target_proxy.encode(buf);
        self.arg_proxies.encode(buf);
    }
}
impl WireDecode for MessageHeader {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(Self {
            basic_task: u32::decode(buf)?,
            detail_task: u32::decode(buf)?,
            target_proxy: u64::decode(buf)?,
            arg_proxies: Vec::<u64>::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = MessageHeader {
            basic_task: BasicTask::KeyStorage.code(),
            detail_task: 3,
            target_proxy: 42,
            arg_proxies: vec![1, 2],
        };
        let mut buf = bytes::BytesMut::new();
        header.encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(MessageHeader::decode(&mut cursor).unwrap(), header);
    }
}

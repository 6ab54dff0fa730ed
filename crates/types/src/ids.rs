// Path: crates/types/src/ids.rs

//! Opaque identifiers used across the IPC boundary and the key store.

use serde::{Deserialize, Serialize};

/// A 128-bit opaque identifier. Compared as raw bytes; carries no ordering
/// semantics beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uuid(pub [u8; 16]);

impl Uuid {
    /// The nil UUID, used by `KeySlot::provider_uuid` to mean "any provider".
    pub const NIL: Uuid = Uuid([0u8; 16]);

    /// Builds a `Uuid` from its 16 raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns true if this is the nil UUID.
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A crypto-object unique identifier: the `Uuid` of the provider that
/// generated the object, paired with a monotonically assigned version.
///
/// Equality compares the pair; `version` is bumped on content mutation
/// (see the key-storage engine's COUID-versioning rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CryptoObjectUid {
    /// The `Uuid` of the provider that generated this object.
    pub generator: Uuid,
    /// Monotonically-assigned version within `generator`'s lineage.
    pub version: u64,
}

impl CryptoObjectUid {
    /// Builds a COUID at version 0.
    pub const fn new(generator: Uuid) -> Self {
        Self {
            generator,
            version: 0,
        }
    }
}

/// A 64-bit opaque token identifying a remote object across the IPC
/// boundary. Unique per connection for the lifetime of that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyId(pub u64);

impl ProxyId {
    /// The reserved id meaning "no object" on the wire (`tag_nullptr`).
    pub const NULL: ProxyId = ProxyId(0);
}

/// A 64-bit index into the slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotNumber(pub u64);

impl SlotNumber {
    /// Reserved sentinel meaning "no slot" / "search exhausted".
    pub const INVALID: SlotNumber = SlotNumber(u64::MAX);

    /// Returns true if this is the `INVALID` sentinel.
    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }
}

/// Caller identity supplied by the transport (peer-credential style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u32);

/// The OS process id of the connected peer, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_uuid_is_nil() {
        assert!(Uuid::NIL.is_nil());
        assert!(!Uuid::from_bytes([1; 16]).is_nil());
    }

    #[test]
    fn slot_number_invalid_sentinel() {
        assert!(SlotNumber::INVALID.is_invalid());
        assert!(!SlotNumber(0).is_invalid());
    }

    #[test]
    fn couid_new_starts_at_version_zero() {
        let couid = CryptoObjectUid::new(Uuid::from_bytes([7; 16]));
        assert_eq!(couid.version, 0);
    }
}

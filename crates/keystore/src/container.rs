//! [`TrustedContainer`] handles: [`OwnerContainer`] (exclusive, read/write)
//! and [`UserContainer`] (shared, read-only), plus [`VolatileContainer`]
//! for standalone content not yet persisted to any slot (e.g. an object a
//! crypto provider just generated, about to be handed to `save_copy`).

use crypto_daemon_types::error::KeyStoreError;
use crypto_daemon_types::ids::SlotNumber;

use crate::engine::KeyStoreEngine;
use crate::slot::ContentProps;

/// A source of content for [`crate::engine::KeyStoreEngine::save_copy`]:
/// either a container already backed by a slot, or a standalone volatile
/// object.
pub trait ContentSource {
    /// Returns the current content, or `Err(EmptyContainer)` if there is
    /// none to read.
    fn content(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError>;
}

/// An exclusive, read/write handle to a slot. At most one `OwnerContainer`
/// may exist for a given slot at a time — enforced by the engine's
/// `owner_tc_exists` flag, released when this handle drops.
pub struct OwnerContainer {
    pub(crate) engine: KeyStoreEngine,
    pub(crate) slot_number: SlotNumber,
}

impl OwnerContainer {
    /// The slot this container is opened against.
    pub fn slot_number(&self) -> SlotNumber {
        self.slot_number
    }

    /// Reads the slot's current (live, pre-transaction) content.
    pub fn read(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        self.engine.read_live_content(self.slot_number)
    }
}

impl ContentSource for OwnerContainer {
    fn content(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        self.read()
    }
}

impl Drop for OwnerContainer {
    fn drop(&mut self) {
        self.engine.release_owner(self.slot_number);
    }
}

/// A shared, read-only handle to a slot. Any number of `UserContainer`s may
/// exist concurrently, including alongside an `OwnerContainer`.
pub struct UserContainer {
    pub(crate) engine: KeyStoreEngine,
    pub(crate) slot_number: SlotNumber,
    pub(crate) subscribed: bool,
}

impl UserContainer {
    /// The slot this container is opened against.
    pub fn slot_number(&self) -> SlotNumber {
        self.slot_number
    }

    /// Whether this container was opened with `subscribe = true`.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Reads the slot's current (live, pre-transaction) content. During an
    /// active transaction scoped over this slot, staged writes are
    /// invisible here by construction: the engine only mutates live slot
    /// state at commit time.
    pub fn read(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        self.engine.read_live_content(self.slot_number)
    }
}

impl ContentSource for UserContainer {
    fn content(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        self.read()
    }
}

// Subscriptions are durable across `UserContainer` drop: the engine's
// observer registration is keyed by connection, not by container
// lifetime, so there is deliberately no `Drop` impl here that tears
// anything down.

/// Standalone content not (yet) backed by any slot — e.g. an object a
/// crypto provider just generated, about to be persisted via `save_copy`.
pub struct VolatileContainer {
    /// The object's content metadata.
    pub props: ContentProps,
    /// The opaque payload.
    pub payload: Vec<u8>,
}

impl VolatileContainer {
    /// Wraps already-assembled content metadata and payload.
    pub fn new(props: ContentProps, payload: Vec<u8>) -> Self {
        Self { props, payload }
    }
}

impl ContentSource for VolatileContainer {
    fn content(&self) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        Ok((self.props.clone(), self.payload.clone()))
    }
}

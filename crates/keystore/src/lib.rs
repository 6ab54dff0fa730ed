#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]
#![forbid(unsafe_code)]

//! # Crypto daemon key storage engine
//!
//! Owns the persistent table of key slots: three sorted-`Vec` indexes
//! (uuid, provider, COUID), exclusive/shared container handles, atomic
//! multi-slot transactions, and the on-disk JSON-index + per-slot-document
//! + bincode-shadow-file persistence discipline.

mod container;
mod db;
mod engine;
mod index;
mod observer;
mod slot;
mod transaction;

pub use container::{ContentSource, OwnerContainer, UserContainer, VolatileContainer};
pub use engine::{CallContext, ConnectionId, KeyStoreEngine};
pub use observer::{
    run_guarded, Observer, OnClearCallback, ReportedOperation, ReportedOutcome, SecurityEvent,
    SecurityEventReporter,
};
pub use slot::{
    ContentProps, ContentRestrictionMeta, DependencyCouidMeta, KeySlot, ObjectType, OwnerMeta,
    PrevContentMeta, PrototypeProps, SlotContent, SlotDependencyMeta, SlotDocument,
    SlotDocumentContent, SlotDocumentContentMeta, SlotDocumentMeta, VersionControlMeta,
    VersionControlPolicy,
};
pub use transaction::TransactionId;

// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Crypto Daemon Types
//!
//! Foundational crate for the process-isolated cryptographic service daemon,
//! containing the primitives every other crate in the workspace shares:
//! opaque identifiers (`Uuid`, `ProxyId`, `SlotNumber`, `CryptoObjectUid`,
//! `UserId`, `ProcessId`) and the wire error taxonomy.
//!
//! As the base crate, `crypto-daemon-types` has minimal dependencies and is
//! itself a dependency for nearly every other crate in the workspace. This
//! prevents circular dependencies and keeps a single canonical definition
//! for shared identifiers and errors.

/// Opaque identifiers shared across the RPC boundary and the key store.
pub mod ids;
/// A prelude of small extension traits used throughout the workspace.
pub mod prelude;
/// The error taxonomy: one enum per component plus the wire-level code.
pub mod error;

pub use error::{ErrorCode, SecurityErrc};
pub use ids::{CryptoObjectUid, ProcessId, ProxyId, SlotNumber, UserId, Uuid};

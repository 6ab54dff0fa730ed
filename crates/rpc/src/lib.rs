#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::unimplemented, clippy::todo)
)]
#![forbid(unsafe_code)]

//! # Crypto daemon RPC layer
//!
//! Wire framing, the positional (non-self-describing) binary codec, the
//! server-side `ProxyId` object registry, and the two-level
//! `(basic_task, detail_task)` dispatch table that the daemon binary wires
//! up to the key storage engine and crypto providers. This crate knows
//! nothing about keys, slots, or providers — it is pure protocol plumbing.

/// The per-connection request/response loop.
pub mod broker;
/// The two-level dispatch table.
pub mod dispatch;
/// Async length-prefixed frame I/O.
pub mod framing;
/// The shared request/response header shape and dispatch-key constants.
pub mod message;
/// Server-side `ProxyId` object mirroring.
pub mod proxy;
/// The positional binary wire codec.
pub mod wire;

pub use broker::{Connection, PeerCredentials};
pub use dispatch::{DispatchTable, Handler};
pub use message::{handshake_detail, BasicTask, MessageHeader};
pub use proxy::{ProxyRegistry, ServerObject};
pub use wire::{WireDecode, WireEncode, WireProxyPointer, WireResult};

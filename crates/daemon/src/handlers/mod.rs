// Path: crates/daemon/src/handlers/mod.rs

//! Builds the one [`DispatchTable`] shared read-only across every
//! connection, and the small response-encoding helpers every handler in
//! this module uses.

mod handshake;
mod keystorage;
mod object_control;
mod wire_adapters;

use bytes::BytesMut;

use crypto_daemon_keystore::CallContext;
use crypto_daemon_rpc::dispatch::DispatchTable;
use crypto_daemon_rpc::wire::{WireEncode, WireResult};
use crypto_daemon_types::error::SecurityErrc;

use crate::state::Connection;

/// Encodes a business-level `Result<T, SecurityErrc>` as a `WireResult`
/// response body. Handlers return this wrapped in `Ok(..)` at the RPC
/// framing level: the outer `true`/`false` `serve_connection` writes is
/// about frame delivery, this inner one is the operation's own outcome.
fn respond<T: WireEncode>(result: Result<T, SecurityErrc>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    WireResult(result).encode(&mut buf);
    buf.to_vec()
}

/// Encodes a value with no business-level failure mode (e.g.
/// `find_slot_by_uuid`'s plain `Option`, `find_object`'s plain
/// `SlotNumber`) directly, with no `WireResult` envelope.
fn respond_plain<T: WireEncode>(value: T) -> Vec<u8> {
    let mut buf = BytesMut::new();
    value.encode(&mut buf);
    buf.to_vec()
}

/// Builds the `CallContext` for a request: the peer credentials queried
/// once at accept time.
fn call_context(conn: &Connection) -> CallContext {
    CallContext {
        user: conn.credentials.user,
        process: conn.credentials.process,
    }
}

/// Assembles every handler into the dispatch table the accept loop hands
/// to each connection's `serve_connection` loop.
pub fn build_dispatch_table() -> DispatchTable<Connection> {
    let mut table = DispatchTable::new();
    handshake::register(&mut table);
    keystorage::register(&mut table);
    object_control::register(&mut table);
    table
}

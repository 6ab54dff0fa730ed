//! The per-connection request/response loop: reads a framed
//! `MessageHeader` + positional body, dispatches it, and writes back a
//! framed response echoing the request's `basic_task`/`detail_task` so the
//! client-side `MessageErrorHandler` can detect protocol desync.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use crypto_daemon_types::error::{RpcError, SecurityErrc};
use crypto_daemon_types::ids::{ProcessId, UserId};

use crate::dispatch::DispatchTable;
use crate::framing::{read_frame, write_frame};
use crate::message::MessageHeader;
use crate::proxy::ProxyRegistry;
use crate::wire::{WireDecode, WireEncode};

/// The peer identity a transport supplies once per connection (e.g. via a
/// Unix-domain-socket `SO_PEERCRED` query), read once at accept time and
/// reused for every request on that connection as its per-connection
/// call-context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    /// The connecting user.
    pub user: UserId,
    /// The connecting process.
    pub process: ProcessId,
}

/// One client connection's mutable state: its proxy table, its peer
/// credentials, and a handle to the daemon-wide shared state (`S`) that
/// handlers read (the key-storage engine, the provider factory, ...).
pub struct Connection<S> {
    /// This connection's peer credentials.
    pub credentials: PeerCredentials,
    /// This connection's proxy table. Handlers only ever see `&Connection`
    /// (the dispatch table is read-only, shared across every connection),
    /// so the table that handlers *do* need to mutate — allocating a
    /// `ProxyId` for a freshly handed-out object, releasing one early —
    /// is behind interior mutability rather than `&mut self`.
    pub proxies: Mutex<ProxyRegistry>,
    /// The shared, read-only daemon state.
    pub state: Arc<S>,
}

impl<S> Connection<S> {
    /// Builds a fresh connection state with an empty proxy table.
    pub fn new(credentials: PeerCredentials, state: Arc<S>) -> Self {
        Self {
            credentials,
            proxies: Mutex::new(ProxyRegistry::new()),
            state,
        }
    }
}

fn encode_header_prefix(out: &mut BytesMut, header: &MessageHeader) {
    header.basic_task.encode(out);
    header.detail_task.encode(out);
    header.target_proxy.encode(out);
    Vec::<u64>::new().encode(out);
}

/// Runs the request/response loop for one connection until the peer
/// disconnects or a framing error occurs. Handler invocations on a given
/// connection are strictly serialized: this function processes one
/// frame to completion before reading the next.
pub async fn serve_connection<S, Rw>(
    io: &mut Rw,
    connection: &mut Connection<S>,
    dispatch: &DispatchTable<Connection<S>>,
) -> Result<(), RpcError>
where
    Rw: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(io).await? {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut cursor = &frame[..];
        let header = MessageHeader::decode(&mut cursor)?;
        let body = cursor;

        let started = std::time::Instant::now();
        let result = dispatch.dispatch(&header, body, connection);
        let errc: &'static str = match &result {
            Ok(_) => "OK",
            Err(e) => crypto_daemon_types::error::ErrorCode::code(&SecurityErrc::from(e)),
        };
        crypto_daemon_telemetry::rpc_metrics().observe_request_duration(
            header.basic_task,
            header.detail_task,
            started.elapsed().as_secs_f64(),
        );
        crypto_daemon_telemetry::rpc_metrics().inc_requests_total(header.basic_task, header.detail_task, errc);

        let mut out = BytesMut::new();
        encode_header_prefix(&mut out, &header);
        match result {
            Ok(response_body) => {
                true.encode(&mut out);
                out.extend_from_slice(&response_body);
            }
            Err(e) => {
                tracing::debug!(
                    basic_task = header.basic_task,
                    detail_task = header.detail_task,
                    error = e.to_string(),
                    "rpc handler returned an error"
                );
                crypto_daemon_telemetry::error_metrics()
                    .inc_error("rpc", crypto_daemon_types::error::ErrorCode::code(&e));
                false.encode(&mut out);
                (SecurityErrc::from(&e) as u64).encode(&mut out);
            }
        }
        write_frame(io, &out).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BasicTask;

    #[tokio::test]
    async fn handler_success_echoes_task_and_carries_body() {
        let mut table: DispatchTable<Connection<()>> = DispatchTable::new();
        table.register(
            BasicTask::KeyStorage.code(),
            1,
            Box::new(|_header, _body, _conn| Ok(vec![0xAB])),
        );
        let mut conn = Connection::new(
            PeerCredentials {
                user: UserId(1),
                process: ProcessId(1),
            },
            Arc::new(()),
        );

        let (mut client, mut server) = tokio::io::duplex(4096);
        let header = MessageHeader {
            basic_task: BasicTask::KeyStorage.code(),
            detail_task: 1,
            target_proxy: 7,
            arg_proxies: vec![],
        };
        let mut request = BytesMut::new();
        header.encode(&mut request);
        write_frame(&mut client, &request).await.unwrap();

        let serve = tokio::spawn(async move {
            serve_connection(&mut server, &mut conn, &table).await.unwrap();
        });

        let response = crate::framing::read_frame(&mut client).await.unwrap().unwrap();
        let mut cursor = &response[..];
        let echoed = MessageHeader::decode(&mut cursor).unwrap();
        assert_eq!(echoed.basic_task, BasicTask::KeyStorage.code());
        assert_eq!(echoed.detail_task, 1);
        assert!(bool::decode(&mut cursor).unwrap());
        assert_eq!(cursor, &[0xAB][..]);

        drop(client);
        serve.await.unwrap();
    }
}

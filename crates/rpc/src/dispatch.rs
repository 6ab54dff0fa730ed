//! The two-level `(basic_task, detail_task) -> handler` dispatch table.

use std::collections::HashMap;

use crypto_daemon_types::error::RpcError;

use crate::message::MessageHeader;

/// A registered request handler: reads `header.target_proxy` /
/// `header.arg_proxies` to resolve which server object(s) it acts on,
/// decodes its own positional arguments from `body`, performs the
/// operation against `state`, and encodes its own response body. `state`
/// is the per-connection state (proxy registry, peer credentials, and a
/// handle to the shared daemon state).
pub type Handler<S> = Box<dyn Fn(&MessageHeader, &[u8], &S) -> Result<Vec<u8>, RpcError> + Send + Sync>;

/// Maps `(basic_task, detail_task)` to a [`Handler`]. Built once at daemon
/// startup and shared read-only across every connection.
pub struct DispatchTable<S> {
    handlers: HashMap<(u32, u32), Handler<S>>,
}

impl<S> Default for DispatchTable<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> DispatchTable<S> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `(basic_task, detail_task)`, replacing
    /// any previous registration for that pair.
    pub fn register(&mut self, basic_task: u32, detail_task: u32, handler: Handler<S>) {
        self.handlers.insert((basic_task, detail_task), handler);
    }

    /// Dispatches `body` to the handler registered under `header`'s
    /// `(basic_task, detail_task)`, or `Err(RpcError::UnknownTask)` if none
    /// is registered.
    pub fn dispatch(&self, header: &MessageHeader, body: &[u8], state: &S) -> Result<Vec<u8>, RpcError> {
        let handler = self
            .handlers
            .get(&(header.basic_task, header.detail_task))
            .ok_or(RpcError::UnknownTask(header.basic_task, header.detail_task))?;
        handler(header, body, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(basic_task: u32, detail_task: u32) -> MessageHeader {
        MessageHeader {
            basic_task,
            detail_task,
            target_proxy: 0,
            arg_proxies: vec![],
        }
    }

    #[test]
    fn dispatches_to_the_registered_handler() {
        let mut table: DispatchTable<()> = DispatchTable::new();
        table.register(1, 2, Box::new(|_header, body, _state| Ok(body.to_vec())));
        let out = table.dispatch(&header(1, 2), &[9, 9], &()).unwrap();
        assert_eq!(out, vec![9, 9]);
    }

    #[test]
    fn unregistered_pair_is_unknown_task() {
        let table: DispatchTable<()> = DispatchTable::new();
        let err = table.dispatch(&header(1, 2), &[], &()).unwrap_err();
        assert!(matches!(err, RpcError::UnknownTask(1, 2)));
    }
}

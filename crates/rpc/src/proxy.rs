//! Server-side object mirroring: every object handed to a client is
//! registered under a `ProxyId` in this connection's `ObjectRegistration`
//! table; the client holds a proxy referencing that id. Allocation is
//! per-connection and monotonically increasing.

use std::any::Any;
use std::collections::HashMap;

use crypto_daemon_types::error::RpcError;
use crypto_daemon_types::ids::ProxyId;

/// A server-side object reachable by `ProxyId` from exactly one
/// connection. Concretely a crypto-provider handle, a key-storage
/// provider skeleton, an X.509 provider, or a `TrustedContainer`.
pub type ServerObject = Box<dyn Any + Send + Sync>;

/// The per-connection `ProxyId -> ServerObject` table. Registration order
/// is preserved so that on disconnect, objects drop in the order they
/// were registered.
#[derive(Default)]
pub struct ProxyRegistry {
    next_id: u64,
    objects: HashMap<ProxyId, ServerObject>,
    order: Vec<ProxyId>,
}

impl ProxyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh, monotonically increasing `ProxyId` for `object`
    /// and registers it.
    pub fn register(&mut self, object: ServerObject) -> ProxyId {
        self.next_id += 1;
        let id = ProxyId(self.next_id);
        self.objects.insert(id, object);
        self.order.push(id);
        id
    }

    /// Registers `object` under a caller-chosen `id`, used for the
    /// handshake's singleton skeletons, which the client names explicitly
    /// rather than receiving an allocated id.
    pub fn register_at(&mut self, id: ProxyId, object: ServerObject) {
        if !self.objects.contains_key(&id) {
            self.order.push(id);
        }
        self.objects.insert(id, object);
    }

    /// Looks up the object registered under `id`.
    pub fn get(&self, id: ProxyId) -> Result<&ServerObject, RpcError> {
        self.objects.get(&id).ok_or(RpcError::UnreservedResource(id))
    }

    /// Looks up and downcasts the object registered under `id`.
    pub fn get_downcast<T: 'static>(&self, id: ProxyId) -> Result<&T, RpcError> {
        self.get(id)?
            .downcast_ref::<T>()
            .ok_or_else(|| RpcError::RuntimeFault(format!("proxy {id:?} is not the expected type")))
    }

    /// Releases a single proxy, returning its object if it was registered.
    pub fn release(&mut self, id: ProxyId) -> Option<ServerObject> {
        self.order.retain(|o| *o != id);
        self.objects.remove(&id)
    }

    /// Releases every registered object, in registration order, for
    /// connection teardown.
    pub fn release_all(&mut self) -> Vec<ServerObject> {
        let order = std::mem::take(&mut self.order);
        let mut out = Vec::with_capacity(order.len());
        for id in order {
            if let Some(obj) = self.objects.remove(&id) {
                out.push(obj);
            }
        }
        out
    }
}

impl Drop for ProxyRegistry {
    fn drop(&mut self) {
        // `HashMap`'s own `Drop` would release these in unspecified order;
        // objects must drop in registration order on disconnect, so drain
        // explicitly via `order` rather than relying on the map's drop glue.
        let _ = self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_order_survives_teardown() {
        let mut reg = ProxyRegistry::new();
        let a = reg.register(Box::new(1u32));
        let b = reg.register(Box::new(2u32));
        let c = reg.register(Box::new(3u32));
        assert!(a < b && b < c);

        let released: Vec<u32> = reg
            .release_all()
            .into_iter()
            .map(|obj| *obj.downcast::<u32>().unwrap())
            .collect();
        assert_eq!(released, vec![1, 2, 3]);
    }

    #[test]
    fn unregistered_proxy_is_unreserved_resource() {
        let reg = ProxyRegistry::new();
        let err = reg.get(ProxyId(1)).unwrap_err();
        assert!(matches!(err, RpcError::UnreservedResource(_)));
    }
}

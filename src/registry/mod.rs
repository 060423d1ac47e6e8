//! Registry of currently open connections.
//!
//! Tracks the set of live connections in insertion order and hands out
//! point-in-time snapshots for fan-out. The registry knows nothing about
//! event semantics; it only adds, removes, and copies.

mod types;

pub use types::{ConnectionHandle, RegistryError};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered set of all active connections.
///
/// The lock is held only for mutation or snapshot-copy, never across the
/// sends that follow, so a stalled recipient cannot block registration.
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Register a new connection
    pub async fn register(&self, handle: Arc<ConnectionHandle>) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;
        if connections.iter().any(|c| c.id == handle.id) {
            return Err(RegistryError::AlreadyRegistered(handle.id));
        }

        tracing::info!(
            connection_id = %handle.id,
            client_id = %handle.client_id,
            "Connection registered"
        );
        connections.push(handle);
        Ok(())
    }

    /// Remove a connection from the set.
    ///
    /// Must be called at most once per successful registration; a second
    /// attempt fails with [`RegistryError::NotRegistered`].
    pub async fn deregister(&self, id: uuid::Uuid) -> Result<Arc<ConnectionHandle>, RegistryError> {
        let mut connections = self.connections.write().await;
        let position = connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(RegistryError::NotRegistered(id))?;

        let handle = connections.remove(position);
        tracing::info!(
            connection_id = %handle.id,
            client_id = %handle.client_id,
            "Connection deregistered"
        );
        Ok(handle)
    }

    /// Point-in-time copy of the registered connections, in insertion order
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().await.clone()
    }

    /// Number of currently registered connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_handle(client_id: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ConnectionHandle::new(client_id.to_string(), tx))
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count().await, 0);

        registry.register(make_handle("alice")).await.unwrap();
        registry.register(make_handle("bob")).await.unwrap();

        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let registry = ConnectionRegistry::new();
        let handle = make_handle("alice");

        registry.register(handle.clone()).await.unwrap();
        let err = registry.register(handle.clone()).await.unwrap_err();

        assert_eq!(err, RegistryError::AlreadyRegistered(handle.id));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_preserves_insertion_order() {
        let registry = ConnectionRegistry::new();
        let alice = make_handle("alice");
        let bob = make_handle("bob");
        let carol = make_handle("carol");

        registry.register(alice.clone()).await.unwrap();
        registry.register(bob.clone()).await.unwrap();
        registry.register(carol.clone()).await.unwrap();

        let snapshot = registry.snapshot().await;
        let ids: Vec<_> = snapshot.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![alice.id, bob.id, carol.id]);
    }

    #[tokio::test]
    async fn test_deregister_removes_connection() {
        let registry = ConnectionRegistry::new();
        let alice = make_handle("alice");
        let bob = make_handle("bob");

        registry.register(alice.clone()).await.unwrap();
        registry.register(bob.clone()).await.unwrap();

        let removed = registry.deregister(alice.id).await.unwrap();
        assert_eq!(removed.id, alice.id);

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, bob.id);
    }

    #[tokio::test]
    async fn test_deregister_twice_fails() {
        let registry = ConnectionRegistry::new();
        let alice = make_handle("alice");

        registry.register(alice.clone()).await.unwrap();
        registry.deregister(alice.id).await.unwrap();

        let err = registry.deregister(alice.id).await.unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered(alice.id));
    }

    #[tokio::test]
    async fn test_deregister_unknown_fails() {
        let registry = ConnectionRegistry::new();
        let stray = make_handle("stray");

        let err = registry.deregister(stray.id).await.unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered(stray.id));
    }

    #[tokio::test]
    async fn test_snapshot_is_point_in_time() {
        let registry = ConnectionRegistry::new();
        let alice = make_handle("alice");

        registry.register(alice.clone()).await.unwrap();
        let before = registry.snapshot().await;

        registry.deregister(alice.id).await.unwrap();

        // The earlier snapshot is unaffected by the removal
        assert_eq!(before.len(), 1);
        assert!(registry.snapshot().await.is_empty());
    }
}

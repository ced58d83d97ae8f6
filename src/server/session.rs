//! Session registry: which identity is logged in on which connection.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::AuthError;

use super::connection::{ConnectionHandle, ConnectionId};

/// The two-way identity/connection map guarded by [`SessionRegistry`].
///
/// Both directions are updated together, so an identity never has more than
/// one connection and a connection never carries more than one identity.
#[derive(Debug, Default)]
pub struct SessionTable {
    by_identity: HashMap<String, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, String>,
}

impl SessionTable {
    /// Bind `identity` to `handle`. Fails without touching the table if either
    /// side is already bound.
    pub fn register(&mut self, identity: &str, handle: &ConnectionHandle) -> Result<(), AuthError> {
        if self.by_identity.contains_key(identity) || self.by_connection.contains_key(&handle.id()) {
            return Err(AuthError::AlreadyLoggedIn);
        }
        self.by_identity.insert(identity.to_string(), handle.clone());
        self.by_connection.insert(handle.id(), identity.to_string());
        Ok(())
    }

    /// Remove the session bound to `conn`, returning its identity.
    pub fn unregister(&mut self, conn: ConnectionId) -> Option<String> {
        let identity = self.by_connection.remove(&conn)?;
        self.by_identity.remove(&identity);
        Some(identity)
    }

    pub fn connection_for(&self, identity: &str) -> Option<ConnectionHandle> {
        self.by_identity.get(identity).cloned()
    }

    pub fn identity_for(&self, conn: ConnectionId) -> Option<String> {
        self.by_connection.get(&conn).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }
}

/// Live sessions, behind one lock that is never taken while a room or the
/// room directory is locked.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    table: Mutex<SessionTable>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the registry lock across a credential check and registration.
    pub async fn lock(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().await
    }

    pub async fn register(&self, identity: &str, handle: &ConnectionHandle) -> Result<(), AuthError> {
        self.table.lock().await.register(identity, handle)
    }

    /// Idempotent.
    pub async fn unregister(&self, conn: ConnectionId) -> Option<String> {
        let identity = self.table.lock().await.unregister(conn);
        if let Some(name) = &identity {
            debug!(%conn, user = %name, "session unregistered");
        }
        identity
    }

    pub async fn lookup_connection(&self, identity: &str) -> Option<ConnectionHandle> {
        self.table.lock().await.connection_for(identity)
    }

    pub async fn lookup_identity(&self, conn: ConnectionId) -> Option<String> {
        self.table.lock().await.identity_for(conn)
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_and_lookup_both_directions() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();

        registry.register("alice", &handle).await.unwrap();
        assert_eq!(registry.lookup_connection("alice").await, Some(handle.clone()));
        assert_eq!(registry.lookup_identity(handle.id()).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_second_connection_for_same_identity_is_rejected() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = ConnectionHandle::new();
        let (second, _rx2) = ConnectionHandle::new();

        registry.register("alice", &first).await.unwrap();
        let result = registry.register("alice", &second).await;
        assert!(matches!(result, Err(AuthError::AlreadyLoggedIn)));

        // State untouched by the failed attempt.
        assert_eq!(registry.lookup_connection("alice").await, Some(first));
        assert_eq!(registry.lookup_identity(second.id()).await, None);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_connection_cannot_carry_two_identities() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();

        registry.register("alice", &handle).await.unwrap();
        assert!(registry.register("bob", &handle).await.is_err());
        assert_eq!(registry.lookup_connection("bob").await, None);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();

        registry.register("alice", &handle).await.unwrap();
        assert_eq!(registry.unregister(handle.id()).await.as_deref(), Some("alice"));
        assert_eq!(registry.unregister(handle.id()).await, None);
        assert_eq!(registry.lookup_connection("alice").await, None);

        // The identity is free again.
        let (other, _rx2) = ConnectionHandle::new();
        registry.register("alice", &other).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_registrations_admit_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();

        for _ in 0..16 {
            let (handle, rx) = ConnectionHandle::new();
            receivers.push(rx);
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.register("alice", &handle).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len().await, 1);
    }
}

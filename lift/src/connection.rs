//! WebSocket connection persistence port
//!
//! Connection state outlives a single invocation, so it lives in an external
//! store behind the [`ConnectionStore`] trait. The in-memory implementation
//! backs tests and single-process deployments; production stores implement
//! the same contract over an external keyed table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A persisted WebSocket connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Platform-assigned connection id
    pub id: String,
    /// Authenticated user, when known at connect time
    pub user_id: Option<String>,
    /// Tenant scope, when known at connect time
    pub tenant_id: Option<String>,
    /// When the connection was established
    pub created_at: DateTime<Utc>,
    /// Free-form attributes
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Connection {
    /// Create a connection record established now
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            tenant_id: None,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Set the owning user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the tenant scope
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Abstract persistence for WebSocket connections
///
/// `save` and `delete` are at-least-once with idempotence by key. The active
/// counter is maintained alongside the records so `count_active` never
/// scans; it is a monitoring figure and may lag briefly under concurrent
/// failures, but never goes negative.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Upsert a connection by id, bumping the active counter for new ids
    async fn save(&self, conn: Connection) -> Result<()>;

    /// Fetch a connection by id
    async fn get(&self, id: &str) -> Result<Option<Connection>>;

    /// Delete a connection by id, decrementing the counter (clamped at zero)
    async fn delete(&self, id: &str) -> Result<()>;

    /// All connections for a user; ordering is unspecified
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Connection>>;

    /// All connections for a tenant; ordering is unspecified
    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Connection>>;

    /// Current active count, O(1)
    async fn count_active(&self) -> Result<i64>;
}

/// In-memory store over a concurrent map with an atomic counter
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    connections: DashMap<String, Connection>,
    active: AtomicI64,
}

impl InMemoryConnectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn save(&self, conn: Connection) -> Result<()> {
        let previous = self.connections.insert(conn.id.clone(), conn);
        if previous.is_none() {
            self.active.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Connection>> {
        Ok(self.connections.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.connections.remove(id).is_some() {
            // Clamp at zero; a miss here means a concurrent delete won.
            let _ = self
                .active
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 {
                        Some(n - 1)
                    } else {
                        None
                    }
                });
        }
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Connection>> {
        Ok(self
            .connections
            .iter()
            .filter(|entry| entry.user_id.as_deref() == Some(user_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Connection>> {
        Ok(self
            .connections
            .iter()
            .filter(|entry| entry.tenant_id.as_deref() == Some(tenant_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count_active(&self) -> Result<i64> {
        Ok(self.active.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = InMemoryConnectionStore::new();
        store
            .save(Connection::new("c-1").with_user("u-1").with_tenant("t-1"))
            .await
            .unwrap();

        let conn = store.get("c-1").await.unwrap().expect("connection");
        assert_eq!(conn.user_id.as_deref(), Some("u-1"));
        assert_eq!(conn.tenant_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn counter_tracks_saves_and_deletes() {
        let store = InMemoryConnectionStore::new();
        store.save(Connection::new("a")).await.unwrap();
        store.save(Connection::new("b")).await.unwrap();
        assert_eq!(store.count_active().await.unwrap(), 2);

        store.delete("a").await.unwrap();
        assert_eq!(store.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn save_is_idempotent_by_key() {
        let store = InMemoryConnectionStore::new();
        store.save(Connection::new("c")).await.unwrap();
        store.save(Connection::new("c")).await.unwrap();
        assert_eq!(store.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_of_missing_key_clamps_at_zero() {
        let store = InMemoryConnectionStore::new();
        store.delete("ghost").await.unwrap();
        store.delete("ghost").await.unwrap();
        assert_eq!(store.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_by_user_and_tenant_filter() {
        let store = InMemoryConnectionStore::new();
        store
            .save(Connection::new("1").with_user("u").with_tenant("t"))
            .await
            .unwrap();
        store
            .save(Connection::new("2").with_user("u").with_tenant("other"))
            .await
            .unwrap();
        store.save(Connection::new("3").with_user("x")).await.unwrap();

        assert_eq!(store.list_by_user("u").await.unwrap().len(), 2);
        assert_eq!(store.list_by_tenant("t").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_saves_and_deletes_never_go_negative() {
        let store = Arc::new(InMemoryConnectionStore::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("c-{}", i % 5);
                store.save(Connection::new(id.clone())).await.unwrap();
                store.delete(&id).await.unwrap();
                store.delete(&id).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(store.count_active().await.unwrap() >= 0);
    }
}

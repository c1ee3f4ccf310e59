//! Durable session storage.
//!
//! The store holds raw rows; expiry filtering and the confirmation
//! protocol live in the service layer. `update` replaces a whole session
//! at once so a reader never observes a half-written row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TransactionSession;
use crate::error::StorageError;

/// Storage backend for signing sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &TransactionSession) -> Result<(), StorageError>;

    /// Fetch the raw row. Returns `None` for unknown ids; expired rows are
    /// still returned — the service decides what expiry means.
    async fn get(&self, id: Uuid) -> Result<Option<TransactionSession>, StorageError>;

    /// Replace the stored session. All-or-nothing: either every member
    /// update lands or none do.
    async fn update(&self, session: &TransactionSession) -> Result<(), StorageError>;

    /// Housekeeping sweep: remove sessions past their expiry. Returns the
    /// ids of the removed sessions so callers can drop their own
    /// per-session bookkeeping.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError>;
}

/// In-memory backend for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, TransactionSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &TransactionSession) -> Result<(), StorageError> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TransactionSession>, StorageError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn update(&self, session: &TransactionSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(StorageError::RowNotFound { id: session.id });
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{TransactionDeployment, TxStatus};
    use chrono::Duration;

    fn sample_session(ttl_secs: i64) -> TransactionSession {
        TransactionSession::new(
            "localhost",
            vec![TransactionDeployment::new(
                "Deploy token",
                "test",
                "deploy-token",
                "0x6080",
                "0",
                None,
            )],
            Vec::new(),
            Duration::seconds(ttl_secs),
        )
    }

    #[tokio::test]
    async fn insert_get_update_roundtrip() {
        let store = MemorySessionStore::new();
        let mut session = sample_session(1800);
        store.insert(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().expect("row present");
        assert_eq!(loaded.chain_ref, "localhost");
        assert_eq!(loaded.deployments.len(), 1);

        session.deployments[0].status = TxStatus::Confirmed;
        session.recompute_status();
        store.update(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().expect("row present");
        assert_eq!(loaded.status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn update_of_unknown_session_fails() {
        let store = MemorySessionStore::new();
        let session = sample_session(1800);
        let err = store.update(&session).await.unwrap_err();
        assert!(matches!(err, StorageError::RowNotFound { id } if id == session.id));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let store = MemorySessionStore::new();
        let live = sample_session(1800);
        let dead = sample_session(-5);
        store.insert(&live).await.unwrap();
        store.insert(&dead).await.unwrap();

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, vec![dead.id]);
        assert!(store.get(live.id).await.unwrap().is_some());
        assert!(store.get(dead.id).await.unwrap().is_none());
    }
}

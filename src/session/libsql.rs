//! libSQL backend for the session store.
//!
//! Embedded SQLite-compatible database: one `tx_sessions` row per session,
//! ordered `tx_deployments` child rows keyed by `(session_id, seq)`.
//! Session writes run inside `BEGIN IMMEDIATE .. COMMIT` so a confirmation
//! update is all-or-nothing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use uuid::Uuid;

use super::store::SessionStore;
use super::{MetadataEntry, TransactionDeployment, TransactionSession, TxStatus};
use crate::error::StorageError;

/// libSQL-backed session store.
pub struct LibSqlSessionStore {
    db: Arc<LibSqlDatabase>,
}

impl LibSqlSessionStore {
    /// Open (or create) a local embedded database and ensure the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Query(format!("failed to create database directory: {}", e))
            })?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Query(format!("failed to open libSQL database: {}", e)))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// In-memory database (for testing).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Query(format!("failed to create in-memory database: {}", e))
            })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// New connection with a busy timeout, so concurrent writers wait
    /// instead of failing instantly with "database is locked".
    async fn connect(&self) -> Result<Connection, StorageError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StorageError::Query(format!("failed to create connection: {}", e)))?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| StorageError::Query(format!("failed to set busy_timeout: {}", e)))?;
        Ok(conn)
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let conn = self.connect().await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tx_sessions (
                id TEXT PRIMARY KEY,
                chain_ref TEXT NOT NULL,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_sessions_expires ON tx_sessions(expires_at)",
            (),
        )
        .await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tx_deployments (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL,
                value TEXT NOT NULL,
                receiver TEXT,
                status TEXT NOT NULL,
                tx_hash TEXT,
                contract_address TEXT,
                PRIMARY KEY (session_id, seq)
            )
            "#,
            (),
        )
        .await?;
        Ok(())
    }

    async fn insert_deployment_rows(
        conn: &Connection,
        session: &TransactionSession,
    ) -> Result<(), StorageError> {
        for (seq, d) in session.deployments.iter().enumerate() {
            conn.execute(
                r#"
                INSERT INTO tx_deployments
                    (session_id, seq, title, description, kind, data, value,
                     receiver, status, tx_hash, contract_address)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    session.id.to_string(),
                    seq as i64,
                    d.title.clone(),
                    d.description.clone(),
                    d.kind.clone(),
                    d.data.clone(),
                    d.value.clone(),
                    opt_text(d.receiver.as_deref()),
                    d.status.as_str(),
                    opt_text(d.tx_hash.as_deref()),
                    opt_text(d.contract_address.as_deref()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn load_deployments(
        conn: &Connection,
        id: Uuid,
    ) -> Result<Vec<TransactionDeployment>, StorageError> {
        let mut rows = conn
            .query(
                r#"
                SELECT title, description, kind, data, value, receiver,
                       status, tx_hash, contract_address
                FROM tx_deployments WHERE session_id = ?1 ORDER BY seq
                "#,
                params![id.to_string()],
            )
            .await?;

        let mut deployments = Vec::new();
        while let Some(row) = rows.next().await? {
            let status_raw = row.get::<String>(6)?;
            deployments.push(TransactionDeployment {
                title: row.get::<String>(0)?,
                description: row.get::<String>(1)?,
                kind: row.get::<String>(2)?,
                data: row.get::<String>(3)?,
                value: row.get::<String>(4)?,
                receiver: text_or_null(row.get_value(5)?),
                status: parse_status(&status_raw)?,
                tx_hash: text_or_null(row.get_value(7)?),
                contract_address: text_or_null(row.get_value(8)?),
            });
        }
        Ok(deployments)
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn insert(&self, session: &TransactionSession) -> Result<(), StorageError> {
        let metadata = serde_json::to_string(&session.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            conn.execute(
                r#"
                INSERT INTO tx_sessions (id, chain_ref, status, metadata, created_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    session.id.to_string(),
                    session.chain_ref.clone(),
                    session.status.as_str(),
                    metadata,
                    fmt_ts(&session.created_at),
                    fmt_ts(&session.expires_at),
                ],
            )
            .await?;
            Self::insert_deployment_rows(&conn, session).await
        }
        .await;

        finish_tx(&conn, result).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<TransactionSession>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT chain_ref, status, metadata, created_at, expires_at FROM tx_sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let status_raw = row.get::<String>(1)?;
        let metadata_raw = row.get::<String>(2)?;
        let metadata: Vec<MetadataEntry> = serde_json::from_str(&metadata_raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let created_at = parse_timestamp(&row.get::<String>(3)?)?;
        let expires_at = parse_timestamp(&row.get::<String>(4)?)?;

        let deployments = Self::load_deployments(&conn, id).await?;

        Ok(Some(TransactionSession {
            id,
            chain_ref: row.get::<String>(0)?,
            deployments,
            status: parse_status(&status_raw)?,
            metadata,
            created_at,
            expires_at,
        }))
    }

    async fn update(&self, session: &TransactionSession) -> Result<(), StorageError> {
        let metadata = serde_json::to_string(&session.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            let changed = conn
                .execute(
                    "UPDATE tx_sessions SET status = ?2, metadata = ?3 WHERE id = ?1",
                    params![session.id.to_string(), session.status.as_str(), metadata],
                )
                .await?;
            if changed == 0 {
                return Err(StorageError::RowNotFound { id: session.id });
            }
            // The member list is fixed at creation, so replacing the child
            // rows wholesale is equivalent to updating them in place.
            conn.execute(
                "DELETE FROM tx_deployments WHERE session_id = ?1",
                params![session.id.to_string()],
            )
            .await?;
            Self::insert_deployment_rows(&conn, session).await
        }
        .await;

        finish_tx(&conn, result).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let cutoff = fmt_ts(&now);
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            let mut rows = conn
                .query(
                    "SELECT id FROM tx_sessions WHERE expires_at < ?1",
                    params![cutoff.clone()],
                )
                .await?;
            let mut removed = Vec::new();
            while let Some(row) = rows.next().await? {
                let raw = row.get::<String>(0)?;
                let id = Uuid::parse_str(&raw).map_err(|e| {
                    StorageError::Serialization(format!("invalid session id {raw:?}: {e}"))
                })?;
                removed.push(id);
            }
            conn.execute(
                r#"
                DELETE FROM tx_deployments WHERE session_id IN
                    (SELECT id FROM tx_sessions WHERE expires_at < ?1)
                "#,
                params![cutoff.clone()],
            )
            .await?;
            conn.execute(
                "DELETE FROM tx_sessions WHERE expires_at < ?1",
                params![cutoff],
            )
            .await?;
            Ok(removed)
        }
        .await;

        finish_tx(&conn, result).await
    }
}

/// Commit on success, best-effort rollback on failure.
async fn finish_tx<T>(
    conn: &Connection,
    result: Result<T, StorageError>,
) -> Result<T, StorageError> {
    match result {
        Ok(value) => {
            conn.execute("COMMIT", ()).await?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

fn text_or_null(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

fn parse_status(raw: &str) -> Result<TxStatus, StorageError> {
    TxStatus::parse(raw)
        .ok_or_else(|| StorageError::Serialization(format!("unknown status '{raw}'")))
}

/// Format a timestamp for storage (RFC 3339, millisecond precision).
/// Lexicographic order matches chronological order, which the
/// `expires_at` index relies on.
fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    Err(StorageError::Serialization(format!(
        "unparseable timestamp: {s:?}"
    )))
}

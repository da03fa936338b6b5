//! libSQL backend — async `TallyStore` implementation.
//!
//! Supports local file and in-memory databases. The connection sits behind
//! a single async mutex so every statement is serialized; chat traffic is
//! low-volume and the UPSERT is the only write on the hot path.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::traits::TallyStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS message_counts (
        group_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (group_id, sender_id)
    );
";

/// An open database and its single connection.
struct Handle {
    _db: LibSqlDatabase,
    conn: Connection,
}

/// libSQL tally backend.
pub struct LibSqlBackend {
    /// `None` once closed.
    handle: Mutex<Option<Handle>>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and create the table.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            handle: Mutex::new(Some(Handle { _db: db, conn })),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Message count database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            handle: Mutex::new(Some(Handle { _db: db, conn })),
        };
        backend.init_schema().await?;
        Ok(backend)
    }
}

/// Read a single integer cell, treating NULL and missing rows as 0.
async fn first_count(mut rows: libsql::Rows, op: &str) -> Result<u64, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => {
            let value = row
                .get_value(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
            match value {
                Value::Integer(n) => Ok(u64::try_from(n).unwrap_or(0)),
                _ => Ok(0),
            }
        }
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

#[async_trait]
impl TallyStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        let guard = self.handle.lock().await;
        let conn = &guard.as_ref().ok_or(DatabaseError::Closed)?.conn;
        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }

    async fn increment(&self, group_id: &str, sender_id: &str) -> Result<(), DatabaseError> {
        let guard = self.handle.lock().await;
        let conn = &guard.as_ref().ok_or(DatabaseError::Closed)?.conn;
        conn.execute(
            "INSERT INTO message_counts (group_id, sender_id, count) VALUES (?1, ?2, 1)
             ON CONFLICT (group_id, sender_id) DO UPDATE SET count = count + 1",
            params![group_id, sender_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("increment: {e}")))?;

        debug!(group_id, sender_id, "Message tally incremented");
        Ok(())
    }

    async fn max_count(&self, group_id: &str) -> Result<u64, DatabaseError> {
        let guard = self.handle.lock().await;
        let conn = &guard.as_ref().ok_or(DatabaseError::Closed)?.conn;
        let rows = conn
            .query(
                "SELECT MAX(count) FROM message_counts WHERE group_id = ?1",
                params![group_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("max_count: {e}")))?;
        first_count(rows, "max_count").await
    }

    async fn sender_count(&self, group_id: &str, sender_id: &str) -> Result<u64, DatabaseError> {
        let guard = self.handle.lock().await;
        let conn = &guard.as_ref().ok_or(DatabaseError::Closed)?.conn;
        let rows = conn
            .query(
                "SELECT count FROM message_counts WHERE group_id = ?1 AND sender_id = ?2",
                params![group_id, sender_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sender_count: {e}")))?;
        first_count(rows, "sender_count").await
    }

    async fn reset_all(&self) -> Result<u64, DatabaseError> {
        let guard = self.handle.lock().await;
        let conn = &guard.as_ref().ok_or(DatabaseError::Closed)?.conn;
        let count = conn
            .execute("DELETE FROM message_counts", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("reset_all: {e}")))?;
        Ok(count)
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        if self.handle.lock().await.take().is_some() {
            info!("Message count database closed");
        }
        Ok(())
    }
}

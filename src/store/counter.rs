//! `CounterStore` — the tally store handed to the guard.
//!
//! Wraps a [`TallyStore`] backend and owns the daily reset task. Storage
//! failures never escape: writes report `false`, reads report 0, and both
//! are logged. `close()` must be called explicitly at shutdown.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GuardConfig;
use crate::store::libsql_backend::LibSqlBackend;
use crate::store::reset::{self, Clock, ResetSchedule, SystemClock};
use crate::store::traits::TallyStore;

/// Persistent per-(group, sender) message counter with a scheduled reset.
pub struct CounterStore {
    backend: Arc<dyn TallyStore>,
    cancel: CancellationToken,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl CounterStore {
    /// Open the libSQL file at `config.db_path()` and start the reset task.
    ///
    /// Failing to open storage is fatal for the caller.
    pub async fn open(config: &GuardConfig) -> crate::error::Result<Self> {
        let schedule = config.reset_schedule()?;
        let backend = LibSqlBackend::new_local(&config.db_path()).await?;
        Ok(Self::with_backend(
            Arc::new(backend),
            schedule,
            Arc::new(SystemClock),
        ))
    }

    /// Build a store over any backend and clock. Must run inside a tokio runtime.
    pub fn with_backend(
        backend: Arc<dyn TallyStore>,
        schedule: ResetSchedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = reset::spawn_reset_task(backend.clone(), schedule, clock, cancel.clone());
        Self {
            backend,
            cancel,
            reset_task: Mutex::new(Some(handle)),
        }
    }

    /// Count one message from `sender_id` in `group_id`.
    pub async fn increment(&self, group_id: &str, sender_id: &str) -> bool {
        match self.backend.increment(group_id, sender_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(group_id, sender_id, "Failed to update message tally: {}", e);
                false
            }
        }
    }

    /// Highest tally in the group, 0 if none or on read failure.
    pub async fn max_count(&self, group_id: &str) -> u64 {
        self.backend.max_count(group_id).await.unwrap_or_else(|e| {
            error!(group_id, "Failed to read group max tally: {}", e);
            0
        })
    }

    /// Tally for one pair, 0 if absent or on read failure.
    pub async fn sender_count(&self, group_id: &str, sender_id: &str) -> u64 {
        self.backend
            .sender_count(group_id, sender_id)
            .await
            .unwrap_or_else(|e| {
                error!(group_id, sender_id, "Failed to read sender tally: {}", e);
                0
            })
    }

    /// Clear every tally in every group.
    pub async fn reset_all(&self) -> bool {
        match self.backend.reset_all().await {
            Ok(rows) => {
                info!(rows, "Message tallies reset");
                true
            }
            Err(e) => {
                error!("Failed to reset message tallies: {}", e);
                false
            }
        }
    }

    /// Stop the reset task and release storage. Safe to call repeatedly.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.reset_task.lock().await.take()
            && let Err(e) = handle.await
        {
            error!("Reset task ended abnormally: {}", e);
        }
        if let Err(e) = self.backend.close().await {
            error!("Failed to close message count database: {}", e);
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

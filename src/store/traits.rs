//! `TallyStore` trait — async interface over the message-count table.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Backend-agnostic tally storage keyed by (group, sender).
#[async_trait]
pub trait TallyStore: Send + Sync {
    /// Create the tally table if it does not exist yet.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Add one to the pair's tally, creating it at 1 if absent.
    async fn increment(&self, group_id: &str, sender_id: &str) -> Result<(), DatabaseError>;

    /// Highest tally in the group, 0 when the group has no rows.
    async fn max_count(&self, group_id: &str) -> Result<u64, DatabaseError>;

    /// Tally for one pair, 0 when absent.
    async fn sender_count(&self, group_id: &str, sender_id: &str) -> Result<u64, DatabaseError>;

    /// Delete every tally in every group. Returns the number of rows removed.
    async fn reset_all(&self) -> Result<u64, DatabaseError>;

    /// Release the storage handle. Calling it again is a no-op.
    async fn close(&self) -> Result<(), DatabaseError>;
}

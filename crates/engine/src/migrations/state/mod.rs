//! State Store - durable record of which migrations are applied
//!
//! One record per `(group, identifier)` holds the migration's current
//! direction. Only the execution engine writes to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::definitions::{AppliedRecord, GroupId};
use super::identifier::Identifier;
use crate::error::MigrationResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStateStore;
pub use postgres::PostgresStateStore;

/// Backend persisting applied-migration records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the backing table if needed
    async fn ensure_schema(&self) -> MigrationResult<()>;

    /// Every record of a group, fetched in one round trip
    async fn applied(&self, group: &GroupId) -> MigrationResult<HashMap<Identifier, AppliedRecord>>;

    /// Insert or overwrite the record of `record.group`/`record.identifier`
    async fn record_applied(&self, record: &AppliedRecord) -> MigrationResult<()>;

    /// Flag a record as reverted
    async fn record_reverted(
        &self,
        group: &GroupId,
        identifier: &Identifier,
        at: DateTime<Utc>,
    ) -> MigrationResult<()>;
}

//! In-memory state store for development and testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

use super::StateStore;
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::{AppliedRecord, Direction, GroupId};
use crate::migrations::identifier::Identifier;

/// State store keeping records in process memory
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: DashMap<(GroupId, Identifier), AppliedRecord>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all groups
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a single record
    pub fn get(&self, group: &GroupId, identifier: &Identifier) -> Option<AppliedRecord> {
        self.records
            .get(&(group.clone(), identifier.clone()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn ensure_schema(&self) -> MigrationResult<()> {
        Ok(())
    }

    async fn applied(&self, group: &GroupId) -> MigrationResult<HashMap<Identifier, AppliedRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| &entry.key().0 == group)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect())
    }

    async fn record_applied(&self, record: &AppliedRecord) -> MigrationResult<()> {
        self.records.insert(
            (record.group.clone(), record.identifier.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn record_reverted(
        &self,
        group: &GroupId,
        identifier: &Identifier,
        at: DateTime<Utc>,
    ) -> MigrationResult<()> {
        let mut entry = self
            .records
            .get_mut(&(group.clone(), identifier.clone()))
            .ok_or_else(|| {
                MigrationError::StateStore(format!(
                    "no record for {} in group {}",
                    identifier, group
                ))
            })?;
        entry.direction = Direction::Down;
        entry.applied_at = at;
        Ok(())
    }
}

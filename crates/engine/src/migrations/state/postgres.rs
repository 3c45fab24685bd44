//! PostgreSQL state store backed by sqlx

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use super::StateStore;
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::{AppliedRecord, Direction, GroupId};
use crate::migrations::identifier::Identifier;

/// SQLSTATE raised when the state table does not exist yet
const UNDEFINED_TABLE: &str = "42P01";

/// State store keeping one row per `(group_id, identifier)`
#[derive(Debug, Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
    table: String,
}

impl PostgresStateStore {
    /// `table` must already be validated by `MigrationConfig::validate`
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// SQL to create the state table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                group_id VARCHAR(255) NOT NULL,\n    \
                identifier VARCHAR(64) NOT NULL,\n    \
                name VARCHAR(255) NOT NULL,\n    \
                direction VARCHAR(8) NOT NULL,\n    \
                applied_at TIMESTAMPTZ NOT NULL,\n    \
                PRIMARY KEY (group_id, identifier)\n\
            )",
            self.table
        )
    }

    /// SQL to load every record of a group
    pub fn select_group_sql(&self) -> String {
        format!(
            "SELECT identifier, name, direction, applied_at FROM {} WHERE group_id = $1",
            self.table
        )
    }

    /// SQL to insert or overwrite a record
    pub fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (group_id, identifier, name, direction, applied_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (group_id, identifier) DO UPDATE SET \
             name = EXCLUDED.name, direction = EXCLUDED.direction, applied_at = EXCLUDED.applied_at",
            self.table
        )
    }

    /// SQL to flag a record as reverted
    pub fn revert_sql(&self) -> String {
        format!(
            "UPDATE {} SET direction = $3, applied_at = $4 WHERE group_id = $1 AND identifier = $2",
            self.table
        )
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .map_or(false, |code| code == UNDEFINED_TABLE)
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn ensure_schema(&self) -> MigrationResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::StateStoreUnavailable(format!(
                    "Failed to create table {}: {}",
                    self.table, e
                ))
            })?;
        Ok(())
    }

    async fn applied(&self, group: &GroupId) -> MigrationResult<HashMap<Identifier, AppliedRecord>> {
        let rows = match sqlx::query(&self.select_group_sql())
            .bind(group.as_str())
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            // the table is created on the first real run; a dry run may come first
            Err(e) if is_undefined_table(&e) => return Ok(HashMap::new()),
            Err(e) => {
                return Err(MigrationError::StateStoreUnavailable(format!(
                    "Failed to query applied migrations: {}",
                    e
                )))
            }
        };

        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let identifier: String = row.try_get("identifier")?;
            let name: String = row.try_get("name")?;
            let direction: String = row.try_get("direction")?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at")?;

            let identifier = Identifier::parse(&identifier).map_err(|e| {
                MigrationError::StateStore(format!("corrupt record in {}: {}", self.table, e))
            })?;

            records.insert(
                identifier.clone(),
                AppliedRecord {
                    group: group.clone(),
                    identifier,
                    name,
                    direction: direction.parse::<Direction>()?,
                    applied_at,
                },
            );
        }

        Ok(records)
    }

    async fn record_applied(&self, record: &AppliedRecord) -> MigrationResult<()> {
        sqlx::query(&self.upsert_sql())
            .bind(record.group.as_str())
            .bind(record.identifier.as_str())
            .bind(&record.name)
            .bind(record.direction.as_str())
            .bind(record.applied_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::StateStore(format!(
                    "Failed to record migration {}: {}",
                    record.identifier, e
                ))
            })?;
        Ok(())
    }

    async fn record_reverted(
        &self,
        group: &GroupId,
        identifier: &Identifier,
        at: DateTime<Utc>,
    ) -> MigrationResult<()> {
        let result = sqlx::query(&self.revert_sql())
            .bind(group.as_str())
            .bind(identifier.as_str())
            .bind(Direction::Down.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::StateStore(format!(
                    "Failed to record revert of {}: {}",
                    identifier, e
                ))
            })?;

        if result.rows_affected() == 0 {
            return Err(MigrationError::StateStore(format!(
                "no record for {} in group {}",
                identifier, group
            )));
        }
        Ok(())
    }
}

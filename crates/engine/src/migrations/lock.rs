//! Run locks - optional mutual exclusion around `plan` + `apply`
//!
//! The engine assumes one invoking process per group. Deployments that may
//! run migrations from several places plug a lock in here.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;

use super::definitions::GroupId;
use crate::error::{MigrationError, MigrationResult};

/// Named mutex keyed by group
#[async_trait]
pub trait MigrationLock: Send + Sync {
    /// Block until the group's lock is held
    async fn acquire(&self, group: &GroupId) -> MigrationResult<()>;

    /// Release a lock taken by `acquire`
    async fn release(&self, group: &GroupId) -> MigrationResult<()>;
}

/// Lock that never blocks; the single-process default
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

#[async_trait]
impl MigrationLock for NoopLock {
    async fn acquire(&self, _group: &GroupId) -> MigrationResult<()> {
        Ok(())
    }

    async fn release(&self, _group: &GroupId) -> MigrationResult<()> {
        Ok(())
    }
}

/// Session-level PostgreSQL advisory lock on `hashtext(group)`.
///
/// Advisory locks belong to the session that took them, so the connection
/// is held from `acquire` until `release`.
pub struct PostgresAdvisoryLock {
    pool: PgPool,
    session: Mutex<Option<PoolConnection<Postgres>>>,
}

impl PostgresAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MigrationLock for PostgresAdvisoryLock {
    async fn acquire(&self, group: &GroupId) -> MigrationResult<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(MigrationError::Lock(format!(
                "lock for group {} is already held by this process",
                group
            )));
        }

        let mut connection = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrationError::Lock(format!("Failed to acquire connection: {}", e)))?;

        tracing::debug!(group = %group, "waiting for advisory lock");
        sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
            .bind(group.as_str())
            .execute(&mut *connection)
            .await
            .map_err(|e| MigrationError::Lock(format!("Failed to lock group {}: {}", group, e)))?;

        *session = Some(connection);
        Ok(())
    }

    async fn release(&self, group: &GroupId) -> MigrationResult<()> {
        let mut session = self.session.lock().await;
        let mut connection = match session.take() {
            Some(connection) => connection,
            None => return Ok(()),
        };

        sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(group.as_str())
            .execute(&mut *connection)
            .await
            .map_err(|e| MigrationError::Lock(format!("Failed to unlock group {}: {}", group, e)))?;
        Ok(())
    }
}

//! Script executors - run a migration body against the target database
//!
//! The engine only needs "execute script, get error or success". Each call
//! acquires its own connection and gives it back when the call returns,
//! whether the script succeeded or not.

use async_trait::async_trait;
use sqlx::{Executor, PgPool};

use crate::error::{MigrationError, MigrationResult};

/// Capability to run a raw script against the target database
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `script`; the error carries the database's message
    async fn execute_script(&self, script: &str) -> MigrationResult<()>;
}

/// Executor running scripts on a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
    transactional: bool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transactional: true,
        }
    }

    /// Wrap each script in its own transaction (default on)
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }
}

#[async_trait]
impl ScriptExecutor for PostgresExecutor {
    async fn execute_script(&self, script: &str) -> MigrationResult<()> {
        if script.trim().is_empty() {
            return Ok(());
        }

        // simple query protocol: the script may hold several statements
        if self.transactional {
            let mut transaction = self
                .pool
                .begin()
                .await
                .map_err(|e| MigrationError::Database(format!("Failed to start transaction: {}", e)))?;
            (&mut *transaction)
                .execute(script)
                .await
                .map_err(|e| MigrationError::Database(e.to_string()))?;
            transaction
                .commit()
                .await
                .map_err(|e| MigrationError::Database(format!("Failed to commit: {}", e)))?;
        } else {
            let mut connection = self
                .pool
                .acquire()
                .await
                .map_err(|e| MigrationError::Database(format!("Failed to acquire connection: {}", e)))?;
            (&mut *connection)
                .execute(script)
                .await
                .map_err(|e| MigrationError::Database(e.to_string()))?;
        }

        Ok(())
    }
}

//! Migration Runner - plans and applies migrations of one group
//!
//! Plans are derived fresh from the filesystem and the state store on every
//! call. Migrations run one at a time; the first failure halts the plan and
//! everything already recorded stays recorded. There is no compensating
//! rollback: running `up` again resumes from the state store.
//!
//! A crash after a script succeeds but before its state is recorded leaves
//! the database ahead of the state store. That gap is not detected here.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::definitions::{
    AppliedRecord, Direction, ExecutionResult, GroupId, MigrationFile, MigrationOutcome,
    MigrationPlan, MigrationStatus, OutcomeStatus, StatusReport, StatusRow,
};
use super::executor::ScriptExecutor;
use super::identifier::Identifier;
use super::lock::{MigrationLock, NoopLock};
use super::reporter;
use super::scanner::MigrationRepository;
use super::state::StateStore;
use crate::error::{MigrationError, MigrationResult};

/// Execution engine binding a repository to a state store and a database
pub struct MigrationRunner {
    repository: MigrationRepository,
    store: Arc<dyn StateStore>,
    executor: Arc<dyn ScriptExecutor>,
    lock: Arc<dyn MigrationLock>,
}

impl MigrationRunner {
    /// Create a runner without inter-process locking
    pub fn new(
        repository: MigrationRepository,
        store: Arc<dyn StateStore>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self {
            repository,
            store,
            executor,
            lock: Arc::new(NoopLock),
        }
    }

    /// Guard every `run` with `lock`
    pub fn with_lock(mut self, lock: Arc<dyn MigrationLock>) -> Self {
        self.lock = lock;
        self
    }

    async fn applied_state(
        &self,
        group: &GroupId,
    ) -> MigrationResult<HashMap<Identifier, AppliedRecord>> {
        self.store.applied(group).await.map_err(|e| match e {
            MigrationError::StateStoreUnavailable(_) => e,
            other => MigrationError::StateStoreUnavailable(other.to_string()),
        })
    }

    /// Compute the ordered migrations a run would attempt.
    ///
    /// `up` takes every migration not currently applied, ascending, up to and
    /// including `target`. `down` takes every applied migration, descending,
    /// down to and including `target`.
    pub async fn plan(
        &self,
        group: &GroupId,
        direction: Direction,
        target: Option<&Identifier>,
    ) -> MigrationResult<MigrationPlan> {
        let migrations = self.repository.list_migrations(group)?;

        // `--to 2` names the file `0002_*`
        let target = match target {
            Some(target) => match migrations.iter().find(|m| m.identifier.same_sequence(target)) {
                Some(m) => Some(m.identifier.clone()),
                None => {
                    return Err(MigrationError::UnknownTarget {
                        group: group.to_string(),
                        identifier: target.to_string(),
                    })
                }
            },
            None => None,
        };
        let target = target.as_ref();

        let applied = self.applied_state(group).await?;
        let is_applied = |m: &MigrationFile| {
            applied
                .get(&m.identifier)
                .map_or(false, |record| record.is_applied())
        };

        let planned: Vec<MigrationFile> = match direction {
            Direction::Up => migrations
                .into_iter()
                .filter(|m| !is_applied(m))
                .filter(|m| target.map_or(true, |t| &m.identifier <= t))
                .collect(),
            Direction::Down => migrations
                .into_iter()
                .rev()
                .filter(|m| is_applied(m))
                .filter(|m| target.map_or(true, |t| &m.identifier >= t))
                .collect(),
        };

        tracing::debug!(
            group = %group,
            direction = %direction,
            count = planned.len(),
            "planned migrations"
        );

        Ok(MigrationPlan {
            group: group.clone(),
            direction,
            migrations: planned,
        })
    }

    /// Apply a plan in order, halting at the first failure.
    ///
    /// A dry run previews every entry and touches neither the database nor
    /// the state store.
    pub async fn apply(&self, plan: &MigrationPlan, dry_run: bool) -> ExecutionResult {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(plan.len());
        let mut halted = false;

        for migration in &plan.migrations {
            let status = if halted {
                OutcomeStatus::NotAttempted
            } else if dry_run {
                tracing::info!("{}", reporter::preview_line(migration, plan.direction));
                OutcomeStatus::Previewed
            } else {
                match self.execute(migration, plan.direction).await {
                    Ok(status) => status,
                    Err(error) => {
                        tracing::warn!(
                            group = %migration.group,
                            migration = %migration.identifier,
                            "migration failed, halting: {}",
                            error
                        );
                        halted = true;
                        OutcomeStatus::Failed(error.to_string())
                    }
                }
            };

            outcomes.push(MigrationOutcome {
                migration: migration.clone(),
                status,
            });
        }

        ExecutionResult {
            group: plan.group.clone(),
            direction: plan.direction,
            dry_run,
            outcomes,
            elapsed: start.elapsed(),
        }
    }

    /// Run one migration's script, then record its new state
    async fn execute(
        &self,
        migration: &MigrationFile,
        direction: Direction,
    ) -> MigrationResult<OutcomeStatus> {
        let script = migration
            .script(direction)
            .ok_or_else(|| MigrationError::Irreversible(migration.label()))?;

        self.executor.execute_script(script).await?;

        let now = Utc::now();
        match direction {
            Direction::Up => {
                self.store
                    .record_applied(&AppliedRecord::applied(migration, now))
                    .await?;
                tracing::info!(group = %migration.group, migration = %migration.label(), "applied migration");
                Ok(OutcomeStatus::Applied)
            }
            Direction::Down => {
                self.store
                    .record_reverted(&migration.group, &migration.identifier, now)
                    .await?;
                tracing::info!(group = %migration.group, migration = %migration.label(), "reverted migration");
                Ok(OutcomeStatus::Reverted)
            }
        }
    }

    /// Lock the group, plan, apply, and release the lock on every path.
    ///
    /// A dry run writes nothing and takes no lock. A failed release is
    /// logged and the run's result is still returned.
    pub async fn run(
        &self,
        group: &GroupId,
        direction: Direction,
        target: Option<&Identifier>,
        dry_run: bool,
    ) -> MigrationResult<ExecutionResult> {
        if dry_run {
            return self.plan_and_apply(group, direction, target, dry_run).await;
        }

        self.lock.acquire(group).await?;

        let result = self.plan_and_apply(group, direction, target, dry_run).await;
        if let Err(error) = self.lock.release(group).await {
            tracing::warn!(group = %group, "failed to release migration lock: {}", error);
        }

        result
    }

    async fn plan_and_apply(
        &self,
        group: &GroupId,
        direction: Direction,
        target: Option<&Identifier>,
        dry_run: bool,
    ) -> MigrationResult<ExecutionResult> {
        if !dry_run {
            self.store.ensure_schema().await.map_err(|e| match e {
                MigrationError::StateStoreUnavailable(_) => e,
                other => MigrationError::StateStoreUnavailable(other.to_string()),
            })?;
        }

        let plan = self.plan(group, direction, target).await?;
        Ok(self.apply(&plan, dry_run).await)
    }

    /// Every migration of the group with its current state, plus records
    /// whose file has disappeared
    pub async fn status(&self, group: &GroupId) -> MigrationResult<StatusReport> {
        let migrations = self.repository.list_migrations(group)?;
        let mut applied = self.applied_state(group).await?;

        let on_disk: HashSet<Identifier> =
            migrations.iter().map(|m| m.identifier.clone()).collect();

        let rows = migrations
            .into_iter()
            .map(|migration| {
                let (status, applied_at) = match applied.get(&migration.identifier) {
                    Some(record) if record.is_applied() => {
                        (MigrationStatus::Up, Some(record.applied_at))
                    }
                    Some(record) => (MigrationStatus::Down, Some(record.applied_at)),
                    None => (MigrationStatus::Pending, None),
                };
                StatusRow {
                    migration,
                    status,
                    applied_at,
                }
            })
            .collect();

        applied.retain(|identifier, _| !on_disk.contains(identifier));
        let mut missing: Vec<AppliedRecord> = applied.into_values().collect();
        missing.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        if !missing.is_empty() {
            tracing::warn!(
                group = %group,
                count = missing.len(),
                "state store holds records without migration files"
            );
        }

        Ok(StatusReport {
            group: group.clone(),
            rows,
            missing,
        })
    }
}

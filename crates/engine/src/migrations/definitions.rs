//! Migration Definitions - Core types shared by the migration engine
//!
//! Defines groups, migration files, applied-state records, plans and the
//! per-run execution result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::identifier::Identifier;
use crate::error::MigrationError;

/// Name of a migration group directory, e.g. `0001_core`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric prefix of the group name, if any
    pub fn prefix(&self) -> Option<Identifier> {
        Identifier::parse(&self.0).ok()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the migration (run the UP section)
    Up,
    /// Revert the migration (run the DOWN section)
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(MigrationError::StateStore(format!(
                "unknown migration direction '{}'",
                other
            ))),
        }
    }
}

/// A migration file discovered on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// Group the migration belongs to
    pub group: GroupId,
    /// Time-derived sequence key
    pub identifier: Identifier,
    /// Slug following the identifier in the filename
    pub name: String,
    /// Location of the file
    pub path: PathBuf,
    /// Statements run when applying
    pub up_script: String,
    /// Statements run when reverting, absent for irreversible migrations
    pub down_script: Option<String>,
}

impl MigrationFile {
    /// `{identifier}_{name}`, the way the file is named on disk
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.identifier.to_string()
        } else {
            format!("{}_{}", self.identifier, self.name)
        }
    }

    /// Script body for the given direction
    pub fn script(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Up => Some(self.up_script.as_str()),
            Direction::Down => self.down_script.as_deref(),
        }
    }

    pub fn is_reversible(&self) -> bool {
        self.down_script.is_some()
    }
}

/// Durable record of a migration's current direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub group: GroupId,
    pub identifier: Identifier,
    pub name: String,
    pub direction: Direction,
    pub applied_at: DateTime<Utc>,
}

impl AppliedRecord {
    /// Build an `Up` record for a freshly applied migration
    pub fn applied(migration: &MigrationFile, at: DateTime<Utc>) -> Self {
        Self {
            group: migration.group.clone(),
            identifier: migration.identifier.clone(),
            name: migration.name.clone(),
            direction: Direction::Up,
            applied_at: at,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.direction == Direction::Up
    }
}

/// Migration status as reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Currently applied
    Up,
    /// Applied once, then reverted
    Down,
    /// Never applied
    Pending,
    /// Recorded in the state store but no longer on disk
    Missing,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Up => "up",
            MigrationStatus::Down => "down",
            MigrationStatus::Pending => "pending",
            MigrationStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One row of a `status` listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub group: GroupId,
    pub identifier: Identifier,
    pub name: String,
    pub status: MigrationStatus,
    pub applied_at: Option<DateTime<Utc>>,
}

/// A migration file with its current state
#[derive(Debug, Clone)]
pub struct StatusRow {
    pub migration: MigrationFile,
    pub status: MigrationStatus,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Filesystem and state store view of one group
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub group: GroupId,
    pub rows: Vec<StatusRow>,
    /// Records whose migration file no longer exists
    pub missing: Vec<AppliedRecord>,
}

impl StatusReport {
    pub fn pending_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status != MigrationStatus::Up)
            .count()
    }

    /// Flattened rows, missing records last
    pub fn entries(&self) -> Vec<StatusEntry> {
        let rows = self.rows.iter().map(|row| StatusEntry {
            group: row.migration.group.clone(),
            identifier: row.migration.identifier.clone(),
            name: row.migration.name.clone(),
            status: row.status,
            applied_at: row.applied_at,
        });
        let missing = self.missing.iter().map(|record| StatusEntry {
            group: record.group.clone(),
            identifier: record.identifier.clone(),
            name: record.name.clone(),
            status: MigrationStatus::Missing,
            applied_at: Some(record.applied_at),
        });
        rows.chain(missing).collect()
    }
}

/// Ordered list of migrations one `apply` call will attempt
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub group: GroupId,
    pub direction: Direction,
    pub migrations: Vec<MigrationFile>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn identifiers(&self) -> Vec<&Identifier> {
        self.migrations.iter().map(|m| &m.identifier).collect()
    }
}

/// What happened to a single planned migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Up script ran and the state store recorded it
    Applied,
    /// Down script ran and the state store recorded it
    Reverted,
    /// Dry run; nothing executed
    Previewed,
    /// Execution or state recording failed; the run halted here
    Failed(String),
    /// Skipped because an earlier migration in the plan failed
    NotAttempted,
}

/// Per-migration result of an `apply` call
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub migration: MigrationFile,
    pub status: OutcomeStatus,
}

/// Result of applying a plan
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub group: GroupId,
    pub direction: Direction,
    pub dry_run: bool,
    pub outcomes: Vec<MigrationOutcome>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.failed().is_none()
    }

    /// The migration that halted the run, with its error
    pub fn failed(&self) -> Option<(&MigrationFile, &str)> {
        self.outcomes.iter().find_map(|o| match &o.status {
            OutcomeStatus::Failed(error) => Some((&o.migration, error.as_str())),
            _ => None,
        })
    }

    pub fn count(&self, status: &OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| &o.status == status).count()
    }

    pub fn applied_count(&self) -> usize {
        self.count(&OutcomeStatus::Applied)
    }

    pub fn reverted_count(&self) -> usize {
        self.count(&OutcomeStatus::Reverted)
    }

    pub fn previewed_count(&self) -> usize {
        self.count(&OutcomeStatus::Previewed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(&OutcomeStatus::NotAttempted)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed(_)))
            .count()
    }

    /// The halting failure as an error, for callers that exit on it
    pub fn error(&self) -> Option<MigrationError> {
        self.failed()
            .map(|(migration, message)| MigrationError::ScriptExecution {
                identifier: migration.identifier.to_string(),
                message: message.to_string(),
            })
    }

    /// Identifiers left unapplied after a halted run, in plan order
    pub fn remaining(&self) -> Vec<&Identifier> {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    OutcomeStatus::Failed(_) | OutcomeStatus::NotAttempted
                )
            })
            .map(|o| &o.migration.identifier)
            .collect()
    }
}

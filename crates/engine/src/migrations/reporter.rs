//! Reporter - formats preview, status and summary lines
//!
//! Pure formatting; printing is left to the caller.

use chrono::{DateTime, Utc};

use super::definitions::{
    AppliedRecord, Direction, ExecutionResult, MigrationFile, MigrationOutcome, MigrationStatus,
    OutcomeStatus,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn qualified(migration: &MigrationFile) -> String {
    format!("{}/{}", migration.group, migration.label())
}

/// Line announcing what a dry run would do
pub fn preview_line(migration: &MigrationFile, direction: Direction) -> String {
    let mut line = format!("[dry-run] {:<4} {}", direction, qualified(migration));
    if direction == Direction::Down && !migration.is_reversible() {
        line.push_str(" (no DOWN section)");
    }
    line
}

/// One `status` row
pub fn status_line(
    migration: &MigrationFile,
    status: MigrationStatus,
    applied_at: Option<DateTime<Utc>>,
) -> String {
    match applied_at {
        Some(at) => format!(
            "{:<8} {}  {}",
            status,
            qualified(migration),
            at.format(TIME_FORMAT)
        ),
        None => format!("{:<8} {}", status, qualified(migration)),
    }
}

/// Row for a record whose file is gone from disk
pub fn missing_line(record: &AppliedRecord) -> String {
    format!(
        "{:<8} {}/{}_{}  {} {}",
        MigrationStatus::Missing,
        record.group,
        record.identifier,
        record.name,
        record.direction,
        record.applied_at.format(TIME_FORMAT)
    )
}

/// Line for one migration after an `apply`
pub fn outcome_line(outcome: &MigrationOutcome, direction: Direction) -> String {
    let target = qualified(&outcome.migration);
    match &outcome.status {
        OutcomeStatus::Applied => format!("applied   {}", target),
        OutcomeStatus::Reverted => format!("reverted  {}", target),
        OutcomeStatus::Previewed => preview_line(&outcome.migration, direction),
        OutcomeStatus::Failed(error) => format!("FAILED    {}: {}", target, error),
        OutcomeStatus::NotAttempted => format!("skipped   {}", target),
    }
}

/// Final tally of a run
pub fn summary_line(result: &ExecutionResult) -> String {
    if result.dry_run {
        return format!(
            "dry run: {} migration(s) would be {} in {}",
            result.previewed_count(),
            match result.direction {
                Direction::Up => "applied",
                Direction::Down => "reverted",
            },
            result.group
        );
    }

    let mut line = format!(
        "{}: applied {}, reverted {}, skipped {}, failed {} ({} ms)",
        result.group,
        result.applied_count(),
        result.reverted_count(),
        result.skipped_count(),
        result.failed_count(),
        result.elapsed.as_millis()
    );
    if let Some((migration, _)) = result.failed() {
        line.push_str(&format!("; halted at {}", migration.identifier));
    }
    line
}

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use strata_engine::{
    AppliedRecord, Direction, GroupId, Identifier, MemoryStateStore, MigrationError,
    MigrationGenerator, MigrationLock, MigrationRepository, MigrationResult, MigrationRunner,
    MigrationStatus, MigrationTemplate, OutcomeStatus, ScriptExecutor, StateStore,
};

/// Records every script it is asked to run; fails scripts containing `fail_on`
#[derive(Default)]
struct RecordingExecutor {
    scripts: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    fn failing_on(marker: &str) -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            fail_on: Some(marker.to_string()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for RecordingExecutor {
    async fn execute_script(&self, script: &str) -> MigrationResult<()> {
        self.scripts.lock().unwrap().push(script.to_string());
        match &self.fail_on {
            Some(marker) if script.contains(marker.as_str()) => Err(MigrationError::Database(
                format!("Parse error near {}", marker),
            )),
            _ => Ok(()),
        }
    }
}

/// Counts acquire/release pairs
#[derive(Default)]
struct CountingLock {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

#[async_trait]
impl MigrationLock for CountingLock {
    async fn acquire(&self, _group: &GroupId) -> MigrationResult<()> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self, _group: &GroupId) -> MigrationResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Lock whose release always fails
#[derive(Default)]
struct StuckLock {
    acquired: AtomicUsize,
}

#[async_trait]
impl MigrationLock for StuckLock {
    async fn acquire(&self, _group: &GroupId) -> MigrationResult<()> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self, group: &GroupId) -> MigrationResult<()> {
        Err(MigrationError::Lock(format!("Failed to unlock group {}", group)))
    }
}

/// A state store whose database is down
struct UnreachableStore;

#[async_trait]
impl StateStore for UnreachableStore {
    async fn ensure_schema(&self) -> MigrationResult<()> {
        Err(MigrationError::Database("connection refused".to_string()))
    }

    async fn applied(&self, _group: &GroupId) -> MigrationResult<HashMap<Identifier, AppliedRecord>> {
        Err(MigrationError::Database("connection refused".to_string()))
    }

    async fn record_applied(&self, _record: &AppliedRecord) -> MigrationResult<()> {
        Err(MigrationError::Database("connection refused".to_string()))
    }

    async fn record_reverted(
        &self,
        _group: &GroupId,
        _identifier: &Identifier,
        _at: chrono::DateTime<Utc>,
    ) -> MigrationResult<()> {
        Err(MigrationError::Database("connection refused".to_string()))
    }
}

struct Fixture {
    _dir: TempDir,
    repository: MigrationRepository,
    group: GroupId,
}

impl Fixture {
    /// Group `0001_core` holding reversible migrations 0001..=0003
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let group_path = dir.path().join("0001_core");
        fs::create_dir(&group_path).unwrap();

        for (id, table) in [("0001", "a"), ("0002", "b"), ("0003", "c")] {
            fs::write(
                group_path.join(format!("{}_{}.sql", id, table)),
                format!(
                    "-- UP\nCREATE TABLE {t};\n-- DOWN\nDROP TABLE {t};\n",
                    t = table
                ),
            )
            .unwrap();
        }

        let repository = MigrationRepository::new(dir.path(), "sql");
        Self {
            _dir: dir,
            repository,
            group: GroupId::new("0001_core"),
        }
    }

    fn path(&self, file: &str) -> std::path::PathBuf {
        self.repository.group_path(&self.group).join(file)
    }

    fn runner(
        &self,
        store: Arc<MemoryStateStore>,
        executor: Arc<RecordingExecutor>,
    ) -> MigrationRunner {
        MigrationRunner::new(self.repository.clone(), store, executor)
    }
}

fn id(value: &str) -> Identifier {
    Identifier::parse(value).unwrap()
}

fn ids(identifiers: Vec<&Identifier>) -> Vec<String> {
    identifiers.into_iter().map(|i| i.to_string()).collect()
}

async fn direction_of(store: &MemoryStateStore, group: &GroupId, identifier: &str) -> Option<Direction> {
    store.get(group, &id(identifier)).map(|record| record.direction)
}

#[tokio::test]
async fn test_up_applies_everything_then_plans_nothing() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor.clone());

    let plan = runner.plan(&fixture.group, Direction::Up, None).await.unwrap();
    assert_eq!(ids(plan.identifiers()), vec!["0001", "0002", "0003"]);

    let result = runner.apply(&plan, false).await;
    assert!(result.is_success());
    assert_eq!(result.applied_count(), 3);
    assert_eq!(
        executor.calls(),
        vec!["CREATE TABLE a;", "CREATE TABLE b;", "CREATE TABLE c;"]
    );

    let applied = store.applied(&fixture.group).await.unwrap();
    assert_eq!(applied.len(), 3);
    assert!(applied.values().all(|record| record.direction == Direction::Up));

    let again = runner.plan(&fixture.group, Direction::Up, None).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_failure_halts_the_plan() {
    let fixture = Fixture::new();
    fs::write(fixture.path("0002_b.sql"), "-- UP\nBROKEN b;\n-- DOWN\nDROP TABLE b;\n").unwrap();

    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::failing_on("BROKEN"));
    let runner = fixture.runner(store.clone(), executor.clone());

    let result = runner
        .run(&fixture.group, Direction::Up, None, false)
        .await
        .unwrap();

    let statuses: Vec<_> = result.outcomes.iter().map(|o| o.status.clone()).collect();
    assert_eq!(statuses[0], OutcomeStatus::Applied);
    assert!(matches!(&statuses[1], OutcomeStatus::Failed(msg) if msg.contains("BROKEN")));
    assert_eq!(statuses[2], OutcomeStatus::NotAttempted);
    assert!(!result.is_success());
    assert_eq!(ids(result.remaining()), vec!["0002", "0003"]);

    // 0003 was never handed to the database
    assert_eq!(executor.calls().len(), 2);

    assert_eq!(store.len(), 1);
    assert_eq!(direction_of(&store, &fixture.group, "0001").await, Some(Direction::Up));

    match result.error() {
        Some(MigrationError::ScriptExecution { identifier, .. }) => assert_eq!(identifier, "0002"),
        other => panic!("expected script failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rerun_after_fix_resumes_where_it_stopped() {
    let fixture = Fixture::new();
    fs::write(fixture.path("0002_b.sql"), "-- UP\nBROKEN b;\n").unwrap();

    let store = Arc::new(MemoryStateStore::new());
    let broken = Arc::new(RecordingExecutor::failing_on("BROKEN"));
    let runner = fixture.runner(store.clone(), broken);
    let first = runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();
    assert_eq!(first.applied_count(), 1);

    fs::write(fixture.path("0002_b.sql"), "-- UP\nCREATE TABLE b;\n").unwrap();
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor.clone());

    let second = runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();
    assert!(second.is_success());
    assert_eq!(
        second
            .outcomes
            .iter()
            .map(|o| o.migration.identifier.to_string())
            .collect::<Vec<_>>(),
        vec!["0002", "0003"]
    );
    assert_eq!(executor.calls(), vec!["CREATE TABLE b;", "CREATE TABLE c;"]);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_down_reverses_in_descending_order() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor.clone());

    runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();

    let plan = runner.plan(&fixture.group, Direction::Down, None).await.unwrap();
    assert_eq!(ids(plan.identifiers()), vec!["0003", "0002", "0001"]);

    let result = runner
        .run(&fixture.group, Direction::Down, Some(&id("0002")), false)
        .await
        .unwrap();
    assert_eq!(result.reverted_count(), 2);
    assert_eq!(
        executor.calls()[3..].to_vec(),
        vec!["DROP TABLE c;", "DROP TABLE b;"]
    );

    assert_eq!(direction_of(&store, &fixture.group, "0001").await, Some(Direction::Up));
    assert_eq!(direction_of(&store, &fixture.group, "0002").await, Some(Direction::Down));
    assert_eq!(direction_of(&store, &fixture.group, "0003").await, Some(Direction::Down));

    // reverted migrations are pending again
    let plan = runner.plan(&fixture.group, Direction::Up, None).await.unwrap();
    assert_eq!(ids(plan.identifiers()), vec!["0002", "0003"]);
}

#[tokio::test]
async fn test_dry_run_touches_neither_database_nor_state() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor.clone());

    let result = runner.run(&fixture.group, Direction::Up, None, true).await.unwrap();
    assert!(result.dry_run);
    assert_eq!(result.previewed_count(), 3);
    assert!(result.outcomes.iter().all(|o| o.status == OutcomeStatus::Previewed));
    assert!(executor.calls().is_empty());
    assert!(store.is_empty());

    runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();
    let before = store.applied(&fixture.group).await.unwrap();
    let calls = executor.calls().len();

    let result = runner.run(&fixture.group, Direction::Down, None, true).await.unwrap();
    assert_eq!(result.previewed_count(), 3);
    assert_eq!(executor.calls().len(), calls);
    assert_eq!(store.applied(&fixture.group).await.unwrap(), before);
}

#[tokio::test]
async fn test_up_to_target_is_inclusive() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor);

    let plan = runner
        .plan(&fixture.group, Direction::Up, Some(&id("0002")))
        .await
        .unwrap();
    assert_eq!(ids(plan.identifiers()), vec!["0001", "0002"]);

    let unknown = runner
        .plan(&fixture.group, Direction::Up, Some(&id("0042")))
        .await;
    assert!(matches!(unknown, Err(MigrationError::UnknownTarget { .. })));
}

#[tokio::test]
async fn test_down_without_down_section_fails_without_executing() {
    let fixture = Fixture::new();
    fs::write(fixture.path("0003_c.sql"), "-- UP\nCREATE TABLE c;\n").unwrap();

    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor.clone());
    runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();
    let calls = executor.calls().len();

    let result = runner.run(&fixture.group, Direction::Down, None, false).await.unwrap();
    assert!(matches!(
        &result.outcomes[0].status,
        OutcomeStatus::Failed(msg) if msg.contains("no DOWN section")
    ));
    assert_eq!(result.outcomes[1].status, OutcomeStatus::NotAttempted);
    assert_eq!(executor.calls().len(), calls);
    assert_eq!(direction_of(&store, &fixture.group, "0003").await, Some(Direction::Up));
}

#[tokio::test]
async fn test_status_reports_each_state_and_missing_files() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = fixture.runner(store.clone(), executor);

    runner
        .run(&fixture.group, Direction::Up, Some(&id("0002")), false)
        .await
        .unwrap();
    runner
        .run(&fixture.group, Direction::Down, Some(&id("0002")), false)
        .await
        .unwrap();
    store
        .record_applied(&AppliedRecord {
            group: fixture.group.clone(),
            identifier: id("0000"),
            name: "deleted_file".to_string(),
            direction: Direction::Up,
            applied_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = runner.status(&fixture.group).await.unwrap();
    let statuses: Vec<_> = report.rows.iter().map(|row| row.status).collect();
    assert_eq!(
        statuses,
        vec![MigrationStatus::Up, MigrationStatus::Down, MigrationStatus::Pending]
    );
    assert!(report.rows[0].applied_at.is_some());
    assert!(report.rows[2].applied_at.is_none());
    assert_eq!(report.pending_count(), 2);

    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].name, "deleted_file");
    let entries = report.entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[3].status, MigrationStatus::Missing);
}

#[tokio::test]
async fn test_lock_is_released_after_a_failed_run() {
    let fixture = Fixture::new();
    fs::write(fixture.path("0001_a.sql"), "BROKEN a;").unwrap();

    let lock = Arc::new(CountingLock::default());
    let runner = fixture
        .runner(
            Arc::new(MemoryStateStore::new()),
            Arc::new(RecordingExecutor::failing_on("BROKEN")),
        )
        .with_lock(lock.clone());

    let result = runner.run(&fixture.group, Direction::Up, None, false).await.unwrap();
    assert!(!result.is_success());

    let missing_target = runner
        .run(&fixture.group, Direction::Up, Some(&id("9999")), false)
        .await;
    assert!(missing_target.is_err());

    assert_eq!(lock.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(lock.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_state_store_attempts_nothing() {
    let fixture = Fixture::new();
    let executor = Arc::new(RecordingExecutor::default());
    let runner = MigrationRunner::new(
        fixture.repository.clone(),
        Arc::new(UnreachableStore),
        executor.clone(),
    );

    let result = runner.run(&fixture.group, Direction::Up, None, false).await;
    assert!(matches!(result, Err(MigrationError::StateStoreUnavailable(_))));

    let dry = runner.run(&fixture.group, Direction::Up, None, true).await;
    assert!(matches!(dry, Err(MigrationError::StateStoreUnavailable(_))));

    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_generated_migration_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let repository = MigrationRepository::new(dir.path().join("migrations"), "sql");
    let generator = MigrationGenerator::new(repository.clone());

    let group = generator.create_group("core").unwrap();
    let migration = generator
        .generate(None, "create user", MigrationTemplate::Reversible)
        .unwrap();
    assert_eq!(migration.group, group);

    let content = fs::read_to_string(&migration.path)
        .unwrap()
        .replace(
            "-- Add your schema changes here",
            "CREATE TABLE user;",
        )
        .replace(
            "-- Add statements reverting the UP section here",
            "DROP TABLE user;",
        );
    fs::write(&migration.path, content).unwrap();

    let store = Arc::new(MemoryStateStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let runner = MigrationRunner::new(repository, store.clone(), executor.clone());

    let up = runner.run(&group, Direction::Up, None, false).await.unwrap();
    assert_eq!(up.applied_count(), 1);
    let down = runner.run(&group, Direction::Down, None, false).await.unwrap();
    assert_eq!(down.reverted_count(), 1);
    assert_eq!(
        executor.calls(),
        vec!["CREATE TABLE user;", "DROP TABLE user;"]
    );
}

#[tokio::test]
async fn test_failed_release_still_reports_the_run() {
    let fixture = Fixture::new();
    let store = Arc::new(MemoryStateStore::new());
    let lock = Arc::new(StuckLock::default());
    let runner = fixture
        .runner(store.clone(), Arc::new(RecordingExecutor::default()))
        .with_lock(lock.clone());

    let result = runner
        .run(&fixture.group, Direction::Up, Some(&id("0001")), false)
        .await
        .unwrap();

    assert_eq!(result.applied_count(), 1);
    assert_eq!(store.len(), 1);
    assert_eq!(lock.acquired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dry_run_takes_no_lock() {
    let fixture = Fixture::new();
    let lock = Arc::new(CountingLock::default());
    let runner = fixture
        .runner(
            Arc::new(MemoryStateStore::new()),
            Arc::new(RecordingExecutor::default()),
        )
        .with_lock(lock.clone());

    let result = runner.run(&fixture.group, Direction::Up, None, true).await.unwrap();
    assert_eq!(result.previewed_count(), 3);
    assert_eq!(lock.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(lock.released.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_target_matches_regardless_of_zero_padding() {
    let fixture = Fixture::new();
    let runner = fixture.runner(
        Arc::new(MemoryStateStore::new()),
        Arc::new(RecordingExecutor::default()),
    );

    let plan = runner
        .plan(&fixture.group, Direction::Up, Some(&id("2")))
        .await
        .unwrap();
    assert_eq!(ids(plan.identifiers()), vec!["0001", "0002"]);
}

use console::style;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use strata_engine::reporter;
use strata_engine::{
    resolve_default_group, Direction, ExecutionResult, GroupId, Identifier, MigrationConfig,
    MigrationError, MigrationGenerator, MigrationRepository, MigrationResult, MigrationRunner,
    MigrationStatus, MigrationTemplate, OutcomeStatus, PostgresAdvisoryLock, PostgresExecutor,
    PostgresStateStore,
};

/// `--group` when given, otherwise the highest-prefixed group on disk
pub fn resolve_group(
    repository: &MigrationRepository,
    group: Option<String>,
) -> MigrationResult<GroupId> {
    match group {
        Some(group) => Ok(GroupId::new(group)),
        None => resolve_default_group(repository.base_path())?.require(),
    }
}

fn parse_target(group: &GroupId, to: Option<String>) -> MigrationResult<Option<Identifier>> {
    to.map(|to| {
        Identifier::parse(&to).map_err(|_| MigrationError::UnknownTarget {
            group: group.to_string(),
            identifier: to.clone(),
        })
    })
    .transpose()
}

async fn connect(config: &MigrationConfig) -> MigrationResult<PgPool> {
    let url = config.require_database_url()?;
    // the advisory lock pins one connection for the whole run
    PgPoolOptions::new()
        .max_connections((*config.get_max_connections()).max(2))
        .connect(url)
        .await
        .map_err(|e| MigrationError::StateStoreUnavailable(format!("Failed to connect: {}", e)))
}

fn runner(config: &MigrationConfig, repository: MigrationRepository, pool: PgPool) -> MigrationRunner {
    MigrationRunner::new(
        repository,
        Arc::new(PostgresStateStore::new(
            pool.clone(),
            config.get_migrations_table().clone(),
        )),
        Arc::new(PostgresExecutor::new(pool.clone()).transactional(*config.get_transactional())),
    )
    .with_lock(Arc::new(PostgresAdvisoryLock::new(pool)))
}

pub fn generate(
    config: &MigrationConfig,
    name: &str,
    group: Option<String>,
    reversible: bool,
) -> MigrationResult<()> {
    let generator = MigrationGenerator::new(MigrationRepository::from_config(config));
    let template = if reversible {
        MigrationTemplate::Reversible
    } else {
        MigrationTemplate::Standard
    };

    let migration = generator.generate(group.map(GroupId::new), name, template)?;
    println!(
        "{} {}",
        style("Created migration:").green(),
        migration.path.display()
    );
    Ok(())
}

/// Apply or revert a group, printing one line per planned migration.
///
/// A halted run is returned as the error naming the failing identifier.
pub async fn run(
    config: &MigrationConfig,
    direction: Direction,
    group: Option<String>,
    to: Option<String>,
    dry_run: bool,
) -> MigrationResult<()> {
    let repository = MigrationRepository::from_config(config);
    let group = resolve_group(&repository, group)?;
    let target = parse_target(&group, to)?;

    let pool = connect(config).await?;
    let runner = runner(config, repository, pool.clone());
    let result = runner.run(&group, direction, target.as_ref(), dry_run).await;
    pool.close().await;
    let result = result?;

    print_result(&result);
    match result.error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn print_result(result: &ExecutionResult) {
    if result.outcomes.is_empty() {
        let verb = match result.direction {
            Direction::Up => "migrate",
            Direction::Down => "revert",
        };
        println!("Nothing to {} in {}", verb, result.group);
        return;
    }

    for outcome in &result.outcomes {
        let line = reporter::outcome_line(outcome, result.direction);
        match outcome.status {
            OutcomeStatus::Applied | OutcomeStatus::Reverted => {
                println!("{}", style(line).green())
            }
            OutcomeStatus::Failed(_) => println!("{}", style(line).red().bold()),
            OutcomeStatus::NotAttempted => println!("{}", style(line).dim()),
            OutcomeStatus::Previewed => println!("{}", line),
        }
    }
    println!("{}", style(reporter::summary_line(result)).bold());
}

pub async fn status(
    config: &MigrationConfig,
    group: Option<String>,
    json: bool,
) -> MigrationResult<()> {
    let repository = MigrationRepository::from_config(config);
    let group = resolve_group(&repository, group)?;

    let pool = connect(config).await?;
    let runner = runner(config, repository, pool.clone());
    let report = runner.status(&group).await;
    pool.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.entries())?);
        return Ok(());
    }

    println!("{}", style(format!("Migration status for {}", group)).bold());
    if report.rows.is_empty() && report.missing.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    for row in &report.rows {
        let line = reporter::status_line(&row.migration, row.status, row.applied_at);
        match row.status {
            MigrationStatus::Up => println!("{}", style(line).green()),
            MigrationStatus::Down => println!("{}", style(line).yellow()),
            _ => println!("{}", line),
        }
    }
    for record in &report.missing {
        println!("{}", style(reporter::missing_line(record)).red());
    }

    println!("\n{} pending", report.pending_count());
    Ok(())
}

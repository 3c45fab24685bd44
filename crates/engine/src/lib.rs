//! # strata-engine
//!
//! Migration engine for grouped schema-change files.
//!
//! Migrations live in `base/{NNNN_group}/{identifier}_{name}.{ext}`. Each
//! group is an independent sequence ordered by time-derived identifiers.
//! Applied state is kept in a database table, separate from the files, and
//! every run re-reads both.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlx::postgres::PgPoolOptions;
//! use strata_engine::{
//!     Direction, MigrationConfig, MigrationRepository, MigrationRunner, PostgresExecutor,
//!     PostgresStateStore, resolve_default_group,
//! };
//!
//! # async fn run() -> strata_engine::MigrationResult<()> {
//! let config = MigrationConfig::load(None)?;
//! let pool = PgPoolOptions::new()
//!     .max_connections(*config.get_max_connections())
//!     .connect(config.require_database_url()?)
//!     .await?;
//!
//! let repository = MigrationRepository::from_config(&config);
//! let group = resolve_default_group(repository.base_path())?.require()?;
//! let runner = MigrationRunner::new(
//!     repository,
//!     Arc::new(PostgresStateStore::new(pool.clone(), config.get_migrations_table().clone())),
//!     Arc::new(PostgresExecutor::new(pool)),
//! );
//!
//! let result = runner.run(&group, Direction::Up, None, false).await?;
//! println!("applied {}", result.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod migrations;

pub use config::*;
pub use error::*;
pub use migrations::*;

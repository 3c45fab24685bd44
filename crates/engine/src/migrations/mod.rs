//! Migration System
//!
//! Grouped, time-ordered migrations: discovery on disk, generation of new
//! files, applied-state tracking and forward/reverse execution.

pub mod definitions;
pub mod executor;
pub mod generator;
pub mod identifier;
pub mod lock;
pub mod reporter;
pub mod resolver;
pub mod runner;
pub mod scanner;
pub mod state;

pub use definitions::*;
pub use executor::{PostgresExecutor, ScriptExecutor};
pub use generator::{slugify, MigrationGenerator, MigrationTemplate};
pub use identifier::{compare, Identifier, NotAMigration};
pub use lock::{MigrationLock, NoopLock, PostgresAdvisoryLock};
pub use resolver::{next_group_prefix, resolve_default_group, ResolvedGroup};
pub use runner::MigrationRunner;
pub use scanner::{parse_sections, MigrationRepository};
pub use state::{MemoryStateStore, PostgresStateStore, StateStore};

//! Migration configuration and builder
//!
//! Values are layered: built-in defaults, then an optional `strata.toml`,
//! then environment variables. The CLI applies its flags last.

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrationError, MigrationResult};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Configuration for the migration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct MigrationConfig {
    /// Base directory holding the migration groups
    #[builder(default = "PathBuf::from(\"migrations\")", getter)]
    pub migrations_dir: PathBuf,

    /// Table tracking applied migrations
    #[builder(default = "\"strata_migrations\".to_string()", getter)]
    pub migrations_table: String,

    /// Extension of migration files, without the dot
    #[builder(default = "\"sql\".to_string()", getter)]
    pub extension: String,

    /// Connection string of the target database
    #[builder(default, getter)]
    pub database_url: Option<String>,

    /// Upper bound of pooled connections
    #[builder(default = "5", getter)]
    pub max_connections: u32,

    /// Run each script inside its own transaction
    #[builder(default = "true", getter)]
    pub transactional: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "strata_migrations".to_string(),
            extension: "sql".to_string(),
            database_url: None,
            max_connections: 5,
            transactional: true,
        }
    }
}

/// On-disk layout of `strata.toml`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    migrations: MigrationsSection,
    #[serde(default)]
    database: DatabaseSection,
}

#[derive(Debug, Default, Deserialize)]
struct MigrationsSection {
    dir: Option<PathBuf>,
    table: Option<String>,
    extension: Option<String>,
    transactional: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
}

impl MigrationConfig {
    /// Load defaults, the config file and the environment, then validate.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> MigrationResult<Self> {
        let mut config = Self::default();

        match path {
            Some(path) => config.merge_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    config.merge_file(default_path)?;
                }
            }
        }

        config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Override the migrations base directory
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Override the database connection string
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Overlay values from a TOML file
    pub fn merge_file(&mut self, path: &Path) -> MigrationResult<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrationError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.merge_toml(&content)
    }

    fn merge_toml(&mut self, content: &str) -> MigrationResult<()> {
        let file: FileConfig = toml::from_str(content)?;

        if let Some(dir) = file.migrations.dir {
            self.migrations_dir = dir;
        }
        if let Some(table) = file.migrations.table {
            self.migrations_table = table;
        }
        if let Some(extension) = file.migrations.extension {
            self.extension = extension;
        }
        if let Some(transactional) = file.migrations.transactional {
            self.transactional = transactional;
        }
        if let Some(url) = file.database.url {
            self.database_url = Some(url);
        }
        if let Some(max) = file.database.max_connections {
            self.max_connections = max;
        }
        Ok(())
    }

    /// Overlay `DATABASE_URL` and the `STRATA_*` variables
    pub fn merge_env(&mut self) {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Ok(dir) = env::var("STRATA_MIGRATIONS_DIR") {
            self.migrations_dir = PathBuf::from(dir);
        }
        if let Ok(table) = env::var("STRATA_MIGRATIONS_TABLE") {
            self.migrations_table = table;
        }
        if let Ok(extension) = env::var("STRATA_MIGRATION_EXTENSION") {
            self.extension = extension;
        }
    }

    /// Reject values that would produce unsafe SQL or unreadable trees
    pub fn validate(&self) -> MigrationResult<()> {
        if !is_safe_table_name(&self.migrations_table) {
            return Err(MigrationError::Configuration(format!(
                "migrations table '{}' must be a plain (optionally schema-qualified) identifier",
                self.migrations_table
            )));
        }

        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\', '.']) {
            return Err(MigrationError::Configuration(format!(
                "invalid migration file extension '{}'",
                self.extension
            )));
        }

        if self.max_connections == 0 {
            return Err(MigrationError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Extension without any leading dot
    pub fn file_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Database URL, failing when none was configured
    pub fn require_database_url(&self) -> MigrationResult<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            MigrationError::Configuration(
                "no database URL configured; set DATABASE_URL or [database] url".to_string(),
            )
        })
    }
}

fn is_safe_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

//! Migration Generator - creates new migration files and groups
//!
//! Identifiers are strictly time-derived: a same-second collision fails with
//! [`MigrationError::AlreadyExists`] and the caller retries. Existing files
//! are never touched.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use super::definitions::{GroupId, MigrationFile};
use super::identifier::Identifier;
use super::resolver::{next_group_prefix, resolve_default_group};
use super::scanner::{parse_sections, MigrationRepository};
use crate::error::{MigrationError, MigrationResult};

/// Skeleton rendered into new migration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationTemplate {
    /// Header and an UP section
    #[default]
    Standard,
    /// Header, UP and DOWN sections
    Reversible,
}

/// Writes new migrations into a repository
pub struct MigrationGenerator {
    repository: MigrationRepository,
}

impl MigrationGenerator {
    pub fn new(repository: MigrationRepository) -> Self {
        Self { repository }
    }

    /// Create a migration stamped with the current time
    pub fn generate(
        &self,
        group: Option<GroupId>,
        name: &str,
        template: MigrationTemplate,
    ) -> MigrationResult<MigrationFile> {
        self.generate_at(group, name, template, Utc::now())
    }

    /// Create a migration stamped with `now`
    pub fn generate_at(
        &self,
        group: Option<GroupId>,
        name: &str,
        template: MigrationTemplate,
        now: DateTime<Utc>,
    ) -> MigrationResult<MigrationFile> {
        let group = match group {
            Some(group) => group,
            None => resolve_default_group(self.repository.base_path())?.require()?,
        };
        let group_path = self.repository.group_path(&group);
        if !group_path.is_dir() {
            return Err(MigrationError::GroupNotFound(group_path));
        }

        let slug = slugify(name)?;
        let identifier = Identifier::generate(now);
        let filename = format!("{}_{}.{}", identifier, slug, self.repository.extension());
        let path = group_path.join(&filename);

        if self.repository.identifier_in_use(&group, &identifier)? {
            return Err(MigrationError::AlreadyExists(path));
        }

        let content = render_template(name, &group, &identifier, template, now);

        write_new(&path, &content)?;

        tracing::info!(group = %group, file = %filename, "created migration");

        let (up_script, down_script) = parse_sections(&content);
        Ok(MigrationFile {
            group,
            identifier,
            name: slug,
            path,
            up_script,
            down_script,
        })
    }

    /// Create the next group directory, `{NNNN}_{name}`
    pub fn create_group(&self, name: &str) -> MigrationResult<GroupId> {
        let slug = slugify(name)?;
        let prefix = next_group_prefix(self.repository.base_path())?;
        let group = GroupId::new(format!("{}_{}", prefix, slug));

        fs::create_dir_all(self.repository.base_path())?;
        let path = self.repository.group_path(&group);
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MigrationError::AlreadyExists(path))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(group = %group, "created migration group");
        Ok(group)
    }
}

/// Write `content` to a file that must not exist yet.
///
/// A failed write removes the partial file so the identifier stays free.
fn write_new(path: &Path, content: &str) -> MigrationResult<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(MigrationError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = file.write_all(content.as_bytes()).and_then(|_| file.sync_all()) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!(file = %path.display(), "failed to remove partial migration: {}", cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Normalise a human name into a filename slug.
///
/// Lowercases, maps every non-alphanumeric run to a single `_` and trims
/// underscores at both ends.
pub fn slugify(name: &str) -> MigrationResult<String> {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }

    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        return Err(MigrationError::InvalidName(name.to_string()));
    }
    Ok(slug)
}

fn render_template(
    name: &str,
    group: &GroupId,
    identifier: &Identifier,
    template: MigrationTemplate,
    now: DateTime<Utc>,
) -> String {
    let mut content = format!(
        "-- Migration: {}\n\
         -- Group: {}\n\
         -- ID: {}\n\
         -- Created: {}\n\n\
         -- UP\n\
         -- Add your schema changes here\n\n",
        name.trim(),
        group,
        identifier,
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if template == MigrationTemplate::Reversible {
        content.push_str("\n-- DOWN\n-- Add statements reverting the UP section here\n\n");
    }
    content
}

//! Migration Repository Scanner - discovers groups and migration files
//!
//! The filesystem is the source of truth for migration content. A
//! [`MigrationRepository`] is built per run and every listing re-reads the
//! directory tree; nothing is cached between calls.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::definitions::{GroupId, MigrationFile};
use super::identifier::Identifier;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};

/// Read-only view over a migrations base directory
#[derive(Debug, Clone)]
pub struct MigrationRepository {
    base_path: PathBuf,
    extension: String,
}

impl MigrationRepository {
    /// Create a repository over `base_path` for files ending in `.{extension}`
    pub fn new(base_path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            base_path: base_path.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Create a repository from the migration configuration
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.get_migrations_dir().clone(), config.file_extension())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Directory of a group inside the base path
    pub fn group_path(&self, group: &GroupId) -> PathBuf {
        self.base_path.join(group.as_str())
    }

    /// List migration groups in ascending prefix order.
    ///
    /// Directories without a numeric prefix are not groups and are skipped.
    /// A missing base directory has no groups.
    pub fn list_groups(&self) -> MigrationResult<Vec<GroupId>> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match Identifier::parse(&name) {
                Ok(prefix) => groups.push((prefix, GroupId::new(name))),
                Err(skipped) => tracing::debug!("{}", skipped),
            }
        }

        groups.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        Ok(groups.into_iter().map(|(_, group)| group).collect())
    }

    /// List the migrations of a group in ascending identifier order
    pub fn list_migrations(&self, group: &GroupId) -> MigrationResult<Vec<MigrationFile>> {
        let group_path = self.group_path(group);
        let entries = match fs::read_dir(&group_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MigrationError::GroupNotFound(group_path))
            }
            Err(e) => return Err(e.into()),
        };

        let mut migrations = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != self.extension.as_str()) {
                continue;
            }

            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem,
                None => continue,
            };

            let (identifier, name) = match Identifier::split_stem(stem) {
                Ok(parts) => parts,
                Err(skipped) => {
                    tracing::debug!("{}", skipped);
                    continue;
                }
            };

            if let Some(first) = seen.get(identifier.sequence()) {
                let (first, second) = if first <= &path {
                    (first.clone(), path.clone())
                } else {
                    (path.clone(), first.clone())
                };
                return Err(MigrationError::DuplicateIdentifier {
                    group: group.to_string(),
                    identifier: identifier.to_string(),
                    first,
                    second,
                });
            }
            seen.insert(identifier.sequence().to_string(), path.clone());

            let content = fs::read_to_string(&path)?;
            let (up_script, down_script) = parse_sections(&content);

            migrations.push(MigrationFile {
                group: group.clone(),
                identifier,
                name,
                path,
                up_script,
                down_script,
            });
        }

        migrations.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        tracing::debug!(group = %group, count = migrations.len(), "scanned migrations");
        Ok(migrations)
    }

    /// Whether any migration of the group already uses `identifier`
    pub fn identifier_in_use(&self, group: &GroupId, identifier: &Identifier) -> MigrationResult<bool> {
        Ok(self
            .list_migrations(group)?
            .iter()
            .any(|m| m.identifier.same_sequence(identifier)))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Header,
    Up,
    Down,
}

/// Recognise a `-- UP` / `-- DOWN` marker line
fn section_marker(line: &str) -> Option<Section> {
    let comment = line.trim().strip_prefix("--")?.trim().to_lowercase();
    match comment.as_str() {
        "up" | "up migration" => Some(Section::Up),
        "down" | "down migration" => Some(Section::Down),
        _ => None,
    }
}

/// Split file content into UP and DOWN scripts.
///
/// Text before the first marker is header. Content without any marker is
/// entirely the UP script. A blank DOWN section counts as absent.
pub fn parse_sections(content: &str) -> (String, Option<String>) {
    if !content.lines().any(|line| section_marker(line).is_some()) {
        return (content.trim().to_string(), None);
    }

    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut current = Section::Header;

    for line in content.lines() {
        if let Some(section) = section_marker(line) {
            current = section;
            continue;
        }
        match current {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
            Section::Header => {}
        }
    }

    let up_script = up.join("\n").trim().to_string();
    let down_script = down.join("\n").trim().to_string();
    let down_script = if has_statements(&down_script) {
        Some(down_script)
    } else {
        None
    };
    (up_script, down_script)
}

/// True when the script holds more than blank lines and comments
fn has_statements(script: &str) -> bool {
    script.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

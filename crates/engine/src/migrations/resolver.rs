//! Group Resolver - picks the default migration group
//!
//! The most recently established group (highest numeric prefix) is the
//! default target for new migrations and ad-hoc runs.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::definitions::GroupId;
use super::identifier::Identifier;
use crate::error::{MigrationError, MigrationResult};

/// Outcome of default-group resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedGroup {
    Group(GroupId),
    /// No group directory exists; the caller must ask for one explicitly
    Unknown,
}

impl ResolvedGroup {
    pub fn group(&self) -> Option<&GroupId> {
        match self {
            ResolvedGroup::Group(group) => Some(group),
            ResolvedGroup::Unknown => None,
        }
    }

    /// Turn `Unknown` into [`MigrationError::UnresolvedGroup`]
    pub fn require(self) -> MigrationResult<GroupId> {
        match self {
            ResolvedGroup::Group(group) => Ok(group),
            ResolvedGroup::Unknown => Err(MigrationError::UnresolvedGroup),
        }
    }
}

impl fmt::Display for ResolvedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedGroup::Group(group) => write!(f, "{}", group),
            ResolvedGroup::Unknown => f.write_str("unknown"),
        }
    }
}

/// Names of every subdirectory of `base_path`; missing base means none
fn subdirectories(base_path: &Path) -> MigrationResult<Vec<String>> {
    let entries = match fs::read_dir(base_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(names)
}

/// Prefix of a directory name, with unparseable prefixes ranking lowest
fn prefix_value(name: &str) -> u64 {
    Identifier::parse(name).map(|id| id.value()).unwrap_or(0)
}

/// Select the subdirectory with the highest numeric prefix
pub fn resolve_default_group(base_path: &Path) -> MigrationResult<ResolvedGroup> {
    let resolved = subdirectories(base_path)?
        .into_iter()
        .max_by(|a, b| {
            prefix_value(a)
                .cmp(&prefix_value(b))
                .then_with(|| a.cmp(b))
        })
        .map(|name| ResolvedGroup::Group(GroupId::new(name)))
        .unwrap_or(ResolvedGroup::Unknown);

    tracing::debug!(base = %base_path.display(), group = %resolved, "resolved default group");
    Ok(resolved)
}

/// Prefix the next created group should carry, zero padded to four digits
pub fn next_group_prefix(base_path: &Path) -> MigrationResult<String> {
    let highest = subdirectories(base_path)?
        .iter()
        .map(|name| prefix_value(name))
        .max()
        .unwrap_or(0);
    Ok(format!("{:04}", highest.saturating_add(1)))
}

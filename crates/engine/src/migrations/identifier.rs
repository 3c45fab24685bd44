//! Identifier Scheme - how migration and group names are keyed and ordered
//!
//! An identifier is the leading run of ASCII digits of a file or directory
//! name. Generated identifiers are fixed-width UTC timestamps
//! (`YYYYMMDDHHMMSS`), so lexicographic and numeric order agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Timestamp layout used for generated identifiers
pub const IDENTIFIER_FORMAT: &str = "%Y%m%d%H%M%S";

/// Width of a generated identifier
pub const IDENTIFIER_WIDTH: usize = 14;

/// Returned when a name carries no numeric prefix.
///
/// Scanning filters these entries out; they are never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a migration")]
pub struct NotAMigration(pub String);

/// Sortable migration (or group) sequence key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Extract the leading digit run of `name`
    pub fn parse(name: &str) -> Result<Self, NotAMigration> {
        let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(NotAMigration(name.to_string()));
        }
        Ok(Self(digits))
    }

    /// Derive an identifier from a wall-clock instant
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self(now.format(IDENTIFIER_FORMAT).to_string())
    }

    /// Split a file stem of the form `{identifier}_{name}`.
    ///
    /// A stem made only of digits yields an empty name.
    pub fn split_stem(stem: &str) -> Result<(Self, String), NotAMigration> {
        let identifier = Self::parse(stem)?;
        let rest = &stem[identifier.0.len()..];
        let name = rest.strip_prefix('_').unwrap_or(rest);
        Ok((identifier, name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits with leading zeros stripped; `0002` and `2` share a sequence
    pub fn sequence(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }

    /// Whether both identifiers denote the same position in a group
    pub fn same_sequence(&self, other: &Identifier) -> bool {
        self.sequence() == other.sequence()
    }

    /// Numeric value of the identifier, saturating on overflow
    pub fn value(&self) -> u64 {
        self.0.parse().unwrap_or(u64::MAX)
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.sequence(), other.sequence());
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            .then_with(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compare two identifiers in application order
pub fn compare(a: &Identifier, b: &Identifier) -> Ordering {
    a.cmp(b)
}

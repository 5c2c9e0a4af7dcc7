//! Identifiers for projects, tasks, hold reasons and template rows
//!
//! ID Format:
//! - Project IDs: lowercase slug (e.g., `lot-12-smith-st`)
//! - Task IDs: positive integer, unique within a project (e.g., `42`)
//! - Hold reason IDs: positive integer, unique within a workspace
//! - Template row IDs: positive integer, unique within a workspace
//!
//! All IDs are parsed at the boundary and serialize as plain strings or
//! numbers, so nothing inside the engine carries an unchecked string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid project ID: expected a lowercase slug of [a-z0-9-_], got '{0}'")]
    InvalidProjectId(String),

    #[error("Invalid task ID: expected a positive integer, got '{0}'")]
    InvalidTaskId(String),

    #[error("Invalid hold reason ID: expected a positive integer, got '{0}'")]
    InvalidHoldReasonId(String),

    #[error("Invalid template row ID: expected a positive integer, got '{0}'")]
    InvalidTemplateRowId(String),
}

/// Project ID, a filesystem-safe slug
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Returns the slug
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = !s.is_empty()
            && s.len() <= 64
            && !s.starts_with('-')
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

        if !valid {
            return Err(IdError::InvalidProjectId(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ProjectId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// Parses a positive integer, tolerating an optional single-letter prefix
/// such as `T12` or `#12` that people paste from the UI.
fn parse_positive(s: &str, prefix: char) -> Option<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix(prefix)
        .or_else(|| s.strip_prefix(prefix.to_ascii_lowercase()))
        .or_else(|| s.strip_prefix('#'))
        .unwrap_or(s);

    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:literal, $err:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates an ID from its raw value
            pub fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw value
            pub fn get(self) -> $inner {
                self.0
            }

            /// Returns the next ID in sequence
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_positive(s, $prefix)
                    .and_then(|n| <$inner>::try_from(n).ok())
                    .map(Self)
                    .ok_or_else(|| IdError::$err(s.trim().to_string()))
            }
        }
    };
}

numeric_id!(
    /// Task ID, unique within one project
    TaskId,
    u64,
    'T',
    InvalidTaskId
);

numeric_id!(
    /// Hold reason ID, unique within a workspace
    HoldReasonId,
    u32,
    'H',
    InvalidHoldReasonId
);

numeric_id!(
    /// Template row ID, unique within a workspace
    TemplateRowId,
    u32,
    'R',
    InvalidTemplateRowId
);

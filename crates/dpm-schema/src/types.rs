//! Package name and version newtypes.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Errors produced when a package name cannot be used as a store key or
/// script name.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty after trimming.
    #[error("Package name is empty")]
    Empty,

    /// The name contains a character outside `[a-z0-9._-]`.
    #[error("Invalid character '{ch}' in package name '{name}'")]
    InvalidChar {
        /// The offending name.
        name: String,
        /// The first character that is not allowed.
        ch: char,
    },
}

/// A normalized package name.
///
/// Names double as store key segments and as the deployed script name, so
/// only lowercase ASCII letters, digits, `.`, `_` and `-` are accepted by
/// [`PackageName::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, normalizing the input to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Create a package name and check that it is usable as a key segment.
    ///
    /// # Errors
    ///
    /// Returns [`NameError::Empty`] for blank input and
    /// [`NameError::InvalidChar`] for scoped or otherwise unsupported names.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let name = Self::new(name);
        if name.0.is_empty() {
            return Err(NameError::Empty);
        }
        if let Some(ch) = name
            .0
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')))
        {
            return Err(NameError::InvalidChar { name: name.0, ch });
        }
        Ok(name)
    }

    /// Return the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// A semantic version string as stored in a version list.
///
/// The raw string is kept as-is so that records round-trip untouched. Ordering
/// is by [`Version::semver`], with the raw string breaking ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.semver(), other.semver()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the version, tolerating a leading `v` or `=`.
    ///
    /// Returns `None` for strings that are not semantic versions.
    pub fn semver(&self) -> Option<semver::Version> {
        let raw = self.0.trim();
        let raw = raw.strip_prefix('=').unwrap_or(raw);
        let raw = raw.strip_prefix(['v', 'V']).unwrap_or(raw);
        semver::Version::parse(raw).ok()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

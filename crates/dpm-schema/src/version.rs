//! Version lists and range resolution.
//!
//! Specifiers follow the npm range dialect, which differs from Cargo's in a
//! few places that matter here: a bare `1.2.3` is an exact match rather than a
//! caret requirement, a bare `1.2` means `1.2.x`, comparators are separated by
//! whitespace, and `||` joins alternatives. [`Specifier::parse`] rewrites each
//! alternative into a [`semver::VersionReq`] with the same meaning.

use crate::types::Version;
use semver::VersionReq;
use serde::{Deserialize, Serialize};

/// Alias accepted in place of the `*` wildcard.
pub const LATEST: &str = "latest";

const OPERATORS: [&str; 8] = [">=", "<=", "~>", ">", "<", "=", "^", "~"];

/// Errors produced while parsing a version specifier.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Invalid version specifier '{spec}': {reason}")]
pub struct RangeError {
    /// The specifier as given.
    pub spec: String,
    /// What made it unparseable.
    pub reason: String,
}

/// Ordered list of published versions, oldest first.
///
/// Serialized as a bare JSON array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionList(Vec<Version>);

impl VersionList {
    /// Wrap an existing sequence of versions.
    pub fn new(versions: Vec<Version>) -> Self {
        Self(versions)
    }

    /// Whether `version` has already been published.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().any(|v| v == version)
    }

    /// A new list with `version` appended after the existing entries.
    pub fn appended(&self, version: Version) -> Self {
        let mut versions = self.0.clone();
        versions.push(version);
        Self(versions)
    }

    /// Number of published versions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in publish order.
    pub fn iter(&self) -> std::slice::Iter<'_, Version> {
        self.0.iter()
    }

    /// Highest version satisfying `spec`, ignoring entries that are not
    /// valid semantic versions.
    pub fn max_satisfying(&self, spec: &Specifier) -> Option<&Version> {
        self.0
            .iter()
            .filter_map(|v| v.semver().map(|parsed| (v, parsed)))
            .filter(|(_, parsed)| spec.matches(parsed))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(v, _)| v)
    }
}

impl<'a> IntoIterator for &'a VersionList {
    type Item = &'a Version;
    type IntoIter = std::slice::Iter<'a, Version>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A parsed version range such as `^1.2.0`, `>=1 <3 || 4.x` or `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Specifier {
    /// The wildcard specifier, matching every release.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            alternatives: vec![VersionReq::STAR],
        }
    }

    /// Parse a specifier; `latest` is treated as `*`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] if any alternative contains a malformed version
    /// or a dangling operator.
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let trimmed = input.trim();
        if trimmed == LATEST {
            return Ok(Self::any());
        }

        let alternatives = trimmed
            .split("||")
            .map(|set| translate_set(set.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| RangeError {
                spec: input.to_string(),
                reason,
            })?;

        Ok(Self {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    /// Whether `version` falls inside any alternative of this range.
    pub fn matches(&self, version: &semver::Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The specifier as written (with `latest` shown as `*`).
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for Specifier {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Translate one whitespace-separated comparator set.
fn translate_set(set: &str) -> Result<VersionReq, String> {
    let comparators = if let Some((lo, hi)) = set.split_once(" - ") {
        translate_hyphen(lo.trim(), hi.trim())?
    } else {
        translate_comparators(set)?
    };

    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }
    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

fn translate_hyphen(lo: &str, hi: &str) -> Result<Vec<String>, String> {
    let lo = Partial::parse(lo)?;
    let hi = Partial::parse(hi)?;
    let mut out = Vec::new();
    if !lo.is_wildcard() {
        out.push(format!(">={}", lo.render()));
    }
    // `<=1.2` already means `<1.3.0`, which is what a partial upper bound wants.
    if !hi.is_wildcard() {
        out.push(format!("<={}", hi.render()));
    }
    Ok(out)
}

fn translate_comparators(set: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in set.split_whitespace() {
        if OPERATORS.contains(&token) {
            if pending_op.replace(token).is_some() {
                return Err(format!("unexpected operator '{token}'"));
            }
            continue;
        }

        let (op, rest) = match pending_op.take() {
            Some(op) => (op, token),
            None => split_operator(token),
        };
        if let Some(comparator) = translate_comparator(op, rest)? {
            out.push(comparator);
        }
    }

    if let Some(op) = pending_op {
        return Err(format!("operator '{op}' is missing a version"));
    }
    Ok(out)
}

fn split_operator(token: &str) -> (&str, &str) {
    OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token))
}

fn translate_comparator(op: &str, version: &str) -> Result<Option<String>, String> {
    let partial = Partial::parse(version)?;
    if partial.is_wildcard() {
        return Ok(None);
    }

    let rendered = partial.render();
    let comparator = match op {
        "" if partial.is_full() => format!("={rendered}"),
        "" => format!("{rendered}.*"),
        "~>" => format!("~{rendered}"),
        other => format!("{other}{rendered}"),
    };
    Ok(Some(comparator))
}

/// A possibly incomplete version such as `1`, `1.2.x` or `1.2.3-rc.1`.
#[derive(Debug, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: String,
}

impl Partial {
    fn parse(input: &str) -> Result<Self, String> {
        let input = input.strip_prefix(['v', 'V']).unwrap_or(input);
        if input.is_empty() {
            return Ok(Self::default());
        }

        let (core, _build) = input.split_once('+').unwrap_or((input, ""));
        let (core, pre) = core.split_once('-').unwrap_or((core, ""));

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(format!("'{input}' is not a version"));
        }

        let mut numbers = [None; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = match *part {
                "x" | "X" | "*" => None,
                digits => Some(
                    digits
                        .parse::<u64>()
                        .map_err(|_| format!("'{input}' is not a version"))?,
                ),
            };
        }
        // Anything after a wildcard component is a wildcard too.
        if numbers[0].is_none() {
            numbers[1] = None;
        }
        if numbers[1].is_none() {
            numbers[2] = None;
        }

        let partial = Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre: pre.to_string(),
        };
        if !partial.pre.is_empty() && !partial.is_full() {
            return Err(format!("pre-release on incomplete version '{input}'"));
        }
        Ok(partial)
    }

    fn is_wildcard(&self) -> bool {
        self.major.is_none()
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for n in [self.major, self.minor, self.patch].into_iter().map_while(|n| n) {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&n.to_string());
        }
        if !self.pre.is_empty() {
            out.push('-');
            out.push_str(&self.pre);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(versions: &[&str]) -> VersionList {
        VersionList::new(versions.iter().map(|v| Version::new(v)).collect())
    }

    fn resolve<'a>(versions: &'a VersionList, spec: &str) -> Option<&'a str> {
        let spec = Specifier::parse(spec).unwrap();
        versions.max_satisfying(&spec).map(Version::as_str)
    }

    #[test]
    fn test_caret_picks_highest_compatible() {
        let v = list(&["1.0.0", "1.2.0", "2.0.0"]);
        assert_eq!(resolve(&v, "^1.0.0"), Some("1.2.0"));
    }

    #[test]
    fn test_latest_is_wildcard() {
        let v = list(&["0.9.0", "1.0.0"]);
        assert_eq!(resolve(&v, "latest"), Some("1.0.0"));
        assert_eq!(resolve(&v, "*"), Some("1.0.0"));
        assert_eq!(Specifier::parse("latest").unwrap(), Specifier::any());
    }

    #[test]
    fn test_no_match_returns_none() {
        let v = list(&["1.0.0"]);
        assert_eq!(resolve(&v, "^5.0.0"), None);
        assert_eq!(resolve(&VersionList::default(), "*"), None);
    }

    #[test]
    fn test_bare_version_is_exact() {
        let v = list(&["1.0.0", "1.0.5", "1.4.0"]);
        assert_eq!(resolve(&v, "1.0.0"), Some("1.0.0"));
        assert_eq!(resolve(&v, "=1.0.5"), Some("1.0.5"));
        assert_eq!(resolve(&v, "v1.4.0"), Some("1.4.0"));
    }

    #[test]
    fn test_partial_versions_are_wildcards() {
        let v = list(&["1.2.0", "1.2.9", "1.3.0", "2.0.0"]);
        assert_eq!(resolve(&v, "1.2"), Some("1.2.9"));
        assert_eq!(resolve(&v, "1.x"), Some("1.3.0"));
        assert_eq!(resolve(&v, "1"), Some("1.3.0"));
        assert_eq!(resolve(&v, "~1.2"), Some("1.2.9"));
    }

    #[test]
    fn test_comparator_sets_and_unions() {
        let v = list(&["0.5.0", "1.0.0", "1.5.0", "2.1.0", "3.0.0"]);
        assert_eq!(resolve(&v, ">=1.0.0 <2.0.0"), Some("1.5.0"));
        assert_eq!(resolve(&v, ">= 1.0.0 < 2.0.0"), Some("1.5.0"));
        assert_eq!(resolve(&v, "<1.0.0 || ^2.0.0"), Some("2.1.0"));
        assert_eq!(resolve(&v, "1.0.0 - 2.0"), Some("1.5.0"));
        assert_eq!(resolve(&v, "1.0.0 - 2"), Some("2.1.0"));
    }

    #[test]
    fn test_prereleases_need_explicit_opt_in() {
        let v = list(&["1.0.0", "1.1.0-beta.1"]);
        assert_eq!(resolve(&v, "*"), Some("1.0.0"));
        assert_eq!(resolve(&v, "^1.0.0"), Some("1.0.0"));
        assert_eq!(resolve(&v, ">=1.1.0-beta.0"), Some("1.1.0-beta.1"));
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let v = list(&["1.0.0", "garbage", "1.1"]);
        assert_eq!(resolve(&v, "*"), Some("1.0.0"));
    }

    #[test]
    fn test_malformed_specifiers_are_rejected() {
        assert!(Specifier::parse("banana").is_err());
        assert!(Specifier::parse(">=").is_err());
        assert!(Specifier::parse("1.2-beta").is_err());
        assert!(Specifier::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_list_appends_in_publish_order() {
        let v = list(&["1.0.0"]);
        let next = v.appended(Version::new("0.9.1"));
        assert!(next.contains(&Version::new("0.9.1")));
        assert!(!v.contains(&Version::new("0.9.1")));
        assert_eq!(
            serde_json::to_string(&next).unwrap(),
            r#"["1.0.0","0.9.1"]"#
        );
    }
}

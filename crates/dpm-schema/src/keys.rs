//! Key naming inside the shared namespace.
//!
//! Every record lives under a key prefixed with the namespace title and the
//! package name:
//!
//! ```text
//! {namespace}-{package}-{versions_key}   JSON array of version strings
//! {namespace}-{package}-{version}        tarball bytes
//! ```

use crate::types::{PackageName, Version};
use crate::{DEFAULT_NAMESPACE, DEFAULT_VERSIONS_KEY};

/// Naming convention shared by the publisher and the lookup handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    /// Namespace title, also used as the first key segment.
    pub namespace: String,
    /// Suffix of the version list key.
    pub versions_suffix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyLayout {
    /// Layout for the given namespace title with the default versions suffix.
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            versions_suffix: DEFAULT_VERSIONS_KEY.to_string(),
        }
    }

    /// Key of the version list record for `package`.
    pub fn versions_key(&self, package: &PackageName) -> String {
        format!("{}-{package}-{}", self.namespace, self.versions_suffix)
    }

    /// Key of the tarball record for `package` at `version`.
    pub fn tarball_key(&self, package: &PackageName, version: &Version) -> String {
        format!("{}-{package}-{version}", self.namespace)
    }
}

/// Attachment filename used when serving a tarball.
pub fn tarball_filename(package: &PackageName, version: &Version) -> String {
    format!("{package}-v{version}.tgz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = KeyLayout::default();
        let pkg = PackageName::new("left-pad");
        assert_eq!(layout.versions_key(&pkg), "dpm-left-pad-versions");
        assert_eq!(
            layout.tarball_key(&pkg, &Version::new("1.3.0")),
            "dpm-left-pad-1.3.0"
        );
    }

    #[test]
    fn test_custom_namespace() {
        let layout = KeyLayout::new("staging");
        let pkg = PackageName::new("ui-kit");
        assert_eq!(layout.versions_key(&pkg), "staging-ui-kit-versions");
        assert_eq!(
            tarball_filename(&pkg, &Version::new("0.4.2")),
            "ui-kit-v0.4.2.tgz"
        );
    }
}

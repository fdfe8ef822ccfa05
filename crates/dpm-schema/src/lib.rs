//! Shared types and record layout for dpm.
//!
//! Both halves of the system agree on these definitions: the publisher writes
//! records using [`KeyLayout`] and [`VersionList`], and the lookup handler reads
//! them back and resolves requests with [`Specifier`].

pub mod keys;
pub mod types;
pub mod version;

// Re-exports
pub use keys::KeyLayout;
pub use types::*;
pub use version::{RangeError, Specifier, VersionList};

/// Default title of the key-value namespace shared by all published packages.
pub const DEFAULT_NAMESPACE: &str = "dpm";

/// Default suffix of the key holding a package's version list.
pub const DEFAULT_VERSIONS_KEY: &str = "versions";

/// Name under which the namespace is bound inside the lookup script.
pub const KV_BINDING: &str = "dpm";

/// Content type of uploaded and served tarballs.
pub const TARBALL_CONTENT_TYPE: &str = "application/tar+gzip";

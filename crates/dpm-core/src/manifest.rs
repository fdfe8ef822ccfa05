//! Reads the package identity from `package.json`.

use crate::types::{NameError, PackageName, Version};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// File holding the package name and version.
pub const MANIFEST_FILE: &str = "package.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse package.json")]
    Parse(#[from] serde_json::Error),

    #[error("package.json is missing the \"{0}\" field")]
    MissingField(&'static str),

    #[error("Invalid package name")]
    Name(#[from] NameError),

    #[error("Invalid version '{version}'")]
    Version {
        version: String,
        #[source]
        source: semver::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
}

/// Name and version of the package being published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: PackageName,
    pub version: Version,
}

impl PackageManifest {
    /// Load `package.json` from `folder`.
    pub async fn load(folder: &Path) -> Result<Self, ManifestError> {
        let path = folder.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| ManifestError::Read { path, source })?;
        Self::parse(&content)
    }

    /// Parse manifest JSON. The version must be a full semantic version.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(content)?;

        let name = raw.name.ok_or(ManifestError::MissingField("name"))?;
        let version = raw.version.ok_or(ManifestError::MissingField("version"))?;

        let name = PackageName::parse(&name)?;
        semver::Version::parse(version.trim()).map_err(|source| ManifestError::Version {
            version: version.clone(),
            source,
        })?;

        Ok(Self {
            name,
            version: Version::new(version.trim()),
        })
    }
}

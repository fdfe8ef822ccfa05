//! Serves published packages over HTTP.
//!
//! This is the request handler the deployed lookup script implements at the
//! edge, written against [`StoreClient`] so it can run anywhere the store is
//! reachable. Every request is independent and read-only.
//!
//! - `/` and `/versions` return `{"name": ..., "versions": [...]}`.
//! - Any other path is a version range; the highest listed version inside it
//!   is streamed as a tarball.
//! - Unresolvable ranges and missing tarballs produce a plain-text
//!   `Version not found` body with status 200.

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::sync::Arc;

use crate::platform::{StoreClient, StoreError};
use crate::types::{KeyLayout, PackageName, Specifier, TARBALL_CONTENT_TYPE, Version, VersionList};

/// Content type of the not-found bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

const JSON_CONTENT_TYPE: &str = "application/json";
const VERSIONS_PATH: &str = "versions";

/// What a request path asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// The package's version list.
    Versions,
    /// The tarball of the best version matching a range.
    Resolve(String),
}

impl LookupRequest {
    /// Drop the leading `/` and percent-decode the rest.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let decoded = percent_decode_str(trimmed).decode_utf8_lossy();
        match decoded.as_ref() {
            "" | VERSIONS_PATH => Self::Versions,
            specifier => Self::Resolve(specifier.to_string()),
        }
    }
}

/// Response to a lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResponse {
    Versions {
        name: PackageName,
        versions: VersionList,
    },
    /// No listed version satisfies the range.
    NoMatch,
    /// A version was selected but its tarball record is absent.
    MissingTarball(Version),
    Tarball {
        filename: String,
        version: Version,
        body: Bytes,
    },
}

impl LookupResponse {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Versions { .. } => JSON_CONTENT_TYPE,
            Self::NoMatch | Self::MissingTarball(_) => TEXT_CONTENT_TYPE,
            Self::Tarball { .. } => TARBALL_CONTENT_TYPE,
        }
    }

    /// `Content-Disposition` header value, set for tarballs only.
    pub fn content_disposition(&self) -> Option<String> {
        match self {
            Self::Tarball { filename, .. } => Some(format!("attachment; filename=\"{filename}\"")),
            _ => None,
        }
    }

    pub fn into_body(self) -> Bytes {
        match self {
            Self::Versions { name, versions } => {
                serde_json::json!({ "name": name, "versions": versions })
                    .to_string()
                    .into()
            }
            Self::NoMatch => Bytes::from_static(b"Version not found"),
            Self::MissingTarball(version) => format!("Version not found {version}").into(),
            Self::Tarball { body, .. } => body,
        }
    }
}

/// Answers lookup requests for one package in one namespace.
#[derive(Clone)]
pub struct LookupHandler {
    store: Arc<dyn StoreClient>,
    namespace_id: String,
    package: PackageName,
    layout: KeyLayout,
}

impl LookupHandler {
    pub fn new(
        store: Arc<dyn StoreClient>,
        namespace_id: impl Into<String>,
        package: PackageName,
        layout: KeyLayout,
    ) -> Self {
        Self {
            store,
            namespace_id: namespace_id.into(),
            package,
            layout,
        }
    }

    pub fn package(&self) -> &PackageName {
        &self.package
    }

    /// Handle a request for the URL path `path`.
    pub async fn handle(&self, path: &str) -> Result<LookupResponse, StoreError> {
        let request = LookupRequest::from_path(path);
        tracing::debug!(package = %self.package, ?request, "lookup");

        let versions = self.versions().await?;
        let specifier = match request {
            LookupRequest::Versions => {
                return Ok(LookupResponse::Versions {
                    name: self.package.clone(),
                    versions,
                });
            }
            LookupRequest::Resolve(specifier) => specifier,
        };

        let Some(version) = resolve(&versions, &specifier) else {
            return Ok(LookupResponse::NoMatch);
        };

        let key = self.layout.tarball_key(&self.package, &version);
        match self.store.get_value(&self.namespace_id, &key).await? {
            Some(body) => Ok(LookupResponse::Tarball {
                filename: dpm_schema::keys::tarball_filename(&self.package, &version),
                version,
                body,
            }),
            None => {
                tracing::warn!(key = %key, "listed version has no tarball");
                Ok(LookupResponse::MissingTarball(version))
            }
        }
    }

    /// The package's versions record; a missing record is an empty list.
    pub async fn versions(&self) -> Result<VersionList, StoreError> {
        let key = self.layout.versions_key(&self.package);
        match self.store.get_value(&self.namespace_id, &key).await? {
            Some(data) => serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
                operation: "Reading versions",
                source,
            }),
            None => Ok(VersionList::default()),
        }
    }
}

/// Highest listed version inside `specifier`. A range that does not parse
/// matches nothing.
pub fn resolve(versions: &VersionList, specifier: &str) -> Option<Version> {
    let specifier = match Specifier::parse(specifier) {
        Ok(specifier) => specifier,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable range");
            return None;
        }
    };
    versions.max_satisfying(&specifier).cloned()
}

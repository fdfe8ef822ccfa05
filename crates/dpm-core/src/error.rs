//! Errors raised while publishing a package

use crate::manifest::ManifestError;
use crate::pack::PackError;
use crate::platform::StoreError;
use crate::types::{PackageName, Version};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Version {version} of {name} is already published")]
    DuplicateVersion { name: PackageName, version: Version },

    #[error("{step} failed")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Invalid versions record {key}")]
    VersionsRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Packaging failed")]
    Pack(#[from] PackError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Render `err` and all of its causes on one line, outermost first.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ApiError;

    fn store_failure() -> PublishError {
        PublishError::Store {
            step: "Uploading tarball",
            source: StoreError::Api {
                operation: "Writing value",
                errors: vec![ApiError {
                    code: 10000,
                    message: "Authentication error".to_string(),
                }],
            },
        }
    }

    #[test]
    fn test_display_leaves_cause_to_source() {
        let err = store_failure();
        assert_eq!(err.to_string(), "Uploading tarball failed");
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(
            cause.to_string(),
            "Writing value rejected: [10000] Authentication error"
        );
    }

    #[test]
    fn test_error_chain_names_each_cause_once() {
        let chain = error_chain(&store_failure());
        assert_eq!(
            chain,
            "Uploading tarball failed: Writing value rejected: [10000] Authentication error"
        );

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PublishError::Pack(PackError::Io(io));
        assert_eq!(
            error_chain(&err),
            "Packaging failed: IO error while packaging: gone"
        );
    }
}

//! Credentials and endpoint settings.
//!
//! Credentials come from `CF_ID`, `CF_EMAIL` and `CF_KEY`. A `.dpmrc` file in
//! the working directory may provide them in dotenv format; variables already
//! present in the environment take precedence.

use crate::types::KeyLayout;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Base URL of the platform's v4 REST API.
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Name of the per-project dotenv file.
pub const RC_FILE: &str = ".dpmrc";

const ACCOUNT_ID_VAR: &str = "CF_ID";
const EMAIL_VAR: &str = "CF_EMAIL";
const API_KEY_VAR: &str = "CF_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing credentials: set {} (or add them to .dpmrc)", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("Failed to load {path}")]
    RcFile {
        path: String,
        #[source]
        source: dotenv::Error,
    },
}

/// Account credentials for the platform API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: String,
    pub email: String,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    ///
    /// Blank values count as missing. Every missing variable is named in the
    /// error, not just the first.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let account_id = read(ACCOUNT_ID_VAR);
        let email = read(EMAIL_VAR);
        let api_key = read(API_KEY_VAR);

        match (account_id, email, api_key) {
            (Some(account_id), Some(email), Some(api_key)) => Ok(Self {
                account_id,
                email,
                api_key,
            }),
            (account_id, email, api_key) => {
                let missing = [
                    (ACCOUNT_ID_VAR, account_id.is_none()),
                    (EMAIL_VAR, email.is_none()),
                    (API_KEY_VAR, api_key.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                Err(ConfigError::MissingCredentials(missing))
            }
        }
    }
}

/// Load `.dpmrc` from `dir` into the process environment.
///
/// Returns `Ok(false)` when the file does not exist.
pub fn load_rc_file(dir: &Path) -> Result<bool, ConfigError> {
    let path = dir.join(RC_FILE);
    if !path.is_file() {
        return Ok(false);
    }

    dotenv::from_path(&path).map_err(|source| ConfigError::RcFile {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded rc file");
    Ok(true)
}

/// Endpoint and record layout used by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API base URL without the `/accounts/...` suffix.
    pub api_url: String,
    /// Key naming inside the namespace.
    pub layout: KeyLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            layout: KeyLayout::default(),
        }
    }
}

impl Settings {
    pub fn new(api_url: &str, namespace: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            layout: KeyLayout::new(namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_credentials_complete() {
        let creds = Credentials::from_lookup(lookup(&[
            ("CF_ID", "acc"),
            ("CF_EMAIL", "dev@example.com"),
            ("CF_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(creds.account_id, "acc");
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_credentials_report_every_missing_var() {
        let err = Credentials::from_lookup(lookup(&[("CF_EMAIL", "dev@example.com"), ("CF_KEY", " ")]))
            .unwrap_err();
        match err {
            ConfigError::MissingCredentials(missing) => assert_eq!(missing, ["CF_ID", "CF_KEY"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rc_file_missing_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!load_rc_file(dir.path()).unwrap());
    }

    #[test]
    fn test_rc_file_populates_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RC_FILE), "DPM_RC_TEST_VALUE=from-rc\n").unwrap();
        assert!(load_rc_file(dir.path()).unwrap());
        assert_eq!(std::env::var("DPM_RC_TEST_VALUE").unwrap(), "from-rc");
    }

    #[test]
    fn test_settings_trim_trailing_slash() {
        let settings = Settings::new("http://127.0.0.1:1234/", "staging");
        assert_eq!(settings.api_url, "http://127.0.0.1:1234");
        assert_eq!(settings.layout.namespace, "staging");
    }
}

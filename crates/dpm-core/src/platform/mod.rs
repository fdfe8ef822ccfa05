//! Seams to the edge platform.
//!
//! [`StoreClient`] covers the key-value namespace and [`ScriptDeployer`]
//! covers script hosting. The publish pipeline and the lookup handler only
//! talk to these traits; [`cloudflare::CloudflareClient`] implements both over
//! HTTP and [`memory::MemoryPlatform`] implements both in process.

pub mod cloudflare;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::bundle::LookupScript;

/// Store error code meaning the requested key does not exist.
pub const KEY_NOT_FOUND: u32 = 10009;

/// One error record returned by the platform API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn join_errors(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{operation} rejected: {}", join_errors(.errors))]
    Api {
        operation: &'static str,
        errors: Vec<ApiError>,
    },

    #[error("{operation} failed with HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response to {operation}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read value from disk")]
    Io(#[from] std::io::Error),
}

/// A key-value namespace as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    pub title: String,
}

/// Body of a value written to the store.
#[derive(Debug, Clone)]
pub enum ValueBody {
    /// In-memory bytes (version lists).
    Bytes(Bytes),
    /// A file streamed from disk (tarballs).
    File(PathBuf),
}

impl From<Vec<u8>> for ValueBody {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

/// Access to the platform's key-value storage.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Every namespace visible to the account.
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError>;

    /// Create a namespace with the given title.
    async fn create_namespace(&self, title: &str) -> Result<Namespace, StoreError>;

    /// Read a value. A missing key yields `Ok(None)`; every other failure is
    /// an error.
    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write (or overwrite) a value.
    async fn put_value(
        &self,
        namespace_id: &str,
        key: &str,
        body: ValueBody,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

/// Access to the platform's script hosting.
#[async_trait]
pub trait ScriptDeployer: Send + Sync {
    /// Upload `script` under its name with the namespace bound to it.
    async fn upload_script(
        &self,
        script: &LookupScript,
        namespace: &Namespace,
    ) -> Result<(), StoreError>;

    /// The account-wide `workers.dev` subdomain.
    async fn subdomain(&self) -> Result<String, StoreError>;

    /// Expose the named script on the account subdomain.
    async fn enable_subdomain(&self, script_name: &str) -> Result<(), StoreError>;
}

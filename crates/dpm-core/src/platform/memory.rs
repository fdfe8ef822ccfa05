//! In-process platform used by tests and the local preview server.
//!
//! Keeps namespaces, values and deployed scripts in memory and records every
//! call so callers can assert on ordering. Individual keys can be made to
//! fail on read or write to exercise error paths.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ApiError, Namespace, ScriptDeployer, StoreClient, StoreError, ValueBody};
use crate::bundle::LookupScript;

/// A value as stored, with the content type it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub data: Bytes,
    pub content_type: String,
}

/// A deployed script and the namespace bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedScript {
    pub source: String,
    pub namespace_id: String,
    pub subdomain_enabled: bool,
}

#[derive(Debug, Default)]
struct State {
    namespaces: Vec<Namespace>,
    values: BTreeMap<(String, String), StoredValue>,
    scripts: BTreeMap<String, DeployedScript>,
    failing_writes: HashSet<String>,
    failing_reads: HashSet<String>,
    calls: Vec<String>,
}

/// Thread-safe in-memory implementation of both platform traits.
#[derive(Debug)]
pub struct MemoryPlatform {
    subdomain: String,
    state: Mutex<State>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new("local")
    }
}

impl MemoryPlatform {
    /// An empty platform whose account subdomain is `subdomain`.
    pub fn new(subdomain: &str) -> Self {
        Self {
            subdomain: subdomain.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an existing namespace and return it.
    pub fn with_namespace(&self, id: &str, title: &str) -> Namespace {
        let namespace = Namespace {
            id: id.to_string(),
            title: title.to_string(),
        };
        self.lock().namespaces.push(namespace.clone());
        namespace
    }

    /// Store a value directly, bypassing the call log.
    pub fn seed(&self, namespace_id: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.lock().values.insert(
            (namespace_id.to_string(), key.to_string()),
            StoredValue {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Make every write to `key` fail with an API error.
    pub fn fail_writes_to(&self, key: &str) {
        self.lock().failing_writes.insert(key.to_string());
    }

    /// Make every read of `key` fail with an API error other than
    /// key-not-found.
    pub fn fail_reads_from(&self, key: &str) {
        self.lock().failing_reads.insert(key.to_string());
    }

    /// Read a stored value.
    pub fn value(&self, namespace_id: &str, key: &str) -> Option<StoredValue> {
        self.lock()
            .values
            .get(&(namespace_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Every namespace, in creation order.
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.lock().namespaces.clone()
    }

    /// The deployed script with the given name.
    pub fn script(&self, name: &str) -> Option<DeployedScript> {
        self.lock().scripts.get(name).cloned()
    }

    /// Calls made so far, e.g. `put dpm-ui-1.0.0`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl StoreClient for MemoryPlatform {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        let mut state = self.lock();
        state.calls.push("list_namespaces".to_string());
        Ok(state.namespaces.clone())
    }

    async fn create_namespace(&self, title: &str) -> Result<Namespace, StoreError> {
        let mut state = self.lock();
        state.calls.push(format!("create_namespace {title}"));
        let namespace = Namespace {
            id: format!("ns-{}", state.namespaces.len() + 1),
            title: title.to_string(),
        };
        state.namespaces.push(namespace.clone());
        Ok(namespace)
    }

    async fn get_value(&self, namespace_id: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut state = self.lock();
        state.calls.push(format!("get {key}"));
        if state.failing_reads.contains(key) {
            return Err(StoreError::Api {
                operation: "Reading value",
                errors: vec![ApiError {
                    code: 10000,
                    message: format!("read of {key} rejected"),
                }],
            });
        }
        Ok(state
            .values
            .get(&(namespace_id.to_string(), key.to_string()))
            .map(|v| v.data.clone()))
    }

    async fn put_value(
        &self,
        namespace_id: &str,
        key: &str,
        body: ValueBody,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let data = match body {
            ValueBody::Bytes(bytes) => bytes,
            ValueBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };

        let mut state = self.lock();
        state.calls.push(format!("put {key}"));
        if state.failing_writes.contains(key) {
            return Err(StoreError::Api {
                operation: "Writing value",
                errors: vec![ApiError {
                    code: 10001,
                    message: format!("write to {key} rejected"),
                }],
            });
        }

        state.values.insert(
            (namespace_id.to_string(), key.to_string()),
            StoredValue {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ScriptDeployer for MemoryPlatform {
    async fn upload_script(
        &self,
        script: &LookupScript,
        namespace: &Namespace,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(format!("upload_script {}", script.name));
        state.scripts.insert(
            script.name.to_string(),
            DeployedScript {
                source: script.source.clone(),
                namespace_id: namespace.id.clone(),
                subdomain_enabled: false,
            },
        );
        Ok(())
    }

    async fn subdomain(&self) -> Result<String, StoreError> {
        self.lock().calls.push("subdomain".to_string());
        Ok(self.subdomain.clone())
    }

    async fn enable_subdomain(&self, script_name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(format!("enable_subdomain {script_name}"));
        match state.scripts.get_mut(script_name) {
            Some(script) => {
                script.subdomain_enabled = true;
                Ok(())
            }
            None => Err(StoreError::Api {
                operation: "Enabling subdomain route",
                errors: vec![ApiError {
                    code: 10007,
                    message: format!("script {script_name} not found"),
                }],
            }),
        }
    }
}

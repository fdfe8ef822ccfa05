//! Publish Pipeline Typestate
//!
//! Publishing is an ordered sequence of fallible steps. Each step consumes the
//! context produced by the previous one and returns the next:
//!
//! ```text
//! PublishPlan --[ensure_namespace()]--> NamespaceReady --[ensure_versions()]--> VersionsReady
//!     --[deploy_script()]--> ScriptDeployed --[pack()]--> Packed --[upload()]--> Published
//! ```
//!
//! The duplicate-version check happens while producing [`VersionsReady`], so
//! nothing is written for a version that is already published. The tarball is
//! uploaded before the versions record is extended; readers never see a
//! version whose tarball is missing.
//!
//! # Usage
//!
//! ```ignore
//! let publisher = Publisher::new(&client, &client, &NativePackager, &reporter, layout);
//! let receipt = publisher.publish(Path::new(".")).await?;
//! println!("{}", receipt.url);
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::bundle::LookupScript;
use crate::error::{PublishError, error_chain};
use crate::manifest::PackageManifest;
use crate::pack::{PackedTarball, Packager};
use crate::platform::{Namespace, ScriptDeployer, StoreClient, StoreError, ValueBody};
use crate::reporter::Reporter;
use crate::types::{KeyLayout, PackageName, TARBALL_CONTENT_TYPE, Version, VersionList};

const JSON_CONTENT_TYPE: &str = "application/json";

const FETCH_NAMESPACES: &str = "Fetching KV namespaces";
const INIT_NAMESPACE: &str = "Initializing namespace";
const FETCH_VERSIONS: &str = "Fetching versions";
const INIT_VERSIONS: &str = "Initializing versions";
const COMPILE_SCRIPT: &str = "Compiling lookup script";
const DEPLOY_SCRIPT: &str = "Deploying lookup script";
const FETCH_SUBDOMAIN: &str = "Retrieving workers.dev subdomain";
const ENABLE_SUBDOMAIN: &str = "Enabling subdomain route";
const PACKAGING: &str = "Packaging";
const UPLOAD_TARBALL: &str = "Uploading tarball";
const UPDATE_VERSIONS: &str = "Updating versions";

/// State 1: the package to publish and where it lives.
#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub manifest: PackageManifest,
    pub folder: PathBuf,
}

impl PublishPlan {
    pub fn new(manifest: PackageManifest, folder: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            folder: folder.into(),
        }
    }

    /// Read `package.json` from `folder`.
    pub async fn load(folder: &Path) -> Result<Self, PublishError> {
        let manifest = PackageManifest::load(folder).await?;
        Ok(Self::new(manifest, folder))
    }

    pub fn name(&self) -> &PackageName {
        &self.manifest.name
    }

    pub fn version(&self) -> &Version {
        &self.manifest.version
    }
}

/// State 2: the namespace exists.
#[derive(Debug, Clone)]
pub struct NamespaceReady {
    pub plan: PublishPlan,
    pub namespace: Namespace,
}

/// State 3: the versions record exists and does not contain the new version.
#[derive(Debug, Clone)]
pub struct VersionsReady {
    pub plan: PublishPlan,
    pub namespace: Namespace,
    pub versions: VersionList,
}

/// State 4: the lookup script is live on the account subdomain.
#[derive(Debug, Clone)]
pub struct ScriptDeployed {
    pub plan: PublishPlan,
    pub namespace: Namespace,
    pub versions: VersionList,
    pub subdomain: String,
}

/// State 5: the tarball is on disk.
#[derive(Debug)]
pub struct Packed {
    pub plan: PublishPlan,
    pub namespace: Namespace,
    pub versions: VersionList,
    pub subdomain: String,
    pub tarball: PackedTarball,
}

/// State 6: tarball uploaded and versions record extended.
#[derive(Debug, Clone)]
pub struct Published {
    pub name: PackageName,
    pub version: Version,
    pub subdomain: String,
    pub versions: VersionList,
    /// Size of the uploaded tarball in bytes.
    pub size: u64,
    /// SHA-256 of the uploaded tarball.
    pub sha256: String,
    /// Number of archived files, when the packager reports it.
    pub entries: Option<usize>,
}

impl Published {
    pub fn receipt(self, elapsed: Duration) -> PublishReceipt {
        PublishReceipt {
            url: lookup_url(&self.name, &self.subdomain, &self.version),
            name: self.name,
            version: self.version,
            subdomain: self.subdomain,
            size: self.size,
            sha256: self.sha256,
            entries: self.entries,
            elapsed,
        }
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub name: PackageName,
    pub version: Version,
    pub subdomain: String,
    /// Public URL serving exactly this version.
    pub url: String,
    pub size: u64,
    pub sha256: String,
    pub entries: Option<usize>,
    pub elapsed: Duration,
}

/// `https://{package}.{subdomain}.workers.dev/{version}`
pub fn lookup_url(name: &PackageName, subdomain: &str, version: &Version) -> String {
    format!("https://{name}.{subdomain}.workers.dev/{version}")
}

/// `1.23s` above one second, `412.50ms` below.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs > 1.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.2}ms", secs * 1000.0)
    }
}

/// Runs the publish pipeline against the platform seams.
pub struct Publisher<'a> {
    store: &'a dyn StoreClient,
    deployer: &'a dyn ScriptDeployer,
    packager: &'a dyn Packager,
    reporter: &'a dyn Reporter,
    layout: KeyLayout,
}

impl<'a> Publisher<'a> {
    pub fn new(
        store: &'a dyn StoreClient,
        deployer: &'a dyn ScriptDeployer,
        packager: &'a dyn Packager,
        reporter: &'a dyn Reporter,
        layout: KeyLayout,
    ) -> Self {
        Self {
            store,
            deployer,
            packager,
            reporter,
            layout,
        }
    }

    /// Publish the package in `folder`.
    pub async fn publish(&self, folder: &Path) -> Result<PublishReceipt, PublishError> {
        let started = Instant::now();
        let plan = PublishPlan::load(folder).await?;
        tracing::info!(name = %plan.name(), version = %plan.version(), "publishing");

        self.reporter.section("Initializing dpm");
        let ready = self.ensure_namespace(plan).await?;
        let ready = self.ensure_versions(ready).await?;

        self.reporter.section(&format!(
            "Publishing {}@{}",
            ready.plan.name(),
            ready.plan.version()
        ));
        let deployed = self.deploy_script(ready).await?;
        let packed = self.pack(deployed).await?;
        let published = self.upload(packed).await?;

        Ok(published.receipt(started.elapsed()))
    }

    /// Reuse the namespace titled after the layout, or create it.
    pub async fn ensure_namespace(&self, plan: PublishPlan) -> Result<NamespaceReady, PublishError> {
        let title = self.layout.namespace.as_str();

        self.reporter.task_started(FETCH_NAMESPACES);
        let namespaces = self
            .store
            .list_namespaces()
            .await
            .map_err(|e| self.store_failed(FETCH_NAMESPACES, e))?;
        self.reporter
            .task_done(FETCH_NAMESPACES, Some(&format!("{} found", namespaces.len())));

        if let Some(namespace) = namespaces.into_iter().find(|ns| ns.title == title) {
            self.reporter
                .task_skipped(INIT_NAMESPACE, &format!("using existing namespace {title}"));
            return Ok(NamespaceReady { plan, namespace });
        }

        self.reporter.task_started(INIT_NAMESPACE);
        let namespace = self
            .store
            .create_namespace(title)
            .await
            .map_err(|e| self.store_failed(INIT_NAMESPACE, e))?;
        tracing::info!(id = %namespace.id, title, "created namespace");
        self.reporter.task_done(INIT_NAMESPACE, Some(title));

        Ok(NamespaceReady { plan, namespace })
    }

    /// Fetch the versions record, creating it when missing, and reject a
    /// version that is already listed.
    pub async fn ensure_versions(&self, ready: NamespaceReady) -> Result<VersionsReady, PublishError> {
        let NamespaceReady { plan, namespace } = ready;
        let key = self.layout.versions_key(plan.name());

        self.reporter.task_started(FETCH_VERSIONS);
        let record = self
            .store
            .get_value(&namespace.id, &key)
            .await
            .map_err(|e| self.store_failed(FETCH_VERSIONS, e))?;

        let versions = match record {
            Some(data) => {
                let versions: VersionList = serde_json::from_slice(&data).map_err(|source| {
                    self.failed(FETCH_VERSIONS, PublishError::VersionsRecord { key, source })
                })?;
                if versions.contains(plan.version()) {
                    return Err(self.failed(
                        FETCH_VERSIONS,
                        PublishError::DuplicateVersion {
                            name: plan.name().clone(),
                            version: plan.version().clone(),
                        },
                    ));
                }
                self.reporter
                    .task_done(FETCH_VERSIONS, Some(&format!("{} published", versions.len())));
                versions
            }
            None => {
                tracing::warn!(key = %key, "versions record missing, initializing");
                self.reporter
                    .task_skipped(FETCH_VERSIONS, "no versions record yet");

                self.reporter.task_started(INIT_VERSIONS);
                let versions = VersionList::default();
                self.write_versions(INIT_VERSIONS, &namespace, &key, &versions)
                    .await?;
                self.reporter.task_done(INIT_VERSIONS, None);
                versions
            }
        };

        Ok(VersionsReady {
            plan,
            namespace,
            versions,
        })
    }

    /// Render and upload the lookup script, then expose it on the account
    /// subdomain. Runs on every publish.
    pub async fn deploy_script(&self, ready: VersionsReady) -> Result<ScriptDeployed, PublishError> {
        let VersionsReady {
            plan,
            namespace,
            versions,
        } = ready;

        self.reporter.task_started(COMPILE_SCRIPT);
        let script = LookupScript::render(plan.name(), &self.layout);
        self.reporter
            .task_done(COMPILE_SCRIPT, Some(&format!("{} bytes", script.len())));

        self.reporter.task_started(DEPLOY_SCRIPT);
        self.deployer
            .upload_script(&script, &namespace)
            .await
            .map_err(|e| self.store_failed(DEPLOY_SCRIPT, e))?;
        self.reporter.task_done(DEPLOY_SCRIPT, Some(script.name.as_str()));

        self.reporter.task_started(FETCH_SUBDOMAIN);
        let subdomain = self
            .deployer
            .subdomain()
            .await
            .map_err(|e| self.store_failed(FETCH_SUBDOMAIN, e))?;
        self.reporter.task_done(FETCH_SUBDOMAIN, Some(&subdomain));

        self.reporter.task_started(ENABLE_SUBDOMAIN);
        self.deployer
            .enable_subdomain(script.name.as_str())
            .await
            .map_err(|e| self.store_failed(ENABLE_SUBDOMAIN, e))?;
        self.reporter.task_done(ENABLE_SUBDOMAIN, None);

        Ok(ScriptDeployed {
            plan,
            namespace,
            versions,
            subdomain,
        })
    }

    /// Build the tarball with the configured packager.
    pub async fn pack(&self, deployed: ScriptDeployed) -> Result<Packed, PublishError> {
        let ScriptDeployed {
            plan,
            namespace,
            versions,
            subdomain,
        } = deployed;

        self.reporter.task_started(PACKAGING);
        let tarball = self
            .packager
            .pack(&plan.folder, &plan.manifest)
            .await
            .map_err(|e| self.failed(PACKAGING, e.into()))?;
        tracing::debug!(path = %tarball.path.display(), size = tarball.size, sha256 = %tarball.sha256, "packed");
        self.reporter.task_done(PACKAGING, Some(self.packager.name()));

        Ok(Packed {
            plan,
            namespace,
            versions,
            subdomain,
            tarball,
        })
    }

    /// Upload the tarball, then append the version to the versions record.
    pub async fn upload(&self, packed: Packed) -> Result<Published, PublishError> {
        let Packed {
            plan,
            namespace,
            versions,
            subdomain,
            tarball,
        } = packed;

        self.reporter.task_started(UPLOAD_TARBALL);
        let tarball_key = self.layout.tarball_key(plan.name(), plan.version());
        self.store
            .put_value(
                &namespace.id,
                &tarball_key,
                ValueBody::File(tarball.path.clone()),
                TARBALL_CONTENT_TYPE,
            )
            .await
            .map_err(|e| self.store_failed(UPLOAD_TARBALL, e))?;
        self.reporter.task_done(UPLOAD_TARBALL, Some(&tarball_key));

        self.reporter.task_started(UPDATE_VERSIONS);
        let versions_key = self.layout.versions_key(plan.name());
        let versions = versions.appended(plan.version().clone());
        self.write_versions(UPDATE_VERSIONS, &namespace, &versions_key, &versions)
            .await?;
        self.reporter
            .task_done(UPDATE_VERSIONS, Some(&format!("{} published", versions.len())));

        let PublishPlan { manifest, .. } = plan;
        Ok(Published {
            name: manifest.name,
            version: manifest.version,
            subdomain,
            versions,
            size: tarball.size,
            sha256: tarball.sha256.clone(),
            entries: tarball.entries,
        })
    }

    async fn write_versions(
        &self,
        step: &'static str,
        namespace: &Namespace,
        key: &str,
        versions: &VersionList,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_vec(versions).map_err(|source| {
            self.failed(
                step,
                PublishError::VersionsRecord {
                    key: key.to_string(),
                    source,
                },
            )
        })?;
        self.store
            .put_value(&namespace.id, key, body.into(), JSON_CONTENT_TYPE)
            .await
            .map_err(|e| self.store_failed(step, e))
    }

    fn store_failed(&self, step: &'static str, source: StoreError) -> PublishError {
        self.failed(step, PublishError::Store { step, source })
    }

    fn failed(&self, step: &str, err: PublishError) -> PublishError {
        self.reporter.task_failed(step, &error_chain(&err));
        err
    }
}

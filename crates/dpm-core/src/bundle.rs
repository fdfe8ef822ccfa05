//! Builds the edge lookup script for a package.
//!
//! The script is a single service-worker file shipped inside this crate. The
//! package name, namespace title and versions key are baked in as JSON string
//! literals; the namespace itself is reachable through the `dpm` binding that
//! [`crate::platform::ScriptDeployer::upload_script`] attaches.

use crate::types::{KeyLayout, PackageName};

const TEMPLATE: &str = include_str!("../assets/lookup.js");

const PACKAGE_PLACEHOLDER: &str = "__DPM_PACKAGE__";
const NAMESPACE_PLACEHOLDER: &str = "__DPM_NAMESPACE__";
const VERSIONS_PLACEHOLDER: &str = "__DPM_VERSIONS_KEY__";

/// A rendered lookup script ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupScript {
    /// Script name on the platform; the package name.
    pub name: PackageName,
    /// JavaScript source.
    pub source: String,
}

impl LookupScript {
    /// Render the script for `package` reading records laid out by `layout`.
    pub fn render(package: &PackageName, layout: &KeyLayout) -> Self {
        let source = TEMPLATE
            .replace(PACKAGE_PLACEHOLDER, &js_string(package.as_str()))
            .replace(NAMESPACE_PLACEHOLDER, &js_string(&layout.namespace))
            .replace(VERSIONS_PLACEHOLDER, &js_string(&layout.versions_suffix));

        Self {
            name: package.clone(),
            source,
        }
    }

    /// Size of the rendered source in bytes.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

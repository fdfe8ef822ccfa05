pub use dpm_schema::{
    KV_BINDING, KeyLayout, NameError, PackageName, RangeError, Specifier, TARBALL_CONTENT_TYPE,
    Version, VersionList,
};

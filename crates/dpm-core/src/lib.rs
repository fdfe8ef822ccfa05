pub mod bundle;
pub mod config;
pub mod error;
pub mod lookup;
pub mod manifest;
pub mod pack;
pub mod platform;
pub mod publish;
pub mod reporter;
pub mod types;

pub use error::{PublishError, error_chain};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for calls made against the platform API
pub const USER_AGENT: &str = concat!("dpm-core/", env!("CARGO_PKG_VERSION"));

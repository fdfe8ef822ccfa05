//! Command handlers

pub mod completions;
pub mod publish;
pub mod serve;

use anyhow::{Context, Result};
use dpm_core::config::{Credentials, Settings};
use dpm_core::platform::cloudflare::CloudflareClient;

/// Build the platform client from credentials in the environment.
pub fn connect(settings: &Settings) -> Result<CloudflareClient> {
    let credentials = Credentials::from_env()?;
    tracing::debug!(?credentials, api_url = %settings.api_url, "connecting");
    CloudflareClient::new(settings, &credentials).context("Failed to create HTTP client")
}

//! Publish command

use anyhow::{Context, Result};
use dpm_core::Reporter;
use dpm_core::config::Settings;
use dpm_core::publish::{PublishReceipt, Publisher, format_elapsed};
use std::path::Path;

use crate::PackagerKind;
use crate::ui::Output;
use crate::ui::theme::format_size;

/// Publish the package in `folder`, relative to the working directory.
pub async fn publish(folder: Option<&Path>, packager: PackagerKind, settings: &Settings) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let folder = match folder {
        Some(folder) => cwd.join(folder),
        None => cwd,
    };

    let client = super::connect(settings)?;
    let packager = packager.build();
    let output = Output::new();

    let receipt = Publisher::new(
        &client,
        &client,
        packager.as_ref(),
        &output,
        settings.layout.clone(),
    )
    .publish(&folder)
    .await
    .with_context(|| format!("Failed to publish {}", folder.display()))?;

    output.info(&tarball_summary(&receipt));
    println!();
    output.success(&format!(
        "✨ Published {}@{} [{}] [{}]",
        receipt.name,
        receipt.version,
        receipt.url,
        format_elapsed(receipt.elapsed)
    ));
    Ok(())
}

/// Size, file count and digest of the uploaded tarball.
fn tarball_summary(receipt: &PublishReceipt) -> String {
    let size = format_size(receipt.size);
    match receipt.entries {
        Some(1) => format!("{size}, 1 file, sha256:{}", receipt.sha256),
        Some(n) => format!("{size}, {n} files, sha256:{}", receipt.sha256),
        None => format!("{size}, sha256:{}", receipt.sha256),
    }
}

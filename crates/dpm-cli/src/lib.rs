//! dpm - publish packages to the edge
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Packages a local folder, stores the tarball in a Workers KV namespace and
//! deploys a small lookup script that serves any published version by range.
//!
//! # Architecture
//!
//! - **Typestate Pattern**: publishing runs `PublishPlan` → `NamespaceReady` →
//!   `VersionsReady` → `ScriptDeployed` → `Packed` → `Published`, one remote
//!   step at a time (see `dpm_core::publish`).
//! - **Seams**: the store, the script host and the packager are traits, so the
//!   same pipeline runs against Cloudflare or an in-memory platform.
//!
//! # Record Layout
//!
//! ```text
//! {namespace}-{package}-versions   JSON array of published versions
//! {namespace}-{package}-{version}  gzip'd tarball
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use dpm_core::config::DEFAULT_API_URL;
use dpm_core::pack::{CommandPackager, NativePackager, PackTool, Packager};
use dpm_schema::DEFAULT_NAMESPACE;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dpm")]
#[command(author, version, about = "dpm - publish packages to the edge")]
pub struct Cli {
    /// Title of the KV namespace holding every package
    #[arg(long, global = true, env = "DPM_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Base URL of the Cloudflare v4 API
    #[arg(long, global = true, env = "DPM_API_URL", default_value = DEFAULT_API_URL, hide = true)]
    pub api_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish the package in a folder
    Publish {
        /// Package folder (defaults to the current directory)
        folder: Option<PathBuf>,
        /// How to build the tarball
        #[arg(long, value_enum, default_value_t = PackagerKind::Native)]
        packager: PackagerKind,
    },
    /// Serve a published package locally, as the edge would
    Serve {
        /// Package name
        package: String,
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8787")]
        addr: SocketAddr,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Tarball builders selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PackagerKind {
    /// Built in; archives the folder under `package/`
    Native,
    /// `yarn pack`
    Yarn,
    /// `npm pack`
    Npm,
}

impl PackagerKind {
    pub fn build(self) -> Box<dyn Packager> {
        match self {
            Self::Native => Box::new(NativePackager),
            Self::Yarn => Box::new(CommandPackager::new(PackTool::Yarn)),
            Self::Npm => Box::new(CommandPackager::new(PackTool::Npm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publish_defaults() {
        let cli = Cli::try_parse_from(["dpm", "publish"]).unwrap();
        assert_eq!(cli.namespace, "dpm");
        match cli.command {
            Commands::Publish { folder, packager } => {
                assert!(folder.is_none());
                assert_eq!(packager, PackagerKind::Native);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_namespace_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dpm",
            "publish",
            "pkg",
            "--packager",
            "yarn",
            "--namespace",
            "staging",
        ])
        .unwrap();
        assert_eq!(cli.namespace, "staging");
        assert!(matches!(
            cli.command,
            Commands::Publish {
                packager: PackagerKind::Yarn,
                ..
            }
        ));
        assert_eq!(PackagerKind::Yarn.build().name(), "yarn");
    }

    #[test]
    fn test_serve_addr_is_validated() {
        assert!(Cli::try_parse_from(["dpm", "serve", "ui", "--addr", "nope"]).is_err());
        let cli = Cli::try_parse_from(["dpm", "serve", "ui"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { addr, .. } if addr.port() == 8787));
    }
}

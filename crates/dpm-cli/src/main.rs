//! dpm - publish packages to the edge

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use dpm_cli::{Cli, Commands, cmd};
use dpm_core::config::{Settings, load_rc_file};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error details:");
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // .dpmrc must be loaded before parsing so it can supply env-backed flags.
    let cwd = std::env::current_dir()?;
    load_rc_file(&cwd)?;

    let cli = Cli::parse();
    let settings = Settings::new(&cli.api_url, &cli.namespace);

    match cli.command {
        Commands::Publish { folder, packager } => {
            cmd::publish::publish(folder.as_deref(), packager, &settings).await
        }
        Commands::Serve { package, addr } => cmd::serve::serve(&package, addr, &settings).await,
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}

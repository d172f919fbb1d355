//! Keel CLI - plan, apply and destroy vendor resources.
//!
//! This is the entry point for the `keel` binary.

mod commands;
mod files;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use keel_engine::{cancel_pair, EngineConfig, HttpVendorClient};
use keel_resources::Catalog;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::Runner;

/// Keel - declarative reconciliation of vendor resources.
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vendor API base URL, used when the config file does not set one.
    #[arg(long, env = "KEEL_VENDOR_URL", global = true)]
    vendor_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the changes a declared file needs. Makes no vendor calls.
    Plan {
        /// Expected resource type.
        #[arg(long = "type")]
        resource_type: Option<String>,
        /// Declared resource file.
        #[arg(long)]
        declared: PathBuf,
        /// State file from a previous apply.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Reconcile declared files against the vendor.
    Apply {
        /// Declared resource files.
        #[arg(long, required = true, num_args = 1..)]
        declared: Vec<PathBuf>,
        /// Directory for state files.
        #[arg(long)]
        state_dir: PathBuf,
    },
    /// Destroy the resource recorded in a state file.
    Destroy {
        /// State file from a previous apply.
        #[arg(long)]
        state: PathBuf,
    },
}

fn connect(
    config: &EngineConfig,
    fallback_url: Option<String>,
) -> anyhow::Result<HttpVendorClient> {
    let Some(url) = config.vendor_url.clone().or(fallback_url) else {
        bail!("no vendor URL: set vendor_url in the config file or KEEL_VENDOR_URL");
    };
    HttpVendorClient::new(url, config.request_timeout()).context("failed to build vendor client")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = files::load_config(args.config.as_deref())?;
    let catalog = Catalog::builtin().configured(&config);

    if let Command::Plan {
        resource_type,
        declared,
        state,
    } = &args.command
    {
        let out = commands::plan(&catalog, resource_type.as_deref(), declared, state.as_deref())?;
        print!("{out}");
        return Ok(());
    }

    let client = connect(&config, args.vendor_url)?;
    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning waits");
            cancel.cancel();
        }
    });
    let runner = Runner::new(catalog, Arc::new(client)).with_cancel(signal);

    match args.command {
        Command::Plan { .. } => Ok(()),
        Command::Apply {
            declared,
            state_dir,
        } => {
            let reports = runner.apply(&declared, &state_dir).await?;
            let mut failed = 0;
            for report in &reports {
                match &report.result {
                    Ok(outcome) => println!(
                        "{}: {} {}",
                        report.declared.display(),
                        outcome.applied,
                        outcome.state.identity
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {e:#}", report.declared.display());
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} resources failed", reports.len());
            }
            Ok(())
        }
        Command::Destroy { state } => runner.destroy(&state).await,
    }
}

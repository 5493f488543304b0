//! rke2-diagnose - Read-only RKE2 health report
//!
//! Run with: rke2-diagnose [quick|standard|comprehensive] [config.yml]

use anyhow::Context;
use clap::{CommandFactory, Parser};
use rke2_deploy::cluster::{ClusterConfig, DEFAULT_CONFIG_FILE};
use rke2_deploy::diagnostics::{DiagnosticMode, Diagnostics};
use rke2_deploy::logging;
use rke2_deploy::remote::SshExecutor;
use rke2_deploy::sink::TracingSink;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// rke2-diagnose - Diagnose RKE2 server nodes
#[derive(Parser)]
#[command(name = "rke2-diagnose")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Read-only diagnostics for RKE2 server nodes", long_about = None)]
struct Cli {
    /// quick, standard or comprehensive
    #[arg(default_value = "standard")]
    mode: String,

    /// Cluster configuration file
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mode: DiagnosticMode = match cli.mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", Cli::command().render_usage());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(cli.debug, None) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli, mode).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, mode: DiagnosticMode) -> anyhow::Result<ExitCode> {
    if !cli.config.exists() {
        eprintln!("Configuration file not found: {}", cli.config.display());
        return Ok(ExitCode::FAILURE);
    }

    let cluster = ClusterConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let executor = Arc::new(SshExecutor::new(cluster.deploy.ssh.clone())?);
    let diagnostics = Diagnostics::new(executor, Arc::new(TracingSink));

    let report = diagnostics.run(&cluster, mode).await;
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(ExitCode::SUCCESS)
}

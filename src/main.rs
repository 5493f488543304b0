//! rke2-deploy - Sequenced RKE2 cluster bootstrap
//!
//! This is the main CLI entry point: it loads the cluster file, runs the
//! deployment pipeline and prints the report.

use anyhow::Context;
use clap::Parser;
use rke2_deploy::cluster::{ClusterConfig, ReadinessGate, DEFAULT_CONFIG_FILE};
use rke2_deploy::deploy::DeploymentSequencer;
use rke2_deploy::logging::{self, DEPLOY_LOG_FILE};
use rke2_deploy::remote::SshExecutor;
use rke2_deploy::sink::TracingSink;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Number of error causes printed on failure
const MAX_CAUSES: usize = 5;

/// rke2-deploy - Deploy an RKE2 cluster
#[derive(Parser)]
#[command(name = "rke2-deploy")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Deploy an RKE2 cluster with readiness gating", long_about = None)]
struct Cli {
    /// Cluster configuration file
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory for rendered node artifacts
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Nodes deployed at once within a stage
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Skip later stages when the bootstrap server never becomes ready
    #[arg(long)]
    strict: bool,

    /// Abandon remaining work after this many minutes
    #[arg(long)]
    deadline_minutes: Option<u64>,

    /// Write the deployment report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Only re-apply nginx-ingress RBAC on the bootstrap server
    #[arg(long)]
    fix_ingress_rbac: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.debug, Some(Path::new(DEPLOY_LOG_FILE))) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if !cli.config.exists() {
        eprintln!("Configuration file not found: {}", cli.config.display());
        return Ok(ExitCode::FAILURE);
    }

    let mut cluster = ClusterConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(output) = cli.output {
        cluster.deploy.output_dir = output;
    }
    if let Some(concurrency) = cli.concurrency {
        cluster.deploy.concurrency = concurrency;
    }
    if cli.strict {
        cluster.deploy.readiness_gate = ReadinessGate::Strict;
    }
    if cli.deadline_minutes.is_some() {
        cluster.deploy.deadline_minutes = cli.deadline_minutes;
    }
    cluster.deploy.validate()?;

    tracing::info!(
        "Loaded {} nodes from {} (token {})",
        cluster.nodes.len(),
        cli.config.display(),
        cluster.token.fingerprint()
    );

    let executor = Arc::new(
        SshExecutor::new(cluster.deploy.ssh.clone()).context("Failed to prepare ssh transport")?,
    );
    let sequencer = DeploymentSequencer::new(cluster, executor, Arc::new(TracingSink));

    if cli.fix_ingress_rbac {
        sequencer
            .fix_ingress_rbac()
            .await
            .context("Failed to fix ingress RBAC")?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = sequencer.run().await;
    println!("{}", report.render_text());

    if let Some(path) = cli.report_json {
        std::fs::write(&path, report.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(ExitCode::SUCCESS)
}

fn print_error(err: &anyhow::Error) {
    let mut causes = err.chain();
    if let Some(top) = causes.next() {
        eprintln!("Error: {}", top);
    }
    for cause in causes.take(MAX_CAUSES - 1) {
        eprintln!("  caused by: {}", cause);
    }
}

//! rke2-monitor - Follow an RKE2 server while it starts

use anyhow::Context;
use clap::Parser;
use rke2_deploy::cluster::{ClusterConfig, DEFAULT_CONFIG_FILE};
use rke2_deploy::logging;
use rke2_deploy::readiness::{ReadinessProber, StartupOutcome};
use rke2_deploy::remote::SshExecutor;
use rke2_deploy::sink::TracingSink;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// rke2-monitor - Watch RKE2 server startup
#[derive(Parser)]
#[command(name = "rke2-monitor")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Watch an RKE2 server until it is ready or fails", long_about = None)]
struct Cli {
    /// Node name from the cluster file
    node: String,

    /// Cluster configuration file
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Give up after this many minutes
    #[arg(short, long, default_value = "15")]
    minutes: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.debug, None) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(outcome) if outcome.is_ready() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<StartupOutcome> {
    let cluster = ClusterConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let node = cluster.node(&cli.node)?.clone();

    let executor = Arc::new(SshExecutor::new(cluster.deploy.ssh.clone())?);
    let prober = ReadinessProber::new(
        executor,
        Arc::new(TracingSink),
        cluster.deploy.probe_connect_timeout(),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping monitor");
            interrupt.cancel();
        }
    });

    let outcome = prober
        .monitor_startup(
            &node,
            Duration::from_secs(cli.minutes * 60),
            cluster.deploy.monitor_interval(),
            &cancel,
        )
        .await;

    match &outcome {
        StartupOutcome::Ready => println!("{} is ready", node.name),
        StartupOutcome::Failed { logs } => {
            println!("{} failed to start. Recent logs:", node.name);
            println!("{}", logs);
        }
        StartupOutcome::TimedOut => println!(
            "{} did not become ready within {} minutes",
            node.name, cli.minutes
        ),
        StartupOutcome::Cancelled => println!("Monitoring of {} cancelled", node.name),
    }
    Ok(outcome)
}

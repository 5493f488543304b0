//! Logging setup shared by the binaries

use crate::error::Result;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file written by `rke2-deploy`
pub const DEPLOY_LOG_FILE: &str = "deploy.log";

/// Level filter for the `--debug` flag
pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Install the global subscriber: stdout, plus an append-only file when given
pub fn init(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

//! Remote execution traits

use crate::cluster::Node;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(exit_code),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Standard output followed by standard error
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}{}", self.stdout, self.stderr)
        }
    }
}

/// Opens sessions to cluster nodes
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Open a session, failing with a connection error on timeout or auth failure
    async fn connect(&self, node: &Node, timeout: Duration) -> Result<Box<dyn RemoteSession>>;
}

/// An open session to one node
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a shell command, capturing its output and exit status
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Write `contents` to `remote_path` on the node
    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()>;

    /// Tear the session down; calling it twice is harmless
    async fn close(&self) -> Result<()>;
}

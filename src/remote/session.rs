//! Scoped node sessions

use super::executor::{CommandOutput, RemoteExecutor, RemoteSession};
use crate::cluster::Node;
use crate::error::{DeployError, Result};
use std::path::Path;
use std::time::Duration;

/// A session to one node with guaranteed teardown
///
/// Call [`NodeSession::close`] on every path that finishes normally. A session
/// dropped while still open (cancelled task, early return, panic) hands its
/// transport to the runtime to close in the background.
pub struct NodeSession {
    node: String,
    inner: Option<Box<dyn RemoteSession>>,
}

impl NodeSession {
    /// Connect to `node`
    pub async fn open(executor: &dyn RemoteExecutor, node: &Node, timeout: Duration) -> Result<Self> {
        let inner = executor.connect(node, timeout).await?;
        tracing::debug!("Opened session to {} ({})", node.name, node.address);
        Ok(Self {
            node: node.name.clone(),
            inner: Some(inner),
        })
    }

    /// Name of the node this session talks to
    pub fn node(&self) -> &str {
        &self.node
    }

    fn session(&self) -> Result<&dyn RemoteSession> {
        self.inner
            .as_deref()
            .ok_or_else(|| DeployError::Transport(format!("session to {} is closed", self.node)))
    }

    /// Run a command; the exit status is left to the caller
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.session()?.exec(command).await
    }

    /// Run a command, turning a non-zero exit into an error
    pub async fn exec_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.exec(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DeployError::CommandFailed {
                node: self.node.clone(),
                status: output.exit_code.unwrap_or(-1),
                output: tail(&output.combined(), 20),
            })
        }
    }

    /// Trimmed standard output of a query, `None` if it could not run
    pub async fn query(&self, command: &str) -> Option<String> {
        match self.exec(command).await {
            Ok(output) => Some(output.trimmed().to_string()),
            Err(e) => {
                tracing::debug!("Query on {} failed: {}", self.node, e);
                None
            }
        }
    }

    /// Upload an in-memory buffer
    pub async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        self.session()?.upload(contents, remote_path).await
    }

    /// Upload a local file
    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let contents = tokio::fs::read(local).await?;
        self.upload(&contents, remote_path).await
    }

    /// Close the session
    pub async fn close(mut self) {
        if let Some(inner) = self.inner.take() {
            if let Err(e) = inner.close().await {
                tracing::warn!("Failed to close session to {}: {}", self.node, e);
            }
        }
    }
}

impl Drop for NodeSession {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let node = std::mem::take(&mut self.node);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = inner.close().await {
                            tracing::warn!("Background close of session to {} failed: {}", node, e);
                        }
                    });
                }
                Err(_) => tracing::warn!("Session to {} dropped outside the runtime", node),
            }
        }
    }
}

/// Last `lines` lines of `text`
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRole;
    use crate::remote::testing::FakeExecutor;

    fn node() -> Node {
        Node::new("s1", "10.0.0.1", NodeRole::Server)
    }

    #[tokio::test]
    async fn test_exec_checked_reports_exit_status() {
        let fake = FakeExecutor::new();
        fake.fail("false", 3, "boom");
        let session = NodeSession::open(&fake, &node(), Duration::from_secs(1))
            .await
            .unwrap();

        let err = session.exec_checked("false").await.unwrap_err();
        assert!(matches!(err, DeployError::CommandFailed { status: 3, .. }));
        session.close().await;
        assert_eq!(fake.close_count("s1"), 1);
    }

    #[tokio::test]
    async fn test_query_trims_output() {
        let fake = FakeExecutor::new();
        fake.respond("systemctl is-active", "active\n");
        let session = NodeSession::open(&fake, &node(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(
            session.query("systemctl is-active rke2-server").await.as_deref(),
            Some("active")
        );
        session.close().await;
    }

    #[tokio::test]
    async fn test_dropped_session_is_closed() {
        let fake = FakeExecutor::new();
        {
            let _session = NodeSession::open(&fake, &node(), Duration::from_secs(1))
                .await
                .unwrap();
        }
        tokio::task::yield_now().await;
        assert_eq!(fake.close_count("s1"), 1);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}

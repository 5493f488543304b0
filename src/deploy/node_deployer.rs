//! Per-node deployment steps

use super::artifacts::{write_node_artifacts, NodeArtifacts};
use crate::cluster::{ClusterConfig, Node};
use crate::error::{DeployError, Result};
use crate::readiness::ReadinessProber;
use crate::remote::commands::{shell_quote, staging_path, REMOTE_STAGING_DIR};
use crate::remote::{NodeSession, RemoteExecutor};
use crate::render::{
    init_script, install_script, lb_install_script, render_load_balancer, ConfigGenerator,
    RenderedConfig, INSTALL_SCRIPT_FILE,
};
use crate::sink::OutputSink;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const INIT_SCRIPT_FILE: &str = "node_init.sh";

/// Runs the init and install steps against single nodes
///
/// Cheap to clone; every stage worker gets its own copy.
#[derive(Clone)]
pub struct NodeDeployer {
    pub(super) cluster: Arc<ClusterConfig>,
    pub(super) executor: Arc<dyn RemoteExecutor>,
    pub(super) sink: Arc<dyn OutputSink>,
    pub(super) prober: ReadinessProber,
    output_dir: PathBuf,
    connect_timeout: Duration,
}

impl NodeDeployer {
    pub fn new(
        cluster: Arc<ClusterConfig>,
        executor: Arc<dyn RemoteExecutor>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let settings = &cluster.deploy;
        let prober = ReadinessProber::new(
            executor.clone(),
            sink.clone(),
            settings.probe_connect_timeout(),
        );
        Self {
            output_dir: settings.output_dir.clone(),
            connect_timeout: settings.connect_timeout(),
            cluster,
            executor,
            sink,
            prober,
        }
    }

    pub fn prober(&self) -> &ReadinessProber {
        &self.prober
    }

    /// Open a deployment session and make sure the staging directory exists
    pub(super) async fn connect(&self, node: &Node) -> Result<NodeSession> {
        let session = NodeSession::open(self.executor.as_ref(), node, self.connect_timeout).await?;
        session
            .exec_checked(&format!("mkdir -p {}", REMOTE_STAGING_DIR))
            .await?;
        Ok(session)
    }

    /// Upload and run the node initialization script
    pub async fn init_node(&self, node: &Node) -> Result<()> {
        self.sink.node_info(&node.name, "Initializing node");
        let session = self.connect(node).await?;
        let result = async {
            let remote = staging_path(INIT_SCRIPT_FILE);
            session
                .upload(init_script(node).as_bytes(), &remote)
                .await?;
            session
                .exec_checked(&format!("chmod +x {}", shell_quote(&remote)))
                .await?;
            let output = session
                .exec_checked(&format!("sudo bash {} 2>&1", shell_quote(&remote)))
                .await?;
            self.sink.node_output(&node.name, &output.stdout);
            session.exec(&format!("rm -f {}", shell_quote(&remote))).await?;
            Ok::<(), DeployError>(())
        }
        .await;
        session.close().await;

        if result.is_ok() {
            self.sink.node_info(&node.name, "Node initialized");
        }
        result
    }

    /// Render, write and install HAProxy on a load-balancer node
    pub async fn deploy_lb(&self, node: &Node) -> Result<()> {
        self.sink.node_info(&node.name, "Deploying HAProxy load balancer");
        let rendered = render_load_balancer(&self.cluster, node)?;
        let script = lb_install_script(node);
        self.install(&rendered, &script).await?;
        self.sink.node_info(&node.name, "Load balancer deployed");
        Ok(())
    }

    /// Render, write and install RKE2 on a server or agent
    pub async fn deploy_rke2(&self, node: &Node, is_bootstrap: bool) -> Result<()> {
        let kind = if is_bootstrap {
            format!("{} (bootstrap)", node.role)
        } else {
            node.role.to_string()
        };
        self.sink
            .node_info(&node.name, &format!("Deploying RKE2 {}", kind));

        let rendered = ConfigGenerator::new(&self.cluster).render(node, is_bootstrap)?;
        let script = install_script(node)?;
        self.install(&rendered, &script).await?;

        self.sink
            .node_info(&node.name, &format!("RKE2 {} deployed", kind));
        Ok(())
    }

    async fn install(&self, rendered: &RenderedConfig, script: &str) -> Result<NodeArtifacts> {
        let node = &rendered.node;
        let artifacts = write_node_artifacts(&self.output_dir, rendered, script).await?;

        let session = self.connect(node).await?;
        let result = async {
            session
                .upload_file(&artifacts.config, &staging_path(rendered.file_name))
                .await?;
            let remote_script = staging_path(INSTALL_SCRIPT_FILE);
            session
                .upload_file(&artifacts.install_script, &remote_script)
                .await?;
            let output = session
                .exec_checked(&format!("sudo bash {} 2>&1", shell_quote(&remote_script)))
                .await?;
            self.sink.node_output(&node.name, &output.stdout);
            Ok::<(), DeployError>(())
        }
        .await;
        session.close().await;

        result.map(|_| artifacts)
    }
}

//! nginx-ingress rollout on the bootstrap server

use super::node_deployer::NodeDeployer;
use crate::cluster::Node;
use crate::error::{DeployError, Result};
use crate::readiness::PollPolicy;
use crate::remote::commands::{kubectl, shell_quote, staging_path};
use crate::remote::NodeSession;
use crate::render::manifests::{INGRESS_DAEMONSET_NAME, INGRESS_NAMESPACE};
use crate::render::{ingress_manifest, ingress_rbac_manifest};
use tokio_util::sync::CancellationToken;

const INGRESS_MANIFEST_FILE: &str = "nginx-ingress-daemonset.yaml";
const RBAC_MANIFEST_FILE: &str = "nginx-ingress-rbac.yaml";

fn namespaced(args: &str) -> String {
    kubectl(&format!("-n {} {}", INGRESS_NAMESPACE, args))
}

fn rollout_status() -> String {
    namespaced(&format!(
        "rollout status daemonset/{} --timeout=300s",
        INGRESS_DAEMONSET_NAME
    ))
}

impl NodeDeployer {
    /// Apply the ingress controller once the API answers
    pub async fn configure_ingress(
        &self,
        bootstrap: &Node,
        api_policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.sink
            .node_info(&bootstrap.name, "Configuring nginx-ingress DaemonSet");
        let session = self.connect(bootstrap).await?;
        let result = self
            .apply_ingress(&session, api_policy, cancel)
            .await;
        session.close().await;
        result
    }

    async fn apply_ingress(
        &self,
        session: &NodeSession,
        api_policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self
            .prober
            .await_api_ready(session, api_policy, cancel)
            .await
        {
            return Err(DeployError::Timeout(
                "API server not ready, ingress not applied".to_string(),
            ));
        }

        let remote = staging_path(INGRESS_MANIFEST_FILE);
        session
            .upload(ingress_manifest().as_bytes(), &remote)
            .await?;

        let applied = session
            .exec_checked(&kubectl(&format!("apply -f {}", shell_quote(&remote))))
            .await?;
        self.sink.node_output(session.node(), &applied.stdout);

        self.sink
            .node_info(session.node(), "Waiting for ingress DaemonSet rollout");
        let rollout = session.exec(&rollout_status()).await?;
        if rollout.success() {
            self.sink.node_output(session.node(), &rollout.stdout);
        } else {
            self.sink.node_warn(
                session.node(),
                &format!("Rollout not complete: {}", rollout.combined().trim()),
            );
        }

        let status = session
            .exec(&namespaced("get daemonset,pods -o wide"))
            .await?;
        self.sink.node_output(session.node(), &status.stdout);

        session
            .exec(&format!("rm -f {}", shell_quote(&remote)))
            .await?;
        self.sink
            .node_info(session.node(), "nginx-ingress configured");
        Ok(())
    }

    /// Re-apply ingress RBAC and restart the controller
    pub async fn fix_ingress_rbac(&self, bootstrap: &Node) -> Result<()> {
        self.sink
            .node_info(&bootstrap.name, "Re-applying nginx-ingress RBAC");
        let session = self.connect(bootstrap).await?;
        let result = async {
            let remote = staging_path(RBAC_MANIFEST_FILE);
            session
                .upload(ingress_rbac_manifest().as_bytes(), &remote)
                .await?;
            let applied = session
                .exec_checked(&kubectl(&format!("apply -f {}", shell_quote(&remote))))
                .await?;
            self.sink.node_output(session.node(), &applied.stdout);

            session
                .exec_checked(&namespaced(&format!(
                    "rollout restart daemonset/{}",
                    INGRESS_DAEMONSET_NAME
                )))
                .await?;
            let rollout = session.exec(&rollout_status()).await?;
            self.sink.node_output(session.node(), &rollout.combined());

            let pods = session.exec(&namespaced("get pods")).await?;
            self.sink.node_output(session.node(), &pods.stdout);

            let errors = session
                .exec(&namespaced(&format!(
                    "logs daemonset/{} --tail=10 2>&1 | grep -E \"(error|Error|forbidden|Forbidden)\" || echo \"No permission errors found\"",
                    INGRESS_DAEMONSET_NAME
                )))
                .await?;
            self.sink.node_output(session.node(), &errors.stdout);

            session
                .exec(&format!("rm -f {}", shell_quote(&remote)))
                .await?;
            Ok::<(), DeployError>(())
        }
        .await;
        session.close().await;
        result
    }
}

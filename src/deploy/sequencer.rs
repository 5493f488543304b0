//! Staged deployment pipeline
//!
//! Stages run strictly in order:
//!
//! 1. `init` on every node (servers, agents, load balancers)
//! 2. `deploy-lb`
//! 3. `deploy-bootstrap-server` on the first server
//! 4. `await-bootstrap-ready`
//! 5. `deploy-remaining-servers`
//! 6. `deploy-agents`
//! 7. `configure-ingress` on the bootstrap server
//!
//! Nodes within a stage share a bounded worker pool. A failing node never
//! stops the pipeline; its error is recorded in the report and the next node
//! or stage carries on.

use super::node_deployer::NodeDeployer;
use super::report::{BootstrapReadiness, DeploymentReport, NodeOutcome, Stage};
use crate::cluster::{ClusterConfig, Node, NodeGroups, ReadinessGate};
use crate::error::{DeployError, Result};
use crate::readiness::PollPolicy;
use crate::remote::RemoteExecutor;
use crate::sink::OutputSink;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Reason recorded for work cut short by the deadline
pub const DEADLINE_EXCEEDED: &str = "deployment deadline exceeded";

const BOOTSTRAP_NOT_READY: &str = "bootstrap server not ready";

/// Drives a cluster through the deployment stages
pub struct DeploymentSequencer {
    groups: NodeGroups,
    deployer: NodeDeployer,
    sink: Arc<dyn OutputSink>,
    report: Arc<DeploymentReport>,
    cancel: CancellationToken,
    /// Node position in the cluster file
    order: HashMap<String, usize>,
    concurrency: usize,
    gate: ReadinessGate,
    deadline: Option<Duration>,
    bootstrap_policy: PollPolicy,
    api_policy: PollPolicy,
}

impl DeploymentSequencer {
    pub fn new(
        cluster: ClusterConfig,
        executor: Arc<dyn RemoteExecutor>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let settings = cluster.deploy.clone();
        let groups = NodeGroups::from_config(&cluster);
        let order = cluster
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();
        let deployer = NodeDeployer::new(Arc::new(cluster), executor, sink.clone());

        Self {
            groups,
            deployer,
            sink,
            report: Arc::new(DeploymentReport::new()),
            cancel: CancellationToken::new(),
            order,
            concurrency: settings.concurrency.max(1),
            gate: settings.readiness_gate,
            deadline: settings.deadline(),
            bootstrap_policy: settings.bootstrap_wait.policy(),
            api_policy: settings.api_wait.policy(),
        }
    }

    /// Override the bootstrap and API wait policies
    pub fn with_policies(mut self, bootstrap: PollPolicy, api: PollPolicy) -> Self {
        self.bootstrap_policy = bootstrap;
        self.api_policy = api;
        self
    }

    /// Token that aborts the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn report(&self) -> Arc<DeploymentReport> {
        self.report.clone()
    }

    /// Run every stage and return the finished report
    pub async fn run(self) -> Arc<DeploymentReport> {
        self.sink.info(&format!(
            "Starting deployment {} ({} servers, {} agents, {} load balancers)",
            self.report.run_id(),
            self.groups.servers().len(),
            self.groups.agents().len(),
            self.groups.load_balancers().len()
        ));

        let timer = self.deadline.map(|deadline| {
            let cancel = self.cancel.clone();
            let sink = self.sink.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        sink.warn(&format!(
                            "Deadline of {}s reached, abandoning remaining work",
                            deadline.as_secs()
                        ));
                        cancel.cancel();
                    }
                }
            })
        });

        self.run_stage(Stage::Init, &self.groups.init_order(), |d, n| async move {
            d.init_node(&n).await
        })
        .await;

        self.run_stage(Stage::DeployLb, self.groups.load_balancers(), |d, n| async move {
            d.deploy_lb(&n).await
        })
        .await;

        let bootstrap = self.groups.bootstrap().cloned();
        let bootstrap_ready = match &bootstrap {
            Some(node) => {
                self.run_stage(
                    Stage::DeployBootstrapServer,
                    std::slice::from_ref(node),
                    |d, n| async move { d.deploy_rke2(&n, true).await },
                )
                .await;
                self.await_bootstrap(node).await
            }
            None => {
                self.sink.warn("No server nodes, skipping server stages");
                false
            }
        };

        let gate_closed =
            self.gate == ReadinessGate::Strict && bootstrap.is_some() && !bootstrap_ready;
        if gate_closed {
            self.sink.warn("Bootstrap server not ready, strict gate skips later stages");
        }

        if gate_closed {
            self.skip_stage(
                Stage::DeployRemainingServers,
                self.groups.remaining_servers(),
                BOOTSTRAP_NOT_READY,
            );
            self.skip_stage(Stage::DeployAgents, self.groups.agents(), BOOTSTRAP_NOT_READY);
        } else {
            self.run_stage(
                Stage::DeployRemainingServers,
                self.groups.remaining_servers(),
                |d, n| async move { d.deploy_rke2(&n, false).await },
            )
            .await;
            self.run_stage(Stage::DeployAgents, self.groups.agents(), |d, n| async move {
                d.deploy_rke2(&n, false).await
            })
            .await;
        }

        if let Some(node) = &bootstrap {
            if gate_closed {
                self.skip_stage(
                    Stage::ConfigureIngress,
                    std::slice::from_ref(node),
                    BOOTSTRAP_NOT_READY,
                );
            } else {
                let policy = self.api_policy;
                let cancel = self.cancel.clone();
                self.run_stage(Stage::ConfigureIngress, std::slice::from_ref(node), move |d, n| {
                    let cancel = cancel.clone();
                    async move { d.configure_ingress(&n, policy, &cancel).await }
                })
                .await;
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        self.report.finish();

        let counts = self.report.counts();
        self.sink.info(&format!(
            "Deployment {} done: {} succeeded, {} soft-failed, {} skipped",
            self.report.run_id(),
            counts.succeeded,
            counts.soft_failed,
            counts.skipped
        ));
        self.report
    }

    /// Re-apply ingress RBAC on the bootstrap server
    pub async fn fix_ingress_rbac(&self) -> Result<()> {
        let bootstrap = self
            .groups
            .bootstrap()
            .ok_or_else(|| DeployError::NodeNotFound("no server nodes configured".to_string()))?;
        self.deployer.fix_ingress_rbac(bootstrap).await
    }

    fn order_of(&self, node: &Node) -> usize {
        self.order.get(&node.name).copied().unwrap_or(usize::MAX)
    }

    fn skip_stage(&self, stage: Stage, nodes: &[Node], reason: &str) {
        for node in nodes {
            self.sink
                .node_warn(&node.name, &format!("{} skipped: {}", stage, reason));
            self.report
                .record(stage, self.order_of(node), &node.name, NodeOutcome::skipped(reason));
        }
    }

    async fn run_stage<F, Fut>(&self, stage: Stage, nodes: &[Node], work: F)
    where
        F: Fn(NodeDeployer, Node) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if nodes.is_empty() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.skip_stage(stage, nodes, DEADLINE_EXCEEDED);
            return;
        }

        self.sink
            .info(&format!("Stage {}: {} node(s)", stage, nodes.len()));

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(nodes.len());

        for node in nodes {
            let permits = permits.clone();
            let cancel = self.cancel.clone();
            let task = work(self.deployer.clone(), node.clone());

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return NodeOutcome::skipped(DEADLINE_EXCEEDED),
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(e) => return NodeOutcome::soft_failed(e.to_string()),
                    },
                };

                tokio::select! {
                    _ = cancel.cancelled() => NodeOutcome::soft_failed(DEADLINE_EXCEEDED),
                    result = task => match result {
                        Ok(()) => NodeOutcome::Succeeded,
                        Err(e) => NodeOutcome::soft_failed(e.to_string()),
                    },
                }
            });
            handles.push((node, handle));
        }

        for (node, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => NodeOutcome::soft_failed(format!("worker task failed: {}", e)),
            };
            match &outcome {
                NodeOutcome::Succeeded => {}
                NodeOutcome::SoftFailed { reason } => self
                    .sink
                    .node_error(&node.name, &format!("{} failed: {}", stage, reason)),
                NodeOutcome::Skipped { reason } => self
                    .sink
                    .node_warn(&node.name, &format!("{} skipped: {}", stage, reason)),
            }
            self.report
                .record(stage, self.order_of(node), &node.name, outcome);
        }
    }

    async fn await_bootstrap(&self, node: &Node) -> bool {
        let stage = Stage::AwaitBootstrapReady;
        if self.cancel.is_cancelled() {
            self.skip_stage(stage, std::slice::from_ref(node), DEADLINE_EXCEEDED);
            return false;
        }

        let outcome = self
            .deployer
            .prober()
            .wait_for_ready(node, self.bootstrap_policy, &self.cancel)
            .await;

        let entry = if outcome.ready {
            NodeOutcome::Succeeded
        } else if self.cancel.is_cancelled() {
            NodeOutcome::soft_failed(DEADLINE_EXCEEDED)
        } else {
            NodeOutcome::soft_failed(format!("not ready after {} attempts", outcome.attempts))
        };
        self.report
            .record(stage, self.order_of(node), &node.name, entry);
        self.report.set_bootstrap(BootstrapReadiness {
            node: node.name.clone(),
            ready: outcome.ready,
            attempts: outcome.attempts,
            last: outcome.last,
        });
        outcome.ready
    }
}

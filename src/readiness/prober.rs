//! Node readiness probing and bounded waits

use super::poll::{poll_until, PollPolicy};
use super::signals::{evaluate_readiness, ReadinessFacts, ReadinessResult};
use crate::cluster::Node;
use crate::error::Result;
use crate::remote::commands::{self, kubectl, kubectl_timeout, process_state};
use crate::remote::{NodeSession, RemoteExecutor};
use crate::sink::OutputSink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) fn containerd_query() -> String {
    process_state("containerd.*rke2")
}

pub(crate) fn kubelet_query() -> String {
    process_state("kubelet.*rke2")
}

pub(crate) fn node_count_query() -> String {
    kubectl("get nodes 2>/dev/null | wc -l")
}

pub(crate) fn etcd_query() -> String {
    kubectl("get nodes --selector node-role.kubernetes.io/etcd 2>/dev/null | grep -c Ready || echo 0")
}

pub(crate) fn api_query() -> String {
    kubectl_timeout(
        5,
        "cluster-info >/dev/null 2>&1 && echo \"responding\" || echo \"not_responding\"",
    )
}

fn api_wait_query() -> String {
    kubectl_timeout(10, "get nodes >/dev/null 2>&1 && echo \"ready\"")
}

/// Result of a bounded readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub ready: bool,
    /// Attempts made before returning
    pub attempts: u32,
    /// Last successfully collected result
    pub last: Option<ReadinessResult>,
}

/// How a startup monitor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Ready,
    /// systemd reported the service as failed
    Failed { logs: String },
    TimedOut,
    Cancelled,
}

impl StartupOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, StartupOutcome::Ready)
    }
}

/// Evaluates node readiness over remote sessions
#[derive(Clone)]
pub struct ReadinessProber {
    executor: Arc<dyn RemoteExecutor>,
    sink: Arc<dyn OutputSink>,
    connect_timeout: Duration,
}

impl ReadinessProber {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        sink: Arc<dyn OutputSink>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            sink,
            connect_timeout,
        }
    }

    /// Query every signal; failed queries leave the value empty
    pub async fn collect_facts(session: &NodeSession) -> ReadinessFacts {
        ReadinessFacts {
            containerd: session.query(&containerd_query()).await,
            kubelet: session.query(&kubelet_query()).await,
            node_lines: session.query(&node_count_query()).await,
            etcd_ready: session.query(&etcd_query()).await,
            api: session.query(&api_query()).await,
        }
    }

    /// Probe once over a fresh session
    pub async fn probe(&self, node: &Node) -> Result<ReadinessResult> {
        let session = NodeSession::open(self.executor.as_ref(), node, self.connect_timeout).await?;
        let facts = Self::collect_facts(&session).await;
        session.close().await;
        Ok(evaluate_readiness(&facts))
    }

    /// Poll until every signal holds on `node`
    pub async fn await_ready(&self, node: &Node, policy: PollPolicy, cancel: &CancellationToken) -> bool {
        self.wait_for_ready(node, policy, cancel).await.ready
    }

    /// [`Self::await_ready`] keeping the attempt count and last result
    pub async fn wait_for_ready(
        &self,
        node: &Node,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.sink.node_info(
            &node.name,
            &format!(
                "Waiting for node to become ready (up to {} attempts, {}s apart)",
                policy.max_attempts,
                policy.interval.as_secs()
            ),
        );

        let progress: Mutex<(u32, Option<ReadinessResult>)> = Mutex::new((0, None));

        let ready = poll_until(policy, cancel, |attempt| {
            let progress = &progress;
            async move {
                let probed = self.probe(node).await;
                let ready = match &probed {
                    Ok(result) if result.ready => {
                        self.sink.node_info(
                            &node.name,
                            &format!("Ready after {} attempt(s): {}", attempt, result.summary()),
                        );
                        true
                    }
                    Ok(result) => {
                        self.sink.node_info(
                            &node.name,
                            &format!(
                                "Attempt {}/{}: not ready ({})",
                                attempt,
                                policy.max_attempts,
                                result.summary()
                            ),
                        );
                        false
                    }
                    Err(e) => {
                        let kind = if e.is_connection() { "unreachable" } else { "probe failed" };
                        self.sink.node_warn(
                            &node.name,
                            &format!(
                                "Attempt {}/{}: {}: {}",
                                attempt, policy.max_attempts, kind, e
                            ),
                        );
                        false
                    }
                };
                if let Ok(mut slot) = progress.lock() {
                    slot.0 = attempt;
                    if let Ok(result) = probed {
                        slot.1 = Some(result);
                    }
                }
                ready
            }
        })
        .await;

        let (attempts, last) = progress.into_inner().unwrap_or_default();
        if !ready {
            if cancel.is_cancelled() {
                self.sink.node_warn(&node.name, "Readiness wait cancelled");
            } else {
                self.sink.node_warn(
                    &node.name,
                    &format!("Node did not become ready after {} attempts", attempts),
                );
            }
        }

        WaitOutcome {
            ready,
            attempts,
            last,
        }
    }

    /// Poll the API server over an existing session
    pub async fn await_api_ready(
        &self,
        session: &NodeSession,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> bool {
        let query = api_wait_query();
        let ready = poll_until(policy, cancel, |attempt| {
            let query = &query;
            async move {
                let ok = session.query(query).await.as_deref() == Some("ready");
                if !ok {
                    self.sink.node_info(
                        session.node(),
                        &format!("API server not ready ({}/{})", attempt, policy.max_attempts),
                    );
                }
                ok
            }
        })
        .await;

        if ready {
            self.sink.node_info(session.node(), "API server is ready");
        } else {
            self.sink.node_warn(session.node(), "API server did not become ready");
        }
        ready
    }

    /// Watch a starting server until ready, failed or out of time
    pub async fn monitor_startup(
        &self,
        node: &Node,
        budget: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> StartupOutcome {
        let unit = node.role.service_name().unwrap_or(commands::SERVER_UNIT);
        let started = Instant::now();
        let mut last_line = String::new();

        self.sink.node_info(
            &node.name,
            &format!("Monitoring {} startup for up to {}s", unit, budget.as_secs()),
        );

        loop {
            match NodeSession::open(self.executor.as_ref(), node, self.connect_timeout).await {
                Ok(session) => {
                    let outcome = self.monitor_step(&session, unit, &mut last_line).await;
                    session.close().await;
                    if let Some(outcome) = outcome {
                        return outcome;
                    }
                }
                Err(e) => self.sink.node_warn(&node.name, &e.to_string()),
            }

            if started.elapsed() + interval > budget {
                self.sink.node_warn(
                    &node.name,
                    &format!("{} not ready within {}s", unit, budget.as_secs()),
                );
                return StartupOutcome::TimedOut;
            }

            tokio::select! {
                _ = cancel.cancelled() => return StartupOutcome::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn monitor_step(
        &self,
        session: &NodeSession,
        unit: &str,
        last_line: &mut String,
    ) -> Option<StartupOutcome> {
        let failed = session
            .query(&format!("systemctl is-failed {} 2>/dev/null", unit))
            .await;
        if failed.as_deref() == Some("failed") {
            let logs = session
                .query(&format!("journalctl -u {} --no-pager -n 20 | tail -10", unit))
                .await
                .unwrap_or_default();
            self.sink.node_error(session.node(), &format!("{} failed", unit));
            self.sink.node_output(session.node(), &logs);
            return Some(StartupOutcome::Failed { logs });
        }

        let line = session
            .query(&format!(
                "journalctl -u {} --no-pager -n 1 --since \"30 seconds ago\" -o cat 2>/dev/null | tail -1",
                unit
            ))
            .await
            .unwrap_or_default();
        if !line.is_empty() && line != *last_line {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            self.sink
                .node_info(session.node(), &format!("[{}] {}", stamp, line));
            *last_line = line;
        }

        let result = evaluate_readiness(&Self::collect_facts(session).await);
        if result.ready {
            self.sink.node_info(session.node(), &format!("{} is ready", unit));
            return Some(StartupOutcome::Ready);
        }
        None
    }
}

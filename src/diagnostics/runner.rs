//! Read-only health checks against server nodes

use super::report::{CheckCategory, CheckStatus, DiagnosticMode, DiagnosticReport, NodeDiagnosis};
use crate::cluster::{ClusterConfig, Node, NodeGroups, API_PORT, KUBELET_PORT, REGISTRATION_PORT};
use crate::readiness::{evaluate_readiness, ReadinessProber, ReadinessSignal};
use crate::remote::commands::{
    journal, kubectl_timeout, ok_or_fail, port_listeners, process_state, unit_active,
    unit_enabled, SERVER_UNIT,
};
use crate::remote::{NodeSession, RemoteExecutor};
use crate::sink::OutputSink;
use std::sync::Arc;
use std::time::Duration;

const QUICK_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STANDARD_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const UNAVAILABLE: &str = "unavailable";

/// Runs diagnostics; never uploads or changes anything on a node
pub struct Diagnostics {
    executor: Arc<dyn RemoteExecutor>,
    sink: Arc<dyn OutputSink>,
}

impl Diagnostics {
    pub fn new(executor: Arc<dyn RemoteExecutor>, sink: Arc<dyn OutputSink>) -> Self {
        Self { executor, sink }
    }

    /// Diagnose the cluster's servers
    pub async fn run(&self, cluster: &ClusterConfig, mode: DiagnosticMode) -> DiagnosticReport {
        let groups = NodeGroups::from_config(cluster);
        let mut report = DiagnosticReport::new(mode);

        let targets: &[Node] = match mode {
            DiagnosticMode::Quick => groups
                .bootstrap()
                .map(std::slice::from_ref)
                .unwrap_or(&[]),
            DiagnosticMode::Standard | DiagnosticMode::Comprehensive => groups.servers(),
        };

        if targets.is_empty() {
            self.sink.warn("No server nodes found");
            return report;
        }

        for node in targets {
            self.sink
                .node_info(&node.name, &format!("Running {} diagnostics", mode));
            report.nodes.push(self.diagnose(node, mode).await);
        }
        report
    }

    async fn diagnose(&self, node: &Node, mode: DiagnosticMode) -> NodeDiagnosis {
        let mut diagnosis = NodeDiagnosis::new(&node.name, &node.address);
        let timeout = match mode {
            DiagnosticMode::Quick => QUICK_CONNECT_TIMEOUT,
            _ => STANDARD_CONNECT_TIMEOUT,
        };

        let session = match NodeSession::open(self.executor.as_ref(), node, timeout).await {
            Ok(session) => session,
            Err(e) => {
                self.sink.node_error(&node.name, &e.to_string());
                diagnosis.connection_error = Some(e.to_string());
                if mode == DiagnosticMode::Comprehensive {
                    for category in CheckCategory::EXTENDED {
                        diagnosis.push(category, "connection", UNAVAILABLE, CheckStatus::Failed);
                    }
                }
                return diagnosis;
            }
        };

        match mode {
            DiagnosticMode::Quick => quick_checks(&session, &mut diagnosis).await,
            DiagnosticMode::Standard => standard_checks(&session, &mut diagnosis).await,
            DiagnosticMode::Comprehensive => {
                standard_checks(&session, &mut diagnosis).await;
                extended_checks(&session, &mut diagnosis).await;
            }
        }
        session.close().await;
        diagnosis
    }
}

async fn quick_checks(session: &NodeSession, diagnosis: &mut NodeDiagnosis) {
    let service = session
        .query(&format!("systemctl is-active {}", SERVER_UNIT))
        .await;
    push_expected(diagnosis, CheckCategory::Service, SERVER_UNIT, service, "active");

    let api = session
        .query(&ok_or_fail(&kubectl_timeout(5, "cluster-info")))
        .await;
    push_expected(diagnosis, CheckCategory::Api, "cluster-info", api, "ok");
}

async fn standard_checks(session: &NodeSession, diagnosis: &mut NodeDiagnosis) {
    let active = session.query(&unit_active(SERVER_UNIT)).await;
    push_expected(diagnosis, CheckCategory::Service, "active", active, "active");
    let enabled = session.query(&unit_enabled(SERVER_UNIT)).await;
    push_expected(diagnosis, CheckCategory::Service, "enabled", enabled, "enabled");

    for process in ["containerd", "kubelet", "etcd"] {
        let state = session.query(&process_state(process)).await;
        push_expected(diagnosis, CheckCategory::Processes, process, state, "running");
    }
    let count = session
        .query("ps aux | grep -E \"(rke2|containerd|kubelet|etcd)\" | grep -v grep | wc -l")
        .await;
    push_info(diagnosis, CheckCategory::Processes, "process count", count);

    let logs = session
        .query(&journal(SERVER_UNIT, 5, "2 minutes ago"))
        .await;
    push_info(diagnosis, CheckCategory::Logs, "recent", logs);

    for port in [API_PORT, REGISTRATION_PORT, KUBELET_PORT] {
        let listeners = session.query(&port_listeners(port)).await;
        push_count(diagnosis, CheckCategory::Ports, &port.to_string(), listeners);
    }

    let readiness = evaluate_readiness(&ReadinessProber::collect_facts(session).await);
    let failing = readiness.failing();
    for signal in ReadinessSignal::ALL {
        let value = readiness
            .detail
            .get(&signal)
            .map(String::as_str)
            .unwrap_or(UNAVAILABLE);
        diagnosis.push(
            CheckCategory::Readiness,
            signal.label(),
            value,
            CheckStatus::from_bool(!failing.contains(&signal)),
        );
    }
    diagnosis.readiness = Some(readiness);

    let nodes = session
        .query(&kubectl_timeout(10, "get nodes --no-headers | wc -l"))
        .await;
    push_count(diagnosis, CheckCategory::Kubectl, "nodes", nodes);
}

async fn extended_checks(session: &NodeSession, diagnosis: &mut NodeDiagnosis) {
    let cpu = session
        .query("top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1")
        .await;
    push_info(diagnosis, CheckCategory::Resources, "cpu %", cpu);
    let memory = session
        .query("free | grep Mem | awk '{printf(\"%.1f%%\\n\", $3/$2 * 100.0)}'")
        .await;
    push_info(diagnosis, CheckCategory::Resources, "memory", memory);
    let load = session
        .query("uptime | awk -F'load average:' '{print $2}'")
        .await;
    push_info(diagnosis, CheckCategory::Resources, "load average", load);

    let usage = session
        .query("df -h / | tail -1 | awk '{print $5}'")
        .await;
    push_info(diagnosis, CheckCategory::Disk, "root usage", usage);
    let available = session
        .query("df -h / | tail -1 | awk '{print $4}'")
        .await;
    push_info(diagnosis, CheckCategory::Disk, "root available", available);

    let ping = session.query(&ok_or_fail("ping -c 1 -W 3 8.8.8.8")).await;
    push_expected(diagnosis, CheckCategory::Network, "internet", ping, "ok");
    let dns = session.query(&ok_or_fail("nslookup google.com")).await;
    push_expected(diagnosis, CheckCategory::Network, "dns", dns, "ok");
}

fn push_expected(
    diagnosis: &mut NodeDiagnosis,
    category: CheckCategory,
    name: &str,
    value: Option<String>,
    expected: &str,
) {
    let status = CheckStatus::from_bool(value.as_deref() == Some(expected));
    diagnosis.push(category, name, value.as_deref().unwrap_or(UNAVAILABLE), status);
}

fn push_count(
    diagnosis: &mut NodeDiagnosis,
    category: CheckCategory,
    name: &str,
    value: Option<String>,
) {
    let ok = value
        .as_deref()
        .and_then(|v| v.parse::<u32>().ok())
        .is_some_and(|n| n > 0);
    diagnosis.push(
        category,
        name,
        value.as_deref().unwrap_or(UNAVAILABLE),
        CheckStatus::from_bool(ok),
    );
}

fn push_info(
    diagnosis: &mut NodeDiagnosis,
    category: CheckCategory,
    name: &str,
    value: Option<String>,
) {
    match value {
        Some(value) => diagnosis.push(category, name, &value, CheckStatus::Info),
        None => diagnosis.push(category, name, UNAVAILABLE, CheckStatus::Warn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRole;
    use crate::remote::testing::{Call, FakeExecutor};
    use crate::sink::MemorySink;

    fn cluster() -> ClusterConfig {
        ClusterConfig::new(
            "secret",
            "10.0.0.100",
            vec![
                Node::new("s1", "10.0.0.1", NodeRole::Server),
                Node::new("s2", "10.0.0.2", NodeRole::Server),
                Node::new("a1", "10.0.0.3", NodeRole::Agent),
            ],
        )
    }

    fn diagnostics(fake: &FakeExecutor) -> Diagnostics {
        Diagnostics::new(Arc::new(fake.clone()), Arc::new(MemorySink::new()))
    }

    #[tokio::test]
    async fn test_quick_touches_first_server_only() {
        let fake = FakeExecutor::new();
        fake.respond("systemctl is-active", "active");
        fake.respond("cluster-info", "ok");

        let report = diagnostics(&fake)
            .run(&cluster(), DiagnosticMode::Quick)
            .await;

        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].node, "s1");
        assert!(report.nodes[0].is_healthy());
        assert_eq!(fake.touched_nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_standard_covers_every_server() {
        let fake = FakeExecutor::new();
        fake.ready_server("s1");

        let report = diagnostics(&fake)
            .run(&cluster(), DiagnosticMode::Standard)
            .await;

        let names: Vec<_> = report.nodes.iter().map(|n| n.node.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2"]);
        assert!(report.nodes[0].readiness.as_ref().unwrap().ready);
        assert!(!report.nodes[1].readiness.as_ref().unwrap().ready);
        assert!(!fake.touched_nodes().contains("a1"));
    }

    #[tokio::test]
    async fn test_comprehensive_adds_three_categories() {
        let fake = FakeExecutor::new();
        let diagnostics = diagnostics(&fake);

        let standard = diagnostics.run(&cluster(), DiagnosticMode::Standard).await;
        let comprehensive = diagnostics
            .run(&cluster(), DiagnosticMode::Comprehensive)
            .await;

        for (base, full) in standard.nodes.iter().zip(&comprehensive.nodes) {
            let extra: Vec<_> = full
                .categories()
                .into_iter()
                .filter(|c| !base.categories().contains(c))
                .collect();
            assert_eq!(extra, CheckCategory::EXTENDED.to_vec());
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_reported_and_evaluation_continues() {
        let fake = FakeExecutor::new();
        fake.set_unreachable("s1");

        let report = diagnostics(&fake)
            .run(&cluster(), DiagnosticMode::Comprehensive)
            .await;

        assert_eq!(report.nodes.len(), 2);
        let s1 = &report.nodes[0];
        assert!(s1.connection_error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(s1.categories(), CheckCategory::EXTENDED.to_vec());
        assert!(report.nodes[1].connection_error.is_none());
    }

    #[tokio::test]
    async fn test_zero_servers_is_empty_report() {
        let fake = FakeExecutor::new();
        let cluster = ClusterConfig::new(
            "secret",
            "10.0.0.100",
            vec![Node::new("a1", "10.0.0.3", NodeRole::Agent)],
        );

        for mode in [
            DiagnosticMode::Quick,
            DiagnosticMode::Standard,
            DiagnosticMode::Comprehensive,
        ] {
            let report = diagnostics(&fake).run(&cluster, mode).await;
            assert!(report.is_empty());
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_diagnostics_never_upload() {
        let fake = FakeExecutor::new();

        diagnostics(&fake)
            .run(&cluster(), DiagnosticMode::Comprehensive)
            .await;

        assert!(!fake
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Upload { .. })));
    }
}

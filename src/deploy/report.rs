//! Deployment report

use crate::readiness::ReadinessResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    DeployLb,
    DeployBootstrapServer,
    AwaitBootstrapReady,
    DeployRemainingServers,
    DeployAgents,
    ConfigureIngress,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::DeployLb => "deploy-lb",
            Stage::DeployBootstrapServer => "deploy-bootstrap-server",
            Stage::AwaitBootstrapReady => "await-bootstrap-ready",
            Stage::DeployRemainingServers => "deploy-remaining-servers",
            Stage::DeployAgents => "deploy-agents",
            Stage::ConfigureIngress => "configure-ingress",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one node in one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    Succeeded,
    SoftFailed { reason: String },
    Skipped { reason: String },
}

impl NodeOutcome {
    pub fn soft_failed(reason: impl Into<String>) -> Self {
        NodeOutcome::SoftFailed {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        NodeOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::Succeeded => write!(f, "succeeded"),
            NodeOutcome::SoftFailed { reason } => write!(f, "soft-failed: {}", reason),
            NodeOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// One (stage, node) entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub stage: Stage,
    /// Position of the node in the cluster file
    #[serde(skip)]
    pub order: usize,
    pub node: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
}

/// Result of waiting on the bootstrap server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReadiness {
    pub node: String,
    pub ready: bool,
    pub attempts: u32,
    /// Last collected signal values
    pub last: Option<ReadinessResult>,
}

/// Outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub soft_failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct ReportState {
    entries: Vec<ReportEntry>,
    bootstrap: Option<BootstrapReadiness>,
    finished_at: Option<DateTime<Utc>>,
}

/// Append-only record of a deployment run, shared by stage workers
#[derive(Debug)]
pub struct DeploymentReport {
    run_id: String,
    operator_host: String,
    started_at: DateTime<Utc>,
    state: Mutex<ReportState>,
}

impl Default for DeploymentReport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            operator_host: gethostname::gethostname().to_string_lossy().to_string(),
            started_at: Utc::now(),
            state: Mutex::new(ReportState::default()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ReportState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    pub fn record(&self, stage: Stage, order: usize, node: &str, outcome: NodeOutcome) {
        tracing::debug!("[{}] {}: {}", stage, node, outcome);
        self.with_state(|s| {
            s.entries.push(ReportEntry {
                stage,
                order,
                node: node.to_string(),
                outcome,
            })
        });
    }

    pub fn set_bootstrap(&self, readiness: BootstrapReadiness) {
        self.with_state(|s| s.bootstrap = Some(readiness));
    }

    pub fn bootstrap(&self) -> Option<BootstrapReadiness> {
        self.with_state(|s| s.bootstrap.clone())
    }

    pub fn finish(&self) {
        self.with_state(|s| s.finished_at = Some(Utc::now()));
    }

    /// Entries ordered by stage, then node position
    pub fn entries(&self) -> Vec<ReportEntry> {
        let mut entries = self.with_state(|s| s.entries.clone());
        entries.sort_by_key(|e| (e.stage, e.order));
        entries
    }

    /// Entries for one stage
    pub fn stage(&self, stage: Stage) -> Vec<ReportEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.stage == stage)
            .collect()
    }

    /// Outcome of `node` in `stage`
    pub fn outcome(&self, stage: Stage, node: &str) -> Option<NodeOutcome> {
        self.with_state(|s| {
            s.entries
                .iter()
                .find(|e| e.stage == stage && e.node == node)
                .map(|e| e.outcome.clone())
        })
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.with_state(|s| {
            s.entries
                .iter()
                .fold(OutcomeCounts::default(), |mut acc, e| {
                    match e.outcome {
                        NodeOutcome::Succeeded => acc.succeeded += 1,
                        NodeOutcome::SoftFailed { .. } => acc.soft_failed += 1,
                        NodeOutcome::Skipped { .. } => acc.skipped += 1,
                    }
                    acc
                })
        })
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        let (bootstrap, finished_at) = self.with_state(|s| (s.bootstrap.clone(), s.finished_at));
        ReportSnapshot {
            run_id: self.run_id.clone(),
            operator_host: self.operator_host.clone(),
            started_at: self.started_at,
            finished_at,
            counts: self.counts(),
            bootstrap,
            entries: self.entries(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Human-readable summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let counts = self.counts();
        out.push_str(&format!("Deployment {}\n", self.run_id));

        let mut current = None;
        for entry in self.entries() {
            if current != Some(entry.stage) {
                out.push_str(&format!("  {}\n", entry.stage));
                current = Some(entry.stage);
            }
            out.push_str(&format!("    {:<16} {}\n", entry.node, entry.outcome));
        }

        if let Some(bootstrap) = self.bootstrap() {
            out.push_str(&format!(
                "  bootstrap {} ready: {} ({} attempts)\n",
                bootstrap.node, bootstrap.ready, bootstrap.attempts
            ));
        }
        out.push_str(&format!(
            "  {} succeeded, {} soft-failed, {} skipped\n",
            counts.succeeded, counts.soft_failed, counts.skipped
        ));
        out
    }
}

/// Serializable view of a report
#[derive(Debug, Clone, Serialize)]
pub struct ReportSnapshot {
    pub run_id: String,
    pub operator_host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: OutcomeCounts,
    pub bootstrap: Option<BootstrapReadiness>,
    pub entries: Vec<ReportEntry>,
}

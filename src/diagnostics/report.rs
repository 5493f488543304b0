//! Diagnostic report types

use crate::error::{DeployError, Result};
use crate::readiness::ReadinessResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How much to check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticMode {
    /// Service and API on the first server only
    Quick,
    /// Full health check on every server
    #[default]
    Standard,
    /// Standard plus resources, disk and network
    Comprehensive,
}

impl DiagnosticMode {
    pub const NAMES: [&'static str; 3] = ["quick", "standard", "comprehensive"];
}

impl FromStr for DiagnosticMode {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quick" => Ok(DiagnosticMode::Quick),
            "standard" => Ok(DiagnosticMode::Standard),
            "comprehensive" => Ok(DiagnosticMode::Comprehensive),
            other => Err(DeployError::InvalidConfig(format!(
                "unknown diagnostic mode '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for DiagnosticMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticMode::Quick => "quick",
            DiagnosticMode::Standard => "standard",
            DiagnosticMode::Comprehensive => "comprehensive",
        };
        f.write_str(name)
    }
}

/// Group a check belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    Service,
    Api,
    Processes,
    Logs,
    Ports,
    Readiness,
    Kubectl,
    Resources,
    Disk,
    Network,
}

impl CheckCategory {
    /// Categories only checked in comprehensive mode
    pub const EXTENDED: [CheckCategory; 3] = [
        CheckCategory::Resources,
        CheckCategory::Disk,
        CheckCategory::Network,
    ];
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Failed,
    /// Informational value, no verdict
    Info,
}

impl CheckStatus {
    fn marker(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Failed => "FAIL",
            CheckStatus::Info => "info",
        }
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok {
            CheckStatus::Ok
        } else {
            CheckStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub category: CheckCategory,
    pub name: String,
    pub value: String,
    pub status: CheckStatus,
}

impl CheckResult {
    pub fn new(category: CheckCategory, name: &str, value: &str, status: CheckStatus) -> Self {
        Self {
            category,
            name: name.to_string(),
            value: value.to_string(),
            status,
        }
    }
}

/// Everything learned about one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDiagnosis {
    pub node: String,
    pub address: String,
    /// Set when no session could be opened
    pub connection_error: Option<String>,
    pub checks: Vec<CheckResult>,
    pub readiness: Option<ReadinessResult>,
}

impl NodeDiagnosis {
    pub fn new(node: &str, address: &str) -> Self {
        Self {
            node: node.to_string(),
            address: address.to_string(),
            connection_error: None,
            checks: Vec::new(),
            readiness: None,
        }
    }

    pub fn push(&mut self, category: CheckCategory, name: &str, value: &str, status: CheckStatus) {
        self.checks
            .push(CheckResult::new(category, name, value, status));
    }

    /// Distinct categories, in first-seen order
    pub fn categories(&self) -> Vec<CheckCategory> {
        let mut seen = Vec::new();
        for check in &self.checks {
            if !seen.contains(&check.category) {
                seen.push(check.category);
            }
        }
        seen
    }

    pub fn is_healthy(&self) -> bool {
        self.connection_error.is_none()
            && self.checks.iter().all(|c| c.status != CheckStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub mode: DiagnosticMode,
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<NodeDiagnosis>,
}

impl DiagnosticReport {
    pub fn new(mode: DiagnosticMode) -> Self {
        Self {
            mode,
            generated_at: Utc::now(),
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let mut out = format!(
            "RKE2 diagnostics ({}) at {}\n",
            self.mode,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if self.nodes.is_empty() {
            out.push_str("No server nodes found\n");
            return out;
        }

        for node in &self.nodes {
            out.push_str(&format!("\n{} ({})\n", node.node, node.address));
            if let Some(error) = &node.connection_error {
                out.push_str(&format!("  connection failed: {}\n", error));
            }

            let mut current = None;
            for check in &node.checks {
                if current != Some(check.category) {
                    out.push_str(&format!("  {}\n", check.category));
                    current = Some(check.category);
                }
                let mut lines = check.value.lines();
                let first = lines.next().unwrap_or("");
                out.push_str(&format!(
                    "    [{:<4}] {:<20} {}\n",
                    check.status.marker(),
                    check.name,
                    first
                ));
                for line in lines {
                    out.push_str(&format!("{:>33}{}\n", "", line));
                }
            }
        }

        let healthy = self.nodes.iter().filter(|n| n.is_healthy()).count();
        out.push_str(&format!(
            "\n{}/{} server(s) healthy\n",
            healthy,
            self.nodes.len()
        ));
        out
    }
}

//! Cluster configuration file

use super::settings::DeploySettings;
use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

/// Default cluster configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Kubernetes API server port
pub const API_PORT: u16 = 6443;
/// RKE2 supervisor registration port
pub const REGISTRATION_PORT: u16 = 9345;
/// Kubelet port
pub const KUBELET_PORT: u16 = 10250;
/// HAProxy stats page port
pub const LB_STATS_PORT: u16 = 8404;

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Control-plane server
    Server,
    /// Worker agent
    Agent,
    /// HAProxy load-balancer front-end
    Lb,
}

impl NodeRole {
    /// systemd unit the role installs, if any
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            NodeRole::Server => Some("rke2-server"),
            NodeRole::Agent => Some("rke2-agent"),
            NodeRole::Lb => None,
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Server => write!(f, "server"),
            NodeRole::Agent => write!(f, "agent"),
            NodeRole::Lb => write!(f, "lb"),
        }
    }
}

fn default_ssh_user() -> String {
    "root".to_string()
}

/// A machine in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node name, also used as the RKE2 node-name
    pub name: String,
    /// Address used for SSH and advertised to the cluster
    #[serde(rename = "ip")]
    pub address: String,
    /// Node role
    pub role: NodeRole,
    /// SSH login user
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
}

impl Node {
    pub fn new(name: &str, address: &str, role: NodeRole) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            role,
            ssh_user: default_ssh_user(),
        }
    }

    /// Reject names that are not a single safe path component
    ///
    /// The name becomes the artifact directory under the output directory,
    /// so it may only use `[A-Za-z0-9._-]` and may not be `.` or `..`.
    pub fn check_name(name: &str) -> Result<()> {
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if name.is_empty() || name == "." || name == ".." || !valid_chars {
            return Err(DeployError::InvalidConfig(format!(
                "invalid node name '{}': use letters, digits, '.', '_' or '-'",
                name
            )));
        }
        Ok(())
    }
}

/// Shared join secret
///
/// Never printed; `Debug` shows a fingerprint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterToken(String);

impl ClusterToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    /// The raw token value, for rendering into node configuration
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters of the token's SHA-256 digest
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest
            .iter()
            .take(6)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for ClusterToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClusterToken(sha256:{})", self.fingerprint())
    }
}

/// Cluster-wide configuration, loaded once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Shared join secret
    pub token: ClusterToken,
    /// Virtual endpoint for control-plane and registration traffic
    #[serde(rename = "loadbalancer_ip", default)]
    pub load_balancer_address: String,
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Operator settings
    #[serde(default)]
    pub deploy: DeploySettings,
}

impl ClusterConfig {
    pub fn new(token: &str, load_balancer_address: &str, nodes: Vec<Node>) -> Self {
        Self {
            token: ClusterToken::new(token),
            load_balancer_address: load_balancer_address.to_string(),
            nodes,
            deploy: DeploySettings::default(),
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::ConfigNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse_str(&content)?;
        tracing::debug!(
            "Loaded {} nodes from {} (token sha256:{})",
            config.nodes.len(),
            path.display(),
            config.token.fingerprint()
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse_str(content: &str) -> Result<Self> {
        let config: ClusterConfig = serde_yaml::from_str(content)
            .map_err(|e| DeployError::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(DeployError::InvalidConfig("token must not be empty".to_string()));
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(DeployError::InvalidConfig(format!(
                    "node with address '{}' has no name",
                    node.address
                )));
            }
            Node::check_name(&node.name)?;
            if node.address.trim().is_empty() {
                return Err(DeployError::InvalidConfig(format!(
                    "node '{}' has no ip",
                    node.name
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(DeployError::InvalidConfig(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        let servers = self.nodes.iter().filter(|n| n.role == NodeRole::Server).count();
        let joiners = self.nodes.len() - servers.min(1);
        if joiners > 0 && self.load_balancer_address.trim().is_empty() {
            return Err(DeployError::InvalidConfig(
                "loadbalancer_ip is required when nodes other than the bootstrap server are present"
                    .to_string(),
            ));
        }

        self.deploy.validate()
    }

    /// Find a node by name
    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| DeployError::NodeNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
token: "T"
loadbalancer_ip: 10.0.0.100
nodes:
  - name: s1
    ip: 10.0.0.1
    role: server
    ssh_user: ubuntu
  - name: a1
    ip: 10.0.0.3
    role: agent
"#;

    #[test]
    fn test_parse_sample() {
        let config = ClusterConfig::parse_str(SAMPLE).unwrap();
        assert_eq!(config.load_balancer_address, "10.0.0.100");
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].ssh_user, "ubuntu");
        assert_eq!(config.nodes[1].ssh_user, "root");
        assert_eq!(config.nodes[1].role, NodeRole::Agent);
        assert_eq!(config.token.expose(), "T");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let yaml = r#"
token: T
loadbalancer_ip: 10.0.0.100
nodes:
  - { name: x1, ip: 10.0.0.9, role: etcd }
"#;
        assert!(matches!(
            ClusterConfig::parse_str(yaml),
            Err(DeployError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
token: T
loadbalancer_ip: 10.0.0.100
nodes:
  - { name: s1, ip: 10.0.0.1, role: server }
  - { name: s1, ip: 10.0.0.2, role: server }
"#;
        assert!(matches!(
            ClusterConfig::parse_str(yaml),
            Err(DeployError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_path_like_names_rejected() {
        for name in ["../../escape", "a/b", "a\\b", "..", ".", "s 1"] {
            let yaml = format!(
                "token: T\nnodes:\n  - {{ name: '{}', ip: 10.0.0.1, role: server }}\n",
                name
            );
            assert!(
                matches!(
                    ClusterConfig::parse_str(&yaml),
                    Err(DeployError::InvalidConfig(_))
                ),
                "name {:?} was accepted",
                name
            );
        }
        assert!(Node::check_name("node-1.example_a").is_ok());
    }

    #[test]
    fn test_single_server_needs_no_load_balancer() {
        let yaml = r#"
token: T
nodes:
  - { name: s1, ip: 10.0.0.1, role: server }
"#;
        assert!(ClusterConfig::parse_str(yaml).is_ok());
    }

    #[test]
    fn test_agent_requires_load_balancer() {
        let yaml = r#"
token: T
nodes:
  - { name: s1, ip: 10.0.0.1, role: server }
  - { name: a1, ip: 10.0.0.3, role: agent }
"#;
        assert!(ClusterConfig::parse_str(yaml).is_err());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = ClusterToken::new("super-secret");
        let shown = format!("{:?}", token);
        assert!(!shown.contains("super-secret"));
        assert_eq!(token.fingerprint().len(), 12);
    }

    #[test]
    fn test_missing_file() {
        let result = ClusterConfig::load(Path::new("/nonexistent/config.yml"));
        assert!(matches!(result, Err(DeployError::ConfigNotFound(_))));
    }
}

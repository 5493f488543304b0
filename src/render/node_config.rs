//! RKE2 node configuration (`/etc/rancher/rke2/config.yaml`)

use super::RenderedConfig;
use crate::cluster::{ClusterConfig, Node, NodeRole, REGISTRATION_PORT};
use crate::error::{DeployError, Result};
use serde::Serialize;

/// CNI plugin installed on every server
pub const CNI_PLUGIN: &str = "canal";

/// File name of the rendered node configuration
pub const NODE_CONFIG_FILE: &str = "config.yaml";

/// Serialized shape of an RKE2 config file
///
/// Field order is the order keys appear in the output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Rke2Config<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    token: &'a str,
    node_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bind_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    advertise_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tls_san: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cni: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_kubeconfig_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_init: Option<bool>,
}

/// Renders per-node configuration from cluster-wide settings
pub struct ConfigGenerator<'a> {
    cluster: &'a ClusterConfig,
}

impl<'a> ConfigGenerator<'a> {
    pub fn new(cluster: &'a ClusterConfig) -> Self {
        Self { cluster }
    }

    /// Join URL for nodes registering through the load balancer
    pub fn join_url(&self) -> Result<String> {
        let lb = self.cluster.load_balancer_address.trim();
        if lb.is_empty() {
            return Err(DeployError::Config(
                "loadbalancer_ip is required to build the join URL".to_string(),
            ));
        }
        Ok(format!("https://{}:{}", lb, REGISTRATION_PORT))
    }

    /// Render the RKE2 configuration for a server or agent node
    pub fn render(&self, node: &Node, is_bootstrap: bool) -> Result<RenderedConfig> {
        if is_bootstrap && node.role != NodeRole::Server {
            return Err(DeployError::Config(format!(
                "node '{}' has role {} and cannot bootstrap the cluster",
                node.name, node.role
            )));
        }

        let token = self.cluster.token.expose();
        let config = match node.role {
            NodeRole::Server => {
                let server = if is_bootstrap {
                    None
                } else {
                    Some(self.join_url()?)
                };
                Rke2Config {
                    server,
                    token,
                    node_name: &node.name,
                    bind_address: Some("0.0.0.0"),
                    advertise_address: Some(&node.address),
                    tls_san: vec![
                        "0.0.0.0",
                        self.cluster.load_balancer_address.as_str(),
                        node.address.as_str(),
                    ]
                    .into_iter()
                    .filter(|san| !san.is_empty())
                    .collect(),
                    cni: Some(CNI_PLUGIN),
                    write_kubeconfig_mode: Some("0644"),
                    cluster_init: is_bootstrap.then_some(true),
                }
            }
            NodeRole::Agent => Rke2Config {
                server: Some(self.join_url()?),
                token,
                node_name: &node.name,
                bind_address: None,
                advertise_address: None,
                tls_san: Vec::new(),
                cni: None,
                write_kubeconfig_mode: None,
                cluster_init: None,
            },
            NodeRole::Lb => {
                return Err(DeployError::Config(format!(
                    "node '{}' is a load balancer; render its HAProxy configuration instead",
                    node.name
                )));
            }
        };

        Ok(RenderedConfig {
            node: node.clone(),
            file_name: NODE_CONFIG_FILE,
            text: serde_yaml::to_string(&config)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn cluster() -> ClusterConfig {
        ClusterConfig::new(
            "T",
            "10.0.0.100",
            vec![
                Node::new("s1", "10.0.0.1", NodeRole::Server),
                Node::new("s2", "10.0.0.2", NodeRole::Server),
                Node::new("a1", "10.0.0.3", NodeRole::Agent),
                Node::new("lb1", "10.0.0.50", NodeRole::Lb),
            ],
        )
    }

    fn parse(text: &str) -> serde_yaml::Mapping {
        match serde_yaml::from_str::<Value>(text).unwrap() {
            Value::Mapping(m) => m,
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_bootstrap_server_initializes_cluster() {
        let cluster = cluster();
        let rendered = ConfigGenerator::new(&cluster)
            .render(&cluster.nodes[0], true)
            .unwrap();
        let map = parse(&rendered.text);

        assert_eq!(map.get("cluster-init"), Some(&Value::Bool(true)));
        assert!(map.get("server").is_none());
        assert!(!rendered.text.contains("9345"));
        assert_eq!(map.get("advertise-address"), Some(&Value::from("10.0.0.1")));
        assert_eq!(map.get("bind-address"), Some(&Value::from("0.0.0.0")));
        assert_eq!(map.get("cni"), Some(&Value::from("canal")));
        assert_eq!(map.get("write-kubeconfig-mode"), Some(&Value::from("0644")));

        let sans: Vec<_> = map
            .get("tls-san")
            .unwrap()
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(sans, vec!["0.0.0.0", "10.0.0.100", "10.0.0.1"]);
    }

    #[test]
    fn test_joining_server_uses_load_balancer() {
        let cluster = cluster();
        let rendered = ConfigGenerator::new(&cluster)
            .render(&cluster.nodes[1], false)
            .unwrap();
        let map = parse(&rendered.text);

        assert_eq!(
            map.get("server"),
            Some(&Value::from("https://10.0.0.100:9345"))
        );
        assert!(map.get("cluster-init").is_none());
        assert!(map.get("tls-san").is_some());
        assert_eq!(rendered.file_name, "config.yaml");
    }

    #[test]
    fn test_agent_has_exactly_three_fields() {
        let cluster = cluster();
        let rendered = ConfigGenerator::new(&cluster)
            .render(&cluster.nodes[2], false)
            .unwrap();
        let map = parse(&rendered.text);

        let keys: Vec<_> = map.keys().map(|k| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["server", "token", "node-name"]);
        assert!(!rendered.text.contains("tls-san"));
        assert!(!rendered.text.contains("cni"));
    }

    #[test]
    fn test_bootstrap_requires_server_role() {
        let cluster = cluster();
        let result = ConfigGenerator::new(&cluster).render(&cluster.nodes[2], true);
        assert!(matches!(result, Err(DeployError::Config(_))));
    }

    #[test]
    fn test_load_balancer_not_rendered_here() {
        let cluster = cluster();
        let result = ConfigGenerator::new(&cluster).render(&cluster.nodes[3], false);
        assert!(matches!(result, Err(DeployError::Config(_))));
    }

    #[test]
    fn test_missing_load_balancer_address() {
        let mut cluster = cluster();
        cluster.load_balancer_address = String::new();
        let generator = ConfigGenerator::new(&cluster);

        assert!(generator.render(&cluster.nodes[0], true).is_ok());
        assert!(generator.render(&cluster.nodes[1], false).is_err());
        assert!(generator.render(&cluster.nodes[2], false).is_err());
    }
}

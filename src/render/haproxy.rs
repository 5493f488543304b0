//! HAProxy configuration for load-balancer nodes

use super::RenderedConfig;
use crate::cluster::{ClusterConfig, Node, NodeRole, API_PORT, LB_STATS_PORT, REGISTRATION_PORT};
use crate::error::{DeployError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::LazyLock;

/// File name of the rendered HAProxy configuration
pub const HAPROXY_CONFIG_FILE: &str = "haproxy.cfg";

const GLOBAL_SECTION: &str = "\
global
  daemon
  log stdout local0
  chroot /var/lib/haproxy
  stats socket /run/haproxy/admin.sock mode 660 level admin
  stats timeout 30s
  user haproxy
  group haproxy

defaults
  mode tcp
  log global
  option tcplog
  option dontlognull
  option log-health-checks
  timeout connect 5000ms
  timeout client 50000ms
  timeout server 50000ms
";

static MEMBER_SEPARATORS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").ok());

/// Backend member name derived from a server address
///
/// Every run of non-alphanumeric characters becomes a single `-`, so IPv4 and
/// IPv6 addresses both yield valid, distinct HAProxy identifiers.
pub fn backend_member_name(address: &str) -> String {
    let address = address.trim();
    let Some(separators) = MEMBER_SEPARATORS.as_ref() else {
        return format!("master-{}", address);
    };
    let normalized = separators.replace_all(address, "-");
    format!("master-{}", normalized.trim_matches('-'))
}

/// Render the HAProxy configuration for a load-balancer node
pub fn render_load_balancer(cluster: &ClusterConfig, lb: &Node) -> Result<RenderedConfig> {
    if lb.role != NodeRole::Lb {
        return Err(DeployError::Config(format!(
            "node '{}' has role {}, expected lb",
            lb.name, lb.role
        )));
    }
    if cluster.load_balancer_address.trim().is_empty() {
        return Err(DeployError::Config(
            "loadbalancer_ip is required for load-balancer nodes".to_string(),
        ));
    }

    let servers: Vec<&Node> = cluster
        .nodes
        .iter()
        .filter(|n| n.role == NodeRole::Server)
        .collect();
    if servers.is_empty() {
        return Err(DeployError::Config(format!(
            "load balancer '{}' has no server nodes to balance",
            lb.name
        )));
    }

    let mut members = Vec::with_capacity(servers.len());
    let mut seen = HashSet::new();
    for server in &servers {
        let member = backend_member_name(&server.address);
        if !seen.insert(member.clone()) {
            return Err(DeployError::Config(format!(
                "server address '{}' maps to duplicate backend member '{}'",
                server.address, member
            )));
        }
        members.push((member, server.address.as_str()));
    }

    let mut text = String::from(GLOBAL_SECTION);
    write_tcp_pair(&mut text, "Kubernetes API Server", "kubernetes-api", API_PORT, &members);
    write_tcp_pair(
        &mut text,
        "RKE2 Registration Server",
        "rke2-registration",
        REGISTRATION_PORT,
        &members,
    );
    let _ = write!(
        text,
        "
# Stats interface
frontend stats
  bind *:{port}
  mode http
  stats enable
  stats uri /stats
  stats refresh 30s
  stats admin if TRUE
",
        port = LB_STATS_PORT
    );

    Ok(RenderedConfig {
        node: lb.clone(),
        file_name: HAPROXY_CONFIG_FILE,
        text,
    })
}

fn write_tcp_pair(text: &mut String, title: &str, name: &str, port: u16, members: &[(String, &str)]) {
    let _ = write!(
        text,
        "
# {title}
frontend {name}
  bind *:{port}
  mode tcp
  default_backend {name}-backend

backend {name}-backend
  mode tcp
  balance roundrobin
  option tcp-check
"
    );
    for (member, address) in members {
        let _ = writeln!(text, "  server {} {}:{} check", member, address, port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_member_names() {
        assert_eq!(backend_member_name("10.0.0.1"), "master-10-0-0-1");
        assert_eq!(backend_member_name("fd00::1"), "master-fd00-1");
    }

    #[test]
    fn test_lists_every_server_on_both_ports() {
        let cluster = cluster();
        let rendered = render_load_balancer(&cluster, &cluster.nodes[3]).unwrap();

        assert_eq!(rendered.file_name, "haproxy.cfg");
        assert!(rendered.text.contains("bind *:6443"));
        assert!(rendered.text.contains("bind *:9345"));
        assert!(rendered.text.contains("bind *:8404"));
        assert!(rendered.text.contains("server master-10-0-0-1 10.0.0.1:6443 check"));
        assert!(rendered.text.contains("server master-10-0-0-2 10.0.0.2:6443 check"));
        assert!(rendered.text.contains("server master-10-0-0-1 10.0.0.1:9345 check"));
        assert!(rendered.text.contains("server master-10-0-0-2 10.0.0.2:9345 check"));
        assert!(!rendered.text.contains("10.0.0.3"));
    }

    #[test]
    fn test_requires_servers() {
        let cluster = ClusterConfig::new(
            "T",
            "10.0.0.100",
            vec![Node::new("lb1", "10.0.0.50", NodeRole::Lb)],
        );
        assert!(render_load_balancer(&cluster, &cluster.nodes[0]).is_err());
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let cluster = ClusterConfig::new(
            "T",
            "10.0.0.100",
            vec![
                Node::new("s1", "10.0.0.1", NodeRole::Server),
                Node::new("s1b", "10.0.0.1", NodeRole::Server),
                Node::new("lb1", "10.0.0.50", NodeRole::Lb),
            ],
        );
        assert!(render_load_balancer(&cluster, &cluster.nodes[2]).is_err());
    }

    #[test]
    fn test_rejects_non_lb_node() {
        let cluster = cluster();
        assert!(render_load_balancer(&cluster, &cluster.nodes[0]).is_err());
    }
}

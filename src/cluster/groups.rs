//! Role partition of the cluster's nodes

use super::config::{ClusterConfig, Node, NodeRole};

/// Nodes grouped by role, preserving declaration order
#[derive(Debug, Clone, Default)]
pub struct NodeGroups {
    servers: Vec<Node>,
    agents: Vec<Node>,
    load_balancers: Vec<Node>,
}

impl NodeGroups {
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::from_nodes(&config.nodes)
    }

    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut groups = Self::default();
        for node in nodes {
            match node.role {
                NodeRole::Server => groups.servers.push(node.clone()),
                NodeRole::Agent => groups.agents.push(node.clone()),
                NodeRole::Lb => groups.load_balancers.push(node.clone()),
            }
        }
        groups
    }

    pub fn servers(&self) -> &[Node] {
        &self.servers
    }

    pub fn agents(&self) -> &[Node] {
        &self.agents
    }

    pub fn load_balancers(&self) -> &[Node] {
        &self.load_balancers
    }

    /// The server that originates the cluster
    pub fn bootstrap(&self) -> Option<&Node> {
        self.servers.first()
    }

    /// Servers that join through the load balancer
    pub fn remaining_servers(&self) -> &[Node] {
        self.servers.get(1..).unwrap_or(&[])
    }

    /// Every node in initialization order: servers, agents, load balancers
    pub fn init_order(&self) -> Vec<Node> {
        self.servers
            .iter()
            .chain(self.agents.iter())
            .chain(self.load_balancers.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len() + self.agents.len() + self.load_balancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

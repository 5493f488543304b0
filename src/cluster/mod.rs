//! Cluster description: nodes, roles and operator settings

pub mod config;
pub mod groups;
pub mod settings;

pub use config::{
    ClusterConfig, ClusterToken, Node, NodeRole, API_PORT, DEFAULT_CONFIG_FILE, KUBELET_PORT,
    LB_STATS_PORT, REGISTRATION_PORT,
};
pub use groups::NodeGroups;
pub use settings::{DeploySettings, ReadinessGate, SshSettings, WaitSettings};

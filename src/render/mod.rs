//! Per-node artifact rendering
//!
//! Everything here is pure text generation: node configuration, HAProxy
//! configuration, install scripts and the ingress manifests. Writing the
//! results to disk and shipping them to nodes happens in `deploy`.

pub mod haproxy;
pub mod manifests;
pub mod node_config;
pub mod scripts;

use crate::cluster::Node;

pub use haproxy::{backend_member_name, render_load_balancer, HAPROXY_CONFIG_FILE};
pub use manifests::{ingress_manifest, ingress_rbac_manifest};
pub use node_config::{ConfigGenerator, NODE_CONFIG_FILE};
pub use scripts::{init_script, install_script, lb_install_script, INSTALL_SCRIPT_FILE};

/// Configuration text rendered for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Node the configuration belongs to
    pub node: Node,
    /// File name under the node's output directory
    pub file_name: &'static str,
    /// File contents
    pub text: String,
}

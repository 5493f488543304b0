//! rke2-deploy - Sequenced RKE2 cluster bootstrap
//!
//! Deploys an RKE2 cluster described by a small YAML file and reports on its
//! health afterwards:
//!
//! - Role-aware node configuration, HAProxy and install script rendering
//! - A staged deployment pipeline with a bounded worker pool per stage
//! - Multi-signal readiness gating on the bootstrap server
//! - Read-only diagnostics in quick, standard and comprehensive modes
//! - Remote execution over OpenSSH control-master sessions

pub mod cluster;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod readiness;
pub mod remote;
pub mod render;
pub mod sink;

pub use error::{DeployError, Result};

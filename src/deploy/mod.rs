//! Cluster deployment

pub mod artifacts;
pub mod ingress;
pub mod node_deployer;
pub mod report;
pub mod sequencer;

pub use artifacts::{write_node_artifacts, NodeArtifacts};
pub use node_deployer::NodeDeployer;
pub use report::{
    BootstrapReadiness, DeploymentReport, NodeOutcome, OutcomeCounts, ReportEntry,
    ReportSnapshot, Stage,
};
pub use sequencer::{DeploymentSequencer, DEADLINE_EXCEEDED};

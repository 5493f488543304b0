//! Error types for rke2-deploy

use thiserror::Error;

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

/// Deployment error types
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Connection to {node} failed: {message}")]
    Connection { node: String, message: String },

    #[error("Command on {node} exited with status {status}: {output}")]
    CommandFailed {
        node: String,
        status: i32,
        output: String,
    },

    #[error("Upload to {node}:{path} failed: {message}")]
    Upload {
        node: String,
        path: String,
        message: String,
    },

    #[error("Remote transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    /// Whether the error came from reaching the node rather than from work on it
    pub fn is_connection(&self) -> bool {
        matches!(self, DeployError::Connection { .. } | DeployError::Timeout(_))
    }
}

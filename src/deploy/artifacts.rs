//! Per-node artifacts written before upload

use crate::cluster::Node;
use crate::error::Result;
use crate::render::{RenderedConfig, INSTALL_SCRIPT_FILE};
use std::path::{Path, PathBuf};

/// Files written for one node
#[derive(Debug, Clone)]
pub struct NodeArtifacts {
    /// Rendered configuration file
    pub config: PathBuf,
    /// Install script
    pub install_script: PathBuf,
}

/// Write the rendered configuration and install script to `<output_dir>/<node>/`
pub async fn write_node_artifacts(
    output_dir: &Path,
    rendered: &RenderedConfig,
    install_script: &str,
) -> Result<NodeArtifacts> {
    Node::check_name(&rendered.node.name)?;
    let dir = output_dir.join(&rendered.node.name);
    tokio::fs::create_dir_all(&dir).await?;

    let config = dir.join(rendered.file_name);
    tokio::fs::write(&config, &rendered.text).await?;

    let script = dir.join(INSTALL_SCRIPT_FILE);
    tokio::fs::write(&script, install_script).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).await?;
    }

    tracing::debug!("Wrote artifacts for {} to {}", rendered.node.name, dir.display());
    Ok(NodeArtifacts {
        config,
        install_script: script,
    })
}

//! OpenSSH transport
//!
//! Each session runs one `ssh -M` control master. Commands and uploads are
//! multiplexed over its control socket, so a node is authenticated once per
//! session no matter how many commands run on it.

use super::commands::shell_quote;
use super::executor::{CommandOutput, RemoteExecutor, RemoteSession};
use crate::cluster::{Node, SshSettings};
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

const SSH_BINARY: &str = "ssh";

/// Exit status ssh uses for its own failures
const SSH_ERROR_STATUS: i32 = 255;

const MASTER_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Executor backed by the system `ssh` client
pub struct SshExecutor {
    settings: SshSettings,
    control_dir: PathBuf,
}

impl SshExecutor {
    pub fn new(settings: SshSettings) -> Result<Self> {
        let control_dir = std::env::temp_dir().join("rke2-deploy-ssh");
        std::fs::create_dir_all(&control_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&control_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self {
            settings,
            control_dir,
        })
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.settings.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                self.settings.strict_host_key_checking
            ),
        ];
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        for option in &self.settings.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn connect(&self, node: &Node, connect_timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        let id = Uuid::new_v4().simple().to_string();
        let socket = self.control_dir.join(format!("{}.sock", &id[..12]));
        let destination = format!("{}@{}", node.ssh_user, node.address);

        tracing::debug!("Starting ssh control master for {} at {}", node.name, destination);

        let mut master = Command::new(SSH_BINARY)
            .args(self.common_args())
            .arg("-o")
            .arg(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)))
            .arg("-M")
            .arg("-S")
            .arg(&socket)
            .arg("-N")
            .arg("--")
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeployError::Connection {
                node: node.name.clone(),
                message: format!("failed to spawn ssh: {}", e),
            })?;

        let deadline = Instant::now() + connect_timeout;
        loop {
            if let Some(status) = master.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    pipe.read_to_string(&mut stderr).await.ok();
                }
                return Err(DeployError::Connection {
                    node: node.name.clone(),
                    message: format!("ssh exited with {}: {}", status, stderr.trim()),
                });
            }

            if control_check(&socket, &destination).await {
                break;
            }

            if Instant::now() >= deadline {
                master.kill().await.ok();
                return Err(DeployError::Connection {
                    node: node.name.clone(),
                    message: format!("timed out after {}s", connect_timeout.as_secs()),
                });
            }
            tokio::time::sleep(MASTER_CHECK_INTERVAL).await;
        }

        Ok(Box::new(SshSession {
            node: node.name.clone(),
            destination,
            socket,
            command_timeout: Duration::from_secs(self.settings.command_timeout_secs),
            master: Mutex::new(Some(master)),
        }))
    }
}

async fn control_check(socket: &Path, destination: &str) -> bool {
    Command::new(SSH_BINARY)
        .arg("-S")
        .arg(socket)
        .arg("-O")
        .arg("check")
        .arg("--")
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

struct SshSession {
    node: String,
    destination: String,
    socket: PathBuf,
    command_timeout: Duration,
    master: Mutex<Option<Child>>,
}

impl SshSession {
    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new(SSH_BINARY);
        cmd.arg("-S")
            .arg(&self.socket)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("--")
            .arg(&self.destination)
            .arg(remote)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn transport_error(&self, status: Option<i32>, stderr: &[u8]) -> Option<DeployError> {
        (status == Some(SSH_ERROR_STATUS)).then(|| DeployError::Connection {
            node: self.node.clone(),
            message: String::from_utf8_lossy(stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        tracing::trace!("[{}] $ {}", self.node, command);
        let mut cmd = self.command(command);
        cmd.stdin(Stdio::null());

        let output = timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                DeployError::Timeout(format!(
                    "command on {} exceeded {}s",
                    self.node,
                    self.command_timeout.as_secs()
                ))
            })??;

        let code = output.status.code();
        if let Some(err) = self.transport_error(code, &output.stderr) {
            return Err(err);
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: code,
        })
    }

    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        let quoted = shell_quote(remote_path);
        let remote = match remote_path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => {
                format!("mkdir -p {} && cat > {}", shell_quote(dir), quoted)
            }
            _ => format!("cat > {}", quoted),
        };

        let upload_error = |message: String| DeployError::Upload {
            node: self.node.clone(),
            path: remote_path.to_string(),
            message,
        };

        let mut child = self
            .command(&remote)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| upload_error(format!("failed to spawn ssh: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(contents)
                .await
                .map_err(|e| upload_error(e.to_string()))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| upload_error(e.to_string()))?;
        }

        let output = timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| upload_error("timed out".to_string()))??;

        if let Some(err) = self.transport_error(output.status.code(), &output.stderr) {
            return Err(err);
        }
        if !output.status.success() {
            return Err(upload_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        tracing::debug!("Uploaded {} bytes to {}:{}", contents.len(), self.node, remote_path);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(mut master) = self.master.lock().await.take() else {
            return Ok(());
        };

        let exit = Command::new(SSH_BINARY)
            .arg("-S")
            .arg(&self.socket)
            .arg("-O")
            .arg("exit")
            .arg("--")
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if !matches!(exit, Ok(status) if status.success()) {
            master.kill().await.ok();
        }
        master.wait().await.ok();

        if self.socket.exists() {
            std::fs::remove_file(&self.socket).ok();
        }
        tracing::debug!("Closed ssh session to {}", self.node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_args() {
        let settings = SshSettings {
            port: 2222,
            identity_file: Some(PathBuf::from("/keys/id_ed25519")),
            options: vec!["UserKnownHostsFile=/dev/null".to_string()],
            ..Default::default()
        };
        let executor = SshExecutor::new(settings).unwrap();
        let args = executor.common_args();

        assert_eq!(&args[..2], &["-p", "2222"]);
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-i" && w[1] == "/keys/id_ed25519"));
        assert_eq!(args.last().unwrap(), "UserKnownHostsFile=/dev/null");
    }
}

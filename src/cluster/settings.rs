//! Operator settings (`deploy:` section of the cluster file)

use crate::error::{DeployError, Result};
use crate::readiness::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What a bootstrap node that never reports ready means for later stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessGate {
    /// Record the result and deploy the remaining nodes anyway
    #[default]
    Lenient,
    /// Skip remaining servers, agents and ingress
    Strict,
}

/// Attempt-bounded wait configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl WaitSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.max_attempts, Duration::from_secs(self.interval_secs))
    }
}

/// OpenSSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// SSH port
    pub port: u16,
    /// Private key passed with `-i`
    pub identity_file: Option<PathBuf>,
    /// StrictHostKeyChecking value
    pub strict_host_key_checking: String,
    /// Extra `-o` options
    pub options: Vec<String>,
    /// Upper bound for a single remote command
    pub command_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: 22,
            identity_file: None,
            strict_host_key_checking: "accept-new".to_string(),
            options: Vec::new(),
            command_timeout_secs: 1800,
        }
    }
}

/// Deployment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Directory for rendered per-node artifacts
    pub output_dir: PathBuf,
    /// Nodes worked on at once within a stage
    pub concurrency: usize,
    /// Bootstrap readiness gating policy
    pub readiness_gate: ReadinessGate,
    /// Overall pipeline deadline
    pub deadline_minutes: Option<u64>,
    /// Connect timeout for deployment sessions
    pub connect_timeout_secs: u64,
    /// Connect timeout for readiness probes
    pub probe_connect_timeout_secs: u64,
    /// Bootstrap node wait
    pub bootstrap_wait: WaitSettings,
    /// API wait before applying ingress
    pub api_wait: WaitSettings,
    /// Startup monitor poll interval
    pub monitor_interval_secs: u64,
    /// Transport settings
    pub ssh: SshSettings,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            concurrency: 4,
            readiness_gate: ReadinessGate::default(),
            deadline_minutes: None,
            connect_timeout_secs: 30,
            probe_connect_timeout_secs: 10,
            bootstrap_wait: WaitSettings {
                max_attempts: 30,
                interval_secs: 30,
            },
            api_wait: WaitSettings {
                max_attempts: 20,
                interval_secs: 15,
            },
            monitor_interval_secs: 30,
            ssh: SshSettings::default(),
        }
    }
}

impl DeploySettings {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(DeployError::InvalidConfig(
                "deploy.concurrency must be at least 1".to_string(),
            ));
        }
        if self.bootstrap_wait.max_attempts == 0 || self.api_wait.max_attempts == 0 {
            return Err(DeployError::InvalidConfig(
                "wait max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_connect_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_minutes.map(|m| Duration::from_secs(m * 60))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wait_timings() {
        let settings = DeploySettings::default();
        let bootstrap = settings.bootstrap_wait.policy();
        assert_eq!(bootstrap.max_attempts, 30);
        assert_eq!(bootstrap.interval, Duration::from_secs(30));

        let api = settings.api_wait.policy();
        assert_eq!(api.max_attempts, 20);
        assert_eq!(api.interval, Duration::from_secs(15));
        assert_eq!(settings.readiness_gate, ReadinessGate::Lenient);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let yaml = "concurrency: 2\nreadiness_gate: strict\n";
        let settings: DeploySettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.readiness_gate, ReadinessGate::Strict);
        assert_eq!(settings.connect_timeout_secs, 30);
        assert_eq!(settings.ssh.port, 22);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let settings = DeploySettings {
            concurrency: 0,
            ..DeploySettings::default()
        };
        assert!(settings.validate().is_err());
    }
}

//! Shell command builders for RKE2 nodes

/// kubectl shipped with RKE2
pub const KUBECTL: &str = "/var/lib/rancher/rke2/bin/kubectl";

/// Admin kubeconfig written by an RKE2 server
pub const KUBECONFIG: &str = "/etc/rancher/rke2/rke2.yaml";

/// Server systemd unit
pub const SERVER_UNIT: &str = "rke2-server";

/// Directory used for uploaded artifacts
pub const REMOTE_STAGING_DIR: &str = "/tmp";

/// Run kubectl against the node's own API server
pub fn kubectl(args: &str) -> String {
    format!("export KUBECONFIG={} && {} {}", KUBECONFIG, KUBECTL, args)
}

/// Run kubectl bounded by the coreutils `timeout`
pub fn kubectl_timeout(secs: u64, args: &str) -> String {
    format!(
        "export KUBECONFIG={} && timeout {} {} {}",
        KUBECONFIG, secs, KUBECTL, args
    )
}

/// Prints `running` or `not_running` for a process pattern
pub fn process_state(pattern: &str) -> String {
    format!(
        "pgrep -f \"{}\" >/dev/null 2>&1 && echo \"running\" || echo \"not_running\"",
        pattern
    )
}

/// Runs `command` and prints `ok` or `fail`
pub fn ok_or_fail(command: &str) -> String {
    format!("{} >/dev/null 2>&1 && echo ok || echo fail", command)
}

/// Number of listening TCP sockets on `port`
pub fn port_listeners(port: u16) -> String {
    format!("ss -tlnp | grep \":{}\" | wc -l", port)
}

/// `systemctl is-active` with a sentinel for missing units
pub fn unit_active(unit: &str) -> String {
    format!("systemctl is-active {} 2>/dev/null || echo 'not-found'", unit)
}

/// `systemctl is-enabled` with a sentinel for missing units
pub fn unit_enabled(unit: &str) -> String {
    format!("systemctl is-enabled {} 2>/dev/null || echo 'not-found'", unit)
}

/// Recent journal lines of a unit
pub fn journal(unit: &str, lines: usize, since: &str) -> String {
    format!(
        "journalctl -u {} --no-pager -n {} --since \"{}\"",
        unit, lines, since
    )
}

/// Path of an uploaded artifact
pub fn staging_path(file_name: &str) -> String {
    format!("{}/{}", REMOTE_STAGING_DIR, file_name)
}

/// Quote a string for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubectl_uses_rke2_kubeconfig() {
        assert_eq!(
            kubectl("get nodes"),
            "export KUBECONFIG=/etc/rancher/rke2/rke2.yaml && /var/lib/rancher/rke2/bin/kubectl get nodes"
        );
        assert!(kubectl_timeout(5, "cluster-info").contains("timeout 5 /var/lib/rancher"));
    }

    #[test]
    fn test_process_state() {
        assert_eq!(
            process_state("kubelet.*rke2"),
            "pgrep -f \"kubelet.*rke2\" >/dev/null 2>&1 && echo \"running\" || echo \"not_running\""
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(staging_path("install.sh"), "/tmp/install.sh");
    }
}

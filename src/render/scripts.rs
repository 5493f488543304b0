//! Shell scripts executed on the nodes

use crate::cluster::{Node, NodeRole, LB_STATS_PORT};
use crate::error::{DeployError, Result};

/// File name of the rendered install script
pub const INSTALL_SCRIPT_FILE: &str = "install.sh";

const RKE2_INSTALL: &str = r#"#!/bin/bash
set -e
echo "Installing RKE2 (__ROLE__) on __NODE__"

curl -sfL https://get.rke2.io | INSTALL_RKE2_TYPE=__ROLE__ sh -

mkdir -p /etc/rancher/rke2
cp /tmp/config.yaml /etc/rancher/rke2/config.yaml
chmod 600 /etc/rancher/rke2/config.yaml

systemctl enable __SERVICE__
systemctl restart __SERVICE__

echo "RKE2 __ROLE__ installed"
systemctl status __SERVICE__ --no-pager
"#;

const KUBECTL_SETUP: &str = r##"
echo "Configuring kubectl for root..."

# kubeconfig appears once the server has started (up to 60s)
for i in {1..12}; do
  if [ -f /etc/rancher/rke2/rke2.yaml ]; then
    break
  fi
  echo "  waiting for kubeconfig ($i/12)"
  sleep 5
done

if [ ! -f /etc/rancher/rke2/rke2.yaml ]; then
  echo "kubeconfig not found, configure kubectl manually later"
  exit 1
fi

ln -sf /var/lib/rancher/rke2/bin/kubectl /usr/local/bin/kubectl
chmod +x /usr/local/bin/kubectl

mkdir -p /root/.kube
cp /etc/rancher/rke2/rke2.yaml /root/.kube/config
chmod 600 /root/.kube/config
chown root:root /root/.kube/config

for rc in /root/.bashrc /root/.profile; do
  touch "$rc"
  if ! grep -q "KUBECONFIG" "$rc"; then
    echo "# RKE2 kubectl configuration" >> "$rc"
    echo "export KUBECONFIG=/root/.kube/config" >> "$rc"
    echo 'export PATH=/var/lib/rancher/rke2/bin:$PATH' >> "$rc"
  fi
done
if ! grep -q "alias k=kubectl" /root/.bashrc; then
  echo "alias k=kubectl" >> /root/.bashrc
fi

export KUBECONFIG=/root/.kube/config
export PATH=/var/lib/rancher/rke2/bin:$PATH

for i in {1..24}; do
  if kubectl cluster-info >/dev/null 2>&1; then
    echo "API server ready"
    break
  fi
  echo "  waiting for API server ($i/24)"
  sleep 5
done

if kubectl get nodes >/dev/null 2>&1; then
  echo "kubectl configured"
  kubectl get nodes
else
  echo "kubectl may need more time before it works"
fi
"##;

const HAPROXY_INSTALL: &str = r#"#!/bin/bash
set -e
echo "Installing HAProxy load balancer on __NODE__"

if command -v apt-get >/dev/null 2>&1; then
  apt-get update
  apt-get install -y haproxy
elif command -v yum >/dev/null 2>&1; then
  yum install -y haproxy
else
  echo "unsupported package manager"
  exit 1
fi

cp /etc/haproxy/haproxy.cfg /etc/haproxy/haproxy.cfg.backup
cp /tmp/haproxy.cfg /etc/haproxy/haproxy.cfg

haproxy -f /etc/haproxy/haproxy.cfg -c

systemctl enable haproxy
systemctl restart haproxy
systemctl status haproxy --no-pager

echo "Listening ports:"
ss -tlnp | grep -E ':6443|:9345|:__STATS_PORT__' || true

echo "HAProxy configured"
echo "Stats page: http://__ADDRESS__:__STATS_PORT__/stats"
"#;

const NODE_INIT: &str = r#"#!/bin/bash
set -e
echo "Initializing node __NODE__..."

echo "System information:"
echo "  hostname: $(hostname)"
echo "  os: $(grep PRETTY_NAME /etc/os-release | cut -d'=' -f2 | tr -d '\"')"
echo "  kernel: $(uname -r)"
echo "  cpus: $(nproc)"
echo "  memory: $(free -h | grep Mem | awk '{print $2}')"
echo "  disk free: $(df -h / | tail -1 | awk '{print $4}')"

echo "Node __NODE__ initialized"
"#;

/// Installer for a server or agent node
pub fn install_script(node: &Node) -> Result<String> {
    let service = node.role.service_name().ok_or_else(|| {
        DeployError::Config(format!(
            "node '{}' has role {} and has no RKE2 service",
            node.name, node.role
        ))
    })?;

    let mut script = RKE2_INSTALL
        .replace("__ROLE__", &node.role.to_string())
        .replace("__SERVICE__", service)
        .replace("__NODE__", &node.name);

    if node.role == NodeRole::Server {
        script.push_str(KUBECTL_SETUP);
    }
    Ok(script)
}

/// Installer for a load-balancer node
pub fn lb_install_script(node: &Node) -> String {
    HAPROXY_INSTALL
        .replace("__NODE__", &node.name)
        .replace("__ADDRESS__", &node.address)
        .replace("__STATS_PORT__", &LB_STATS_PORT.to_string())
}

/// Initialization script run on every node before deployment
pub fn init_script(node: &Node) -> String {
    NODE_INIT.replace("__NODE__", &node.name)
}

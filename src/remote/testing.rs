//! Scripted in-memory executor for tests

use super::executor::{CommandOutput, RemoteExecutor, RemoteSession};
use crate::cluster::Node;
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A call seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { node: String },
    Exec { node: String, command: String },
    Upload { node: String, path: String, contents: Vec<u8> },
    Close { node: String },
}

struct Rule {
    node: Option<String>,
    pattern: String,
    /// Responses served in order; the last one repeats
    responses: VecDeque<CommandOutput>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    unreachable: HashSet<String>,
    calls: Vec<Call>,
}

/// Executor answering commands from substring rules
///
/// Rules added later win over earlier ones. Unmatched commands succeed with
/// empty output.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<State>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_rule(&self, node: Option<&str>, pattern: &str, responses: Vec<CommandOutput>) {
        self.state.lock().unwrap().rules.push(Rule {
            node: node.map(str::to_string),
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    /// Answer `pattern` on every node
    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.add_rule(None, pattern, vec![CommandOutput::new(stdout, 0)]);
    }

    /// Answer `pattern` on one node
    pub fn respond_on(&self, node: &str, pattern: &str, stdout: &str) {
        self.add_rule(Some(node), pattern, vec![CommandOutput::new(stdout, 0)]);
    }

    /// Answer `pattern` on one node with a sequence of outputs
    pub fn respond_sequence(&self, node: &str, pattern: &str, stdouts: &[&str]) {
        let responses = stdouts.iter().map(|s| CommandOutput::new(s, 0)).collect();
        self.add_rule(Some(node), pattern, responses);
    }

    /// Fail `pattern` on every node
    pub fn fail(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.fail_on_node(None, pattern, exit_code, stderr);
    }

    /// Fail `pattern` on one node
    pub fn fail_on(&self, node: &str, pattern: &str, exit_code: i32, stderr: &str) {
        self.fail_on_node(Some(node), pattern, exit_code, stderr);
    }

    fn fail_on_node(&self, node: Option<&str>, pattern: &str, exit_code: i32, stderr: &str) {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        };
        self.add_rule(node, pattern, vec![output]);
    }

    /// Refuse connections to `node`
    pub fn set_unreachable(&self, node: &str) {
        self.state
            .lock()
            .unwrap()
            .unreachable
            .insert(node.to_string());
    }

    /// Make a server look fully up to the readiness probe
    pub fn ready_server(&self, node: &str) {
        self.respond_on(node, "containerd.*rke2", "running");
        self.respond_on(node, "kubelet.*rke2", "running");
        self.respond_on(node, "get nodes 2>/dev/null | wc -l", "2");
        self.respond_on(node, "node-role.kubernetes.io/etcd", "1");
        self.respond_on(node, "cluster-info", "responding");
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Commands run on `node`, in order
    pub fn execs(&self, node: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec { node: n, command } if n == node => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Paths uploaded to `node`, in order
    pub fn uploads(&self, node: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { node: n, path, .. } if n == node => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Contents of the last upload to `path` on `node`
    pub fn uploaded(&self, node: &str, path: &str) -> Option<String> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::Upload {
                node: n,
                path: p,
                contents,
            } if n == node && p == path => Some(String::from_utf8_lossy(&contents).into_owned()),
            _ => None,
        })
    }

    pub fn connect_count(&self, node: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Connect { node: n } if n == node))
            .count()
    }

    pub fn close_count(&self, node: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Close { node: n } if n == node))
            .count()
    }

    /// Nodes that were connected to at least once
    pub fn touched_nodes(&self) -> HashSet<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Connect { node } => Some(node),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn answer(&self, node: &str, command: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();
        let rule = state.rules.iter_mut().rev().find(|r| {
            r.node.as_deref().map_or(true, |n| n == node) && command.contains(&r.pattern)
        });
        match rule {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap(),
            Some(rule) => rule.responses.front().cloned().unwrap_or_default(),
            None => CommandOutput::new("", 0),
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn connect(&self, node: &Node, _timeout: Duration) -> Result<Box<dyn RemoteSession>> {
        self.record(Call::Connect {
            node: node.name.clone(),
        });
        if self.state.lock().unwrap().unreachable.contains(&node.name) {
            return Err(DeployError::Connection {
                node: node.name.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeSession {
            node: node.name.clone(),
            executor: self.clone(),
            closed: Mutex::new(false),
        }))
    }
}

struct FakeSession {
    node: String,
    executor: FakeExecutor,
    closed: Mutex<bool>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.executor.record(Call::Exec {
            node: self.node.clone(),
            command: command.to_string(),
        });
        Ok(self.executor.answer(&self.node, command))
    }

    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        self.executor.record(Call::Upload {
            node: self.node.clone(),
            path: remote_path.to_string(),
            contents: contents.to_vec(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.executor.record(Call::Close {
                node: self.node.clone(),
            });
        }
        Ok(())
    }
}

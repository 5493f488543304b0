//! Readiness signals and their evaluation

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One health signal, ordered the way it is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessSignal {
    ContainerdRunning,
    KubeletRunning,
    ApiNodeCountAboveThreshold,
    EtcdMemberReady,
    ApiServerResponding,
}

impl ReadinessSignal {
    pub const ALL: [ReadinessSignal; 5] = [
        ReadinessSignal::ContainerdRunning,
        ReadinessSignal::KubeletRunning,
        ReadinessSignal::ApiNodeCountAboveThreshold,
        ReadinessSignal::EtcdMemberReady,
        ReadinessSignal::ApiServerResponding,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReadinessSignal::ContainerdRunning => "containerd",
            ReadinessSignal::KubeletRunning => "kubelet",
            ReadinessSignal::ApiNodeCountAboveThreshold => "nodes",
            ReadinessSignal::EtcdMemberReady => "etcd",
            ReadinessSignal::ApiServerResponding => "api",
        }
    }
}

impl fmt::Display for ReadinessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw query output gathered from a node; `None` means the query failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessFacts {
    pub containerd: Option<String>,
    pub kubelet: Option<String>,
    /// Line count of `kubectl get nodes`, header included
    pub node_lines: Option<String>,
    /// Count of Ready etcd members
    pub etcd_ready: Option<String>,
    pub api: Option<String>,
}

impl ReadinessFacts {
    fn value(&self, signal: ReadinessSignal) -> Option<&str> {
        match signal {
            ReadinessSignal::ContainerdRunning => self.containerd.as_deref(),
            ReadinessSignal::KubeletRunning => self.kubelet.as_deref(),
            ReadinessSignal::ApiNodeCountAboveThreshold => self.node_lines.as_deref(),
            ReadinessSignal::EtcdMemberReady => self.etcd_ready.as_deref(),
            ReadinessSignal::ApiServerResponding => self.api.as_deref(),
        }
    }
}

/// Outcome of evaluating all five signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessResult {
    pub ready: bool,
    /// Raw value per signal, always five entries
    pub detail: BTreeMap<ReadinessSignal, String>,
}

impl ReadinessResult {
    /// Result for a node that could not be queried at all
    pub fn unreachable() -> Self {
        evaluate_readiness(&ReadinessFacts::default())
    }

    /// Signals that did not hold
    pub fn failing(&self) -> Vec<ReadinessSignal> {
        ReadinessSignal::ALL
            .into_iter()
            .filter(|s| !signal_holds(*s, self.detail.get(s).map(String::as_str)))
            .collect()
    }

    /// `containerd=running kubelet=running ...`
    pub fn summary(&self) -> String {
        self.detail
            .iter()
            .map(|(signal, value)| format!("{}={}", signal, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const UNAVAILABLE: &str = "unavailable";

fn first_count(value: &str) -> Option<u64> {
    value.lines().next()?.trim().parse().ok()
}

fn signal_holds(signal: ReadinessSignal, value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match signal {
        ReadinessSignal::ContainerdRunning | ReadinessSignal::KubeletRunning => {
            value.trim() == "running"
        }
        ReadinessSignal::ApiNodeCountAboveThreshold => first_count(value).is_some_and(|n| n > 1),
        ReadinessSignal::EtcdMemberReady => first_count(value).is_some_and(|n| n > 0),
        ReadinessSignal::ApiServerResponding => value.trim() == "responding",
    }
}

/// Ready iff every signal holds
pub fn evaluate_readiness(facts: &ReadinessFacts) -> ReadinessResult {
    let mut ready = true;
    let mut detail = BTreeMap::new();

    for signal in ReadinessSignal::ALL {
        let value = facts.value(signal);
        ready &= signal_holds(signal, value);
        detail.insert(
            signal,
            value.map(|v| v.trim().to_string()).unwrap_or_else(|| UNAVAILABLE.to_string()),
        );
    }

    ReadinessResult { ready, detail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> ReadinessFacts {
        ReadinessFacts {
            containerd: Some("running".into()),
            kubelet: Some("running".into()),
            node_lines: Some("2".into()),
            etcd_ready: Some("1".into()),
            api: Some("responding".into()),
        }
    }

    #[test]
    fn test_all_signals_ready() {
        let result = evaluate_readiness(&healthy());
        assert!(result.ready);
        assert!(result.failing().is_empty());
        assert_eq!(
            result.summary(),
            "containerd=running kubelet=running nodes=2 etcd=1 api=responding"
        );
    }

    #[test]
    fn test_each_signal_is_required() {
        let breakers: [fn(&mut ReadinessFacts); 5] = [
            |f| f.containerd = Some("not_running".into()),
            |f| f.kubelet = None,
            |f| f.node_lines = Some("1".into()),
            |f| f.etcd_ready = Some("0\n0".into()),
            |f| f.api = Some("not_responding".into()),
        ];

        for (signal, breaker) in ReadinessSignal::ALL.into_iter().zip(breakers) {
            let mut facts = healthy();
            breaker(&mut facts);
            let result = evaluate_readiness(&facts);
            assert!(!result.ready, "{} should block readiness", signal);
            assert_eq!(result.failing(), vec![signal]);
        }
    }

    #[test]
    fn test_detail_order_is_fixed() {
        let result = ReadinessResult::unreachable();
        assert!(!result.ready);
        let keys: Vec<_> = result.detail.keys().copied().collect();
        assert_eq!(keys, ReadinessSignal::ALL.to_vec());
        assert!(result.detail.values().all(|v| v == "unavailable"));
    }

    #[test]
    fn test_garbage_counts_are_not_ready() {
        let mut facts = healthy();
        facts.node_lines = Some("error: connection refused".into());
        assert!(!evaluate_readiness(&facts).ready);
    }
}

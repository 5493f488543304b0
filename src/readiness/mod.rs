//! Node readiness
//!
//! A node is ready when all five signals hold: containerd and kubelet are
//! running, the API lists more than a header line of nodes, at least one
//! etcd member is Ready and `kubectl cluster-info` answers. The evaluation
//! itself is pure and shared with diagnostics; the prober adds the remote
//! queries and bounded waits around it.

pub mod poll;
pub mod prober;
pub mod signals;

pub use poll::{poll_until, PollPolicy};
pub use prober::{ReadinessProber, StartupOutcome, WaitOutcome};
pub use signals::{evaluate_readiness, ReadinessFacts, ReadinessResult, ReadinessSignal};

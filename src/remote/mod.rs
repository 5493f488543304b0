//! Remote command execution on cluster nodes

pub mod commands;
pub mod executor;
pub mod session;
pub mod ssh;

#[cfg(test)]
pub mod testing;

pub use executor::{CommandOutput, RemoteExecutor, RemoteSession};
pub use session::NodeSession;
pub use ssh::SshExecutor;

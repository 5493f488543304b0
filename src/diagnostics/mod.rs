//! Read-only cluster diagnostics

pub mod report;
pub mod runner;

pub use report::{
    CheckCategory, CheckResult, CheckStatus, DiagnosticMode, DiagnosticReport, NodeDiagnosis,
};
pub use runner::Diagnostics;

//! Stack status classification.
//!
//! The control plane reports statuses such as `CREATE_IN_PROGRESS` or
//! `UPDATE_ROLLBACK_COMPLETE`. The wait loop only needs to know whether a
//! status is still moving, finished well, or finished badly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse phase of a stack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    /// An operation is still running
    InProgress,
    /// The last operation completed successfully
    Succeeded,
    /// The last operation failed or was rolled back
    Failed,
}

/// A stack status as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackStatus(String);

impl StackStatus {
    /// Wrap a raw status string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw status string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the status.
    ///
    /// `*_IN_PROGRESS` keeps the waiter polling. Any status naming a failure
    /// or a rollback is terminal-failed, even when the rollback itself
    /// completed. `DELETE_COMPLETE` means the stack is gone.
    pub fn phase(&self) -> StatusPhase {
        let s = self.0.as_str();
        if s.ends_with("_IN_PROGRESS") {
            StatusPhase::InProgress
        } else if s.contains("FAILED") || s.contains("ROLLBACK") || s.starts_with("DELETE_") {
            StatusPhase::Failed
        } else if s.ends_with("_COMPLETE") {
            StatusPhase::Succeeded
        } else {
            StatusPhase::Failed
        }
    }

    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.phase() != StatusPhase::InProgress
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StackStatus {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

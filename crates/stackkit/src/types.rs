//! Core types for template deployment.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::status::StackStatus;

/// A template declared for deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    /// Human-readable template name (e.g., "network")
    pub name: String,
    /// Path to the template file on disk
    pub local_path: PathBuf,
    /// Stack this template is reconciled against; unique within a batch
    pub stack_name: String,
}

impl TemplateDescriptor {
    /// Create a new descriptor.
    pub fn new(
        name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
            stack_name: stack_name.into(),
        }
    }
}

/// The ordered list of templates for one run.
///
/// Declared order is dependency order: a template may rely on
/// infrastructure created by any template before it.
#[derive(Debug, Clone, Default)]
pub struct TemplateBatch {
    templates: Vec<TemplateDescriptor>,
}

impl TemplateBatch {
    /// Build a batch, rejecting duplicate stack names.
    pub fn new(templates: Vec<TemplateDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for t in &templates {
            if !seen.insert(t.stack_name.as_str()) {
                return Err(Error::DuplicateStack(t.stack_name.clone()));
            }
        }
        Ok(Self { templates })
    }

    /// Templates in declared order.
    pub fn templates(&self) -> &[TemplateDescriptor] {
        &self.templates
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// A template that has been written to the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    /// The template that was uploaded
    pub descriptor: TemplateDescriptor,
    /// Object key in the content store
    pub key: String,
    /// URL the control plane reads the template from
    pub remote_url: String,
    /// BLAKE3 hex digest of the uploaded bytes
    pub digest: String,
    /// Size of the uploaded template in bytes
    pub size: u64,
}

/// Whether a stack exists before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackExistence {
    /// No stack with this name
    Absent,
    /// Stack exists with the given status
    Existing(StackStatus),
}

/// Which request is sent for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    /// The stack did not exist and is created
    Create,
    /// The stack existed and is updated
    Update,
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Acknowledgement that a template may create privileged resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// IAM resources with generated names
    #[serde(rename = "CAPABILITY_IAM")]
    Iam,
    /// IAM resources with custom names
    #[serde(rename = "CAPABILITY_NAMED_IAM")]
    NamedIam,
    /// Macros and nested transforms
    #[serde(rename = "CAPABILITY_AUTO_EXPAND")]
    AutoExpand,
}

impl Capability {
    /// Wire name of the capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Iam => "CAPABILITY_IAM",
            Capability::NamedIam => "CAPABILITY_NAMED_IAM",
            Capability::AutoExpand => "CAPABILITY_AUTO_EXPAND",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create a new stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackRequest {
    /// Stack name
    pub stack_name: String,
    /// URL of the uploaded template
    pub template_url: String,
    /// Capability grant
    pub capabilities: Vec<Capability>,
    /// Leave a failed creation in place instead of rolling it back
    pub disable_rollback: bool,
}

/// Request to update an existing stack.
///
/// There is no rollback override: a failed update rolls back to the last
/// good state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStackRequest {
    /// Stack name
    pub stack_name: String,
    /// URL of the uploaded template
    pub template_url: String,
    /// Capability grant
    pub capabilities: Vec<Capability>,
}

/// How a single reconcile ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    /// The stack converged
    Succeeded,
    /// The request was rejected
    Failed,
    /// The wait was interrupted; the remote operation continues unobserved
    Unknown,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of reconciling one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Stack name
    pub stack_name: String,
    /// Request that was sent
    pub action: ReconcileAction,
    /// How the reconcile ended
    pub terminal_state: TerminalState,
    /// Last status observed while waiting
    pub final_status: Option<StackStatus>,
    /// Error message when the request was rejected
    pub error: Option<String>,
    /// Time from submission to the end of the wait
    pub elapsed: Duration,
}

impl ReconcileOutcome {
    /// Whether the stack converged.
    pub fn is_success(&self) -> bool {
        self.terminal_state == TerminalState::Succeeded
    }
}

/// Preview of what a reconcile would do, without sending anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Stack name
    pub stack_name: String,
    /// Request a reconcile would send
    pub action: ReconcileAction,
    /// Current status, for existing stacks
    pub current_status: Option<StackStatus>,
}

/// Settings for the convergence wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits until the stack is terminal
    pub timeout: Option<Duration>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            timeout: None,
        }
    }
}

impl WaitConfig {
    /// Create a wait config.
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every declared stack converged
    Succeeded,
    /// At least one stack request was rejected
    Failed,
    /// A wait was interrupted before the batch finished
    Interrupted,
}

/// Report of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Artifacts uploaded, in declared order
    pub artifacts: Vec<UploadedArtifact>,
    /// One outcome per reconciled template, in declared order
    pub outcomes: Vec<ReconcileOutcome>,
}

impl RunReport {
    /// Overall status of the run.
    ///
    /// A run that stopped before reconciling every artifact was interrupted.
    pub fn status(&self) -> RunStatus {
        if self.outcomes.len() < self.artifacts.len()
            || self
                .outcomes
                .iter()
                .any(|o| o.terminal_state == TerminalState::Unknown)
        {
            RunStatus::Interrupted
        } else if self.outcomes.iter().all(ReconcileOutcome::is_success) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    /// Whether every declared stack converged.
    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Succeeded
    }

    /// Number of outcomes in a given terminal state.
    pub fn count(&self, state: TerminalState) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.terminal_state == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stack: &str, terminal_state: TerminalState) -> ReconcileOutcome {
        ReconcileOutcome {
            stack_name: stack.to_string(),
            action: ReconcileAction::Create,
            terminal_state,
            final_status: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_batch_rejects_duplicate_stack_names() {
        let err = TemplateBatch::new(vec![
            TemplateDescriptor::new("network", "network.yaml", "granta-network"),
            TemplateDescriptor::new("network-v2", "network2.yaml", "granta-network"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateStack(name) if name == "granta-network"));
    }

    #[test]
    fn test_batch_keeps_declared_order() {
        let batch = TemplateBatch::new(vec![
            TemplateDescriptor::new("network", "network.yaml", "granta-network"),
            TemplateDescriptor::new("cluster", "cluster.yaml", "granta-cluster"),
        ])
        .unwrap();
        let names: Vec<_> = batch.templates().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["network", "cluster"]);
    }

    #[test]
    fn test_run_status() {
        let mut report = RunReport::default();
        assert_eq!(report.status(), RunStatus::Succeeded);

        report.outcomes.push(outcome("a", TerminalState::Succeeded));
        assert!(report.is_success());

        report.outcomes.push(outcome("b", TerminalState::Failed));
        assert_eq!(report.status(), RunStatus::Failed);

        report.outcomes.push(outcome("c", TerminalState::Unknown));
        assert_eq!(report.status(), RunStatus::Interrupted);
        assert_eq!(report.count(TerminalState::Failed), 1);
    }

    #[test]
    fn test_capability_wire_names() {
        assert_eq!(Capability::Iam.as_str(), "CAPABILITY_IAM");
        let parsed: Vec<Capability> =
            serde_json::from_str(r#"["CAPABILITY_NAMED_IAM", "CAPABILITY_AUTO_EXPAND"]"#).unwrap();
        assert_eq!(parsed, [Capability::NamedIam, Capability::AutoExpand]);
    }
}

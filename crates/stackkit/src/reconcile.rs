//! Stack reconciliation.
//!
//! For one stack: describe it once, send a create or an update, then block
//! until the control plane reports a terminal status.
//!
//! ```text
//! describe ─┬─ absent   → create (rollback disabled) ─┐
//!           └─ existing → update                    ─┴─ wait → succeeded | failed
//! ```
//!
//! A rejected create/update only fails that stack. A stack that reaches a
//! terminal failure status after a successful submission is a
//! [`Error::Convergence`], which the orchestrator treats as fatal.

use std::time::Duration;

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::status::{StackStatus, StatusPhase};
use crate::types::{
    Capability, CreateStackRequest, ReconcileAction, ReconcileOutcome, ReconcilePlan,
    StackExistence, TemplateDescriptor, TerminalState, UpdateStackRequest, UploadedArtifact,
    WaitConfig,
};
use crate::wait::{CancelToken, Clock, SystemClock, WaitResult, wait_for_terminal};

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Capability grant sent with every request unless configured otherwise.
pub const DEFAULT_CAPABILITIES: &[Capability] = &[Capability::Iam];

/// Reconciles templates against live stacks.
pub struct StackReconciler<'a> {
    plane: &'a dyn ControlPlane,
    capabilities: Vec<Capability>,
    wait: WaitConfig,
    clock: &'a dyn Clock,
    cancel: CancelToken,
}

impl<'a> StackReconciler<'a> {
    /// Create a reconciler using the wall clock and the default capability
    /// grant.
    pub fn new(plane: &'a dyn ControlPlane, wait: WaitConfig, cancel: CancelToken) -> Self {
        Self {
            plane,
            capabilities: DEFAULT_CAPABILITIES.to_vec(),
            wait,
            clock: &SYSTEM_CLOCK,
            cancel,
        }
    }

    /// Use a different capability grant.
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Use a different clock for the wait loop.
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Whether an interrupt has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the stack exists right now.
    ///
    /// A transport failure is an error rather than a guess: creating over an
    /// existing stack or updating a missing one are both wrong.
    pub fn existence(&self, stack_name: &str) -> Result<StackExistence> {
        Ok(match self.plane.describe(stack_name)? {
            None => StackExistence::Absent,
            Some(status) => StackExistence::Existing(status),
        })
    }

    /// What [`reconcile`](Self::reconcile) would do, without sending anything.
    pub fn plan(&self, descriptor: &TemplateDescriptor) -> Result<ReconcilePlan> {
        let (action, current_status) = match self.existence(&descriptor.stack_name)? {
            StackExistence::Absent => (ReconcileAction::Create, None),
            StackExistence::Existing(status) => (ReconcileAction::Update, Some(status)),
        };
        Ok(ReconcilePlan {
            stack_name: descriptor.stack_name.clone(),
            action,
            current_status,
        })
    }

    /// Bring the artifact's stack to the uploaded template.
    ///
    /// `on_poll` sees every status observed while waiting.
    pub fn reconcile(
        &self,
        artifact: &UploadedArtifact,
        on_poll: &mut dyn FnMut(&StackStatus),
    ) -> Result<ReconcileOutcome> {
        let stack_name = artifact.descriptor.stack_name.as_str();
        let existence = self.existence(stack_name)?;

        let (action, submitted) = match &existence {
            StackExistence::Absent => {
                let request = CreateStackRequest {
                    stack_name: stack_name.to_string(),
                    template_url: artifact.remote_url.clone(),
                    capabilities: self.capabilities.clone(),
                    disable_rollback: true,
                };
                (ReconcileAction::Create, self.plane.create(&request))
            }
            StackExistence::Existing(status) => {
                log::debug!("{stack_name} exists ({status}), updating");
                let request = UpdateStackRequest {
                    stack_name: stack_name.to_string(),
                    template_url: artifact.remote_url.clone(),
                    capabilities: self.capabilities.clone(),
                };
                (ReconcileAction::Update, self.plane.update(&request))
            }
        };

        if let Err(e) = submitted {
            let err = Error::Submit {
                stack: stack_name.to_string(),
                action,
                message: e.to_string(),
            };
            log::warn!("{err}");
            return Ok(ReconcileOutcome {
                stack_name: stack_name.to_string(),
                action,
                terminal_state: TerminalState::Failed,
                final_status: match existence {
                    StackExistence::Existing(status) => Some(status),
                    StackExistence::Absent => None,
                },
                error: Some(err.to_string()),
                elapsed: Duration::ZERO,
            });
        }
        log::info!("Submitted {action} for {stack_name}");

        let started = self.clock.now();
        let waited = wait_for_terminal(
            self.plane,
            stack_name,
            &self.wait,
            self.clock,
            &self.cancel,
            on_poll,
        )?;
        let elapsed = self.clock.now().saturating_duration_since(started);

        match waited {
            WaitResult::Terminal(status) if status.phase() == StatusPhase::Succeeded => {
                Ok(ReconcileOutcome {
                    stack_name: stack_name.to_string(),
                    action,
                    terminal_state: TerminalState::Succeeded,
                    final_status: Some(status),
                    error: None,
                    elapsed,
                })
            }
            WaitResult::Terminal(status) => {
                let reason = self.plane.status_reason(stack_name).unwrap_or_else(|e| {
                    log::debug!("Could not fetch status reason for {stack_name}: {e}");
                    None
                });
                Err(Error::Convergence {
                    stack: stack_name.to_string(),
                    status: status.to_string(),
                    reason,
                })
            }
            WaitResult::Cancelled(last) => Ok(ReconcileOutcome {
                stack_name: stack_name.to_string(),
                action,
                terminal_state: TerminalState::Unknown,
                final_status: last,
                error: None,
                elapsed,
            }),
        }
    }
}

//! Deployment pipeline across a template batch.
//!
//! Three phases, each a hard gate on the next:
//! 1. Upload every template (first unreadable file or failed write aborts)
//! 2. Validate every upload as one batch (any failure aborts)
//! 3. Reconcile each template in declared order

use crate::artifact::ArtifactStore;
use crate::error::{Result, ValidationFailure};
use crate::reconcile::StackReconciler;
use crate::status::StackStatus;
use crate::types::{
    ReconcileOutcome, RunReport, TemplateBatch, TemplateDescriptor, TerminalState,
    UploadedArtifact,
};
use crate::validate::TemplateValidator;

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Writing templates to the content store
    Upload,
    /// Checking uploaded templates
    Validate,
    /// Creating/updating stacks
    Reconcile,
}

/// Progress callback for a deployment run.
///
/// Every callback is invoked from the orchestrator's thread, in declared
/// template order.
pub trait DeployProgress {
    /// A phase is starting for `count` templates.
    fn on_phase_start(&mut self, _phase: Phase, _count: usize) {}

    /// A template was uploaded.
    fn on_uploaded(&mut self, _artifact: &UploadedArtifact) {}

    /// A template was validated; `failure` is set if it did not pass.
    fn on_validated(&mut self, _artifact: &UploadedArtifact, _failure: Option<&ValidationFailure>) {
    }

    /// Reconciliation of a template is starting.
    fn on_reconcile_start(&mut self, _descriptor: &TemplateDescriptor) {}

    /// A status was observed while waiting on a stack.
    fn on_poll(&mut self, _stack_name: &str, _status: &StackStatus) {}

    /// Reconciliation of a template finished without a fatal error.
    fn on_reconcile_complete(&mut self, _outcome: &ReconcileOutcome) {}
}

/// No-op progress callback.
pub struct NoProgress;

impl DeployProgress for NoProgress {}

/// Runs the upload → validate → reconcile pipeline.
pub struct Orchestrator<'a> {
    store: ArtifactStore<'a>,
    validator: TemplateValidator<'a>,
    reconciler: StackReconciler<'a>,
    jobs: usize,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator. `jobs` bounds upload and validation
    /// parallelism; reconciliation is always sequential.
    pub fn new(
        store: ArtifactStore<'a>,
        validator: TemplateValidator<'a>,
        reconciler: StackReconciler<'a>,
        jobs: usize,
    ) -> Self {
        Self {
            store,
            validator,
            reconciler,
            jobs: jobs.max(1),
        }
    }

    /// Upload and validate every template without touching any stack.
    pub fn validate_only(
        &self,
        batch: &TemplateBatch,
        progress: &mut dyn DeployProgress,
    ) -> Result<Vec<UploadedArtifact>> {
        let artifacts = self.upload_phase(batch, progress)?;
        self.validate_phase(&artifacts, progress)?;
        Ok(artifacts)
    }

    /// Deploy the batch.
    ///
    /// Returns `Err` on any fatal error; dependent stacks later in the batch
    /// are not attempted. A rejected create/update is recorded in the report
    /// and the run moves on. An interrupted wait ends the run with an
    /// [`TerminalState::Unknown`] outcome; an interrupt between stacks ends
    /// it before the next submission.
    pub fn run(
        &self,
        batch: &TemplateBatch,
        progress: &mut dyn DeployProgress,
    ) -> Result<RunReport> {
        let artifacts = self.validate_only(batch, progress)?;

        progress.on_phase_start(Phase::Reconcile, artifacts.len());
        let mut outcomes = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            if self.reconciler.is_cancelled() {
                log::warn!(
                    "Interrupted before {}; no further stacks submitted",
                    artifact.descriptor.stack_name
                );
                break;
            }
            progress.on_reconcile_start(&artifact.descriptor);
            let stack_name = artifact.descriptor.stack_name.as_str();
            let mut on_poll = |status: &StackStatus| progress.on_poll(stack_name, status);
            let outcome = self.reconciler.reconcile(artifact, &mut on_poll)?;
            progress.on_reconcile_complete(&outcome);

            let interrupted = outcome.terminal_state == TerminalState::Unknown;
            outcomes.push(outcome);
            if interrupted {
                log::warn!("Interrupted while waiting on {stack_name}; skipping remaining stacks");
                break;
            }
        }

        Ok(RunReport {
            artifacts,
            outcomes,
        })
    }

    fn upload_phase(
        &self,
        batch: &TemplateBatch,
        progress: &mut dyn DeployProgress,
    ) -> Result<Vec<UploadedArtifact>> {
        progress.on_phase_start(Phase::Upload, batch.len());
        self.store
            .upload_all(batch, self.jobs, &mut |a| progress.on_uploaded(a))
    }

    fn validate_phase(
        &self,
        artifacts: &[UploadedArtifact],
        progress: &mut dyn DeployProgress,
    ) -> Result<()> {
        progress.on_phase_start(Phase::Validate, artifacts.len());
        self.validator
            .validate_all(artifacts, self.jobs, &mut |a, f| progress.on_validated(a, f))
    }
}

pub mod deploy;
pub mod status;
pub mod validate;

use anyhow::{Context as _, Result};
use indicatif::ProgressBar;

use stackkit::backend::aws::AwsCliBackend;
use stackkit::{
    DeployProgress, Error, Phase, ReconcileOutcome, StackStatus, TemplateBatch,
    TemplateDescriptor, TerminalState, UploadedArtifact, ValidationFailure,
};

use crate::Context;
use crate::config::{self, DeployConfig};
use crate::progress;
use crate::ui;

/// Loaded config plus the backend it points at.
pub struct Session {
    pub config: DeployConfig,
    pub batch: TemplateBatch,
    pub backend: AwsCliBackend,
}

impl Session {
    /// Load the config and connect to the `aws` CLI.
    pub fn open(ctx: &Context) -> Result<Self> {
        let path = config::locate(ctx.config.as_deref())?;
        log::info!("Loading config from {}", path.display());
        let config = DeployConfig::load(&path)?;
        let batch = config.batch()?;
        let backend = AwsCliBackend::new(config.target())
            .context("The aws CLI is required; install it and make sure it is in PATH")?;
        Ok(Self {
            config,
            batch,
            backend,
        })
    }

    /// Upload/validate parallelism, with an optional command-line override.
    pub fn jobs(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.jobs).max(1)
    }
}

/// Print a library error with its category advice.
pub fn report_error(err: &Error) {
    let category = err.category();
    ui::error(&format!("{}: {err}", category.description()));
    ui::dim(category.advice());
}

/// Terminal progress for a deployment run.
pub struct CliProgress {
    quiet: bool,
    verbose: bool,
    spinner: Option<ProgressBar>,
}

impl CliProgress {
    pub fn new(ctx: &Context) -> Self {
        Self {
            quiet: ctx.quiet,
            verbose: ctx.verbose > 0,
            spinner: None,
        }
    }

    /// Clear a spinner left running by a fatal error.
    pub fn abandon(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl DeployProgress for CliProgress {
    fn on_phase_start(&mut self, phase: Phase, count: usize) {
        if self.quiet {
            return;
        }
        let (num, msg) = match phase {
            Phase::Upload => (1, format!("Uploading {count} template(s)")),
            Phase::Validate => (2, format!("Validating {count} template(s)")),
            Phase::Reconcile => (3, format!("Reconciling {count} stack(s)")),
        };
        println!();
        ui::step(num, 3, &msg);
    }

    fn on_uploaded(&mut self, artifact: &UploadedArtifact) {
        if !self.quiet {
            ui::dim(&format!(
                "{} → {} ({})",
                artifact.descriptor.name,
                artifact.remote_url,
                ui::format_size(artifact.size)
            ));
            if self.verbose {
                ui::dim(&format!("  blake3 {}", artifact.digest));
            }
        }
    }

    fn on_validated(&mut self, artifact: &UploadedArtifact, failure: Option<&ValidationFailure>) {
        match failure {
            None if !self.quiet => ui::success(&artifact.descriptor.name),
            None => {}
            Some(failure) => ui::error(&failure.to_string()),
        }
    }

    fn on_reconcile_start(&mut self, descriptor: &TemplateDescriptor) {
        self.spinner = Some(progress::spinner(
            &format!("{} ({})", descriptor.stack_name, descriptor.name),
            self.quiet,
        ));
    }

    fn on_poll(&mut self, stack_name: &str, status: &StackStatus) {
        if let Some(pb) = &self.spinner {
            pb.set_message(format!("{stack_name}: {}", ui::status(status)));
        }
    }

    fn on_reconcile_complete(&mut self, outcome: &ReconcileOutcome) {
        let pb = self.spinner.take().unwrap_or_else(ProgressBar::hidden);
        let status = outcome
            .final_status
            .as_ref()
            .map_or_else(String::new, |s| format!(" {s}"));
        match outcome.terminal_state {
            TerminalState::Succeeded if self.quiet => pb.finish_and_clear(),
            TerminalState::Succeeded => progress::finish_success(
                &pb,
                &format!(
                    "{} {}d{status} in {}",
                    outcome.stack_name,
                    outcome.action,
                    ui::format_duration(outcome.elapsed)
                ),
            ),
            TerminalState::Failed => progress::finish_error(
                &pb,
                &format!(
                    "{} {} rejected: {}",
                    outcome.stack_name,
                    outcome.action,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            ),
            TerminalState::Unknown => progress::finish_warn(
                &pb,
                &format!(
                    "{} interrupted at{status}; the {} continues remotely",
                    outcome.stack_name, outcome.action
                ),
            ),
        }
    }
}

use anyhow::{Result, bail};

use stackkit::{ArtifactStore, CancelToken, Orchestrator, StackReconciler, TemplateValidator};

use super::{CliProgress, Session, report_error};
use crate::Context;
use crate::cli::ValidateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ValidateArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let config = &session.config;

    // Never reconciles, so the wait settings and cancel token are unused.
    let orchestrator = Orchestrator::new(
        ArtifactStore::new(&session.backend, config.key_prefix.as_str()),
        TemplateValidator::new(&session.backend),
        StackReconciler::new(&session.backend, config.wait_config(), CancelToken::new()),
        session.jobs(args.jobs),
    );

    let mut progress = CliProgress::new(ctx);
    match orchestrator.validate_only(&session.batch, &mut progress) {
        Ok(artifacts) => {
            println!();
            ui::success(&format!("{} template(s) valid", artifacts.len()));
            Ok(())
        }
        Err(e) => {
            println!();
            report_error(&e);
            bail!("Validation failed");
        }
    }
}

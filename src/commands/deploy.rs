use anyhow::{Result, bail};
use colored::Colorize;

use stackkit::{
    ArtifactStore, Orchestrator, ReconcileAction, RunReport, RunStatus, StackReconciler,
    TemplateValidator, TerminalState,
};

use super::{CliProgress, Session, report_error};
use crate::cli::DeployArgs;
use crate::Context;
use crate::interrupt;
use crate::ui;

pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let config = &session.config;
    let jobs = session.jobs(args.jobs);

    let cancel = interrupt::install();
    let reconciler = StackReconciler::new(&session.backend, config.wait_config(), cancel)
        .with_capabilities(config.capabilities.clone());

    show_plan(&session, &reconciler)?;

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let orchestrator = Orchestrator::new(
        ArtifactStore::new(&session.backend, config.key_prefix.as_str()),
        TemplateValidator::new(&session.backend),
        reconciler,
        jobs,
    );

    let mut progress = CliProgress::new(ctx);
    let report = match orchestrator.run(&session.batch, &mut progress) {
        Ok(report) => report,
        Err(e) => {
            progress.abandon();
            report_error(&e);
            bail!("Deployment aborted");
        }
    };

    print_summary(&report);

    match report.status() {
        RunStatus::Succeeded => Ok(()),
        RunStatus::Failed => bail!("One or more stacks were rejected"),
        RunStatus::Interrupted => bail!("Deployment interrupted"),
    }
}

/// Describe every stack and print what a deploy would do.
fn show_plan(session: &Session, reconciler: &StackReconciler<'_>) -> Result<()> {
    let config = &session.config;
    ui::header("Deploy plan");
    ui::kv("Region", &config.region);
    ui::kv("Bucket", &config.bucket);
    if let Some(profile) = &config.profile {
        ui::kv("Profile", profile);
    }
    println!();

    for descriptor in session.batch.templates() {
        let plan = match reconciler.plan(descriptor) {
            Ok(plan) => plan,
            Err(e) => {
                report_error(&e);
                bail!("Could not describe stack {}", descriptor.stack_name);
            }
        };
        let action = match plan.action {
            ReconcileAction::Create => "create".green(),
            ReconcileAction::Update => "update".yellow(),
        };
        let current = plan
            .current_status
            .as_ref()
            .map(|s| format!(" (currently {})", ui::status(s)))
            .unwrap_or_default();
        println!(
            "  {} {:<8} {}{}",
            "→".cyan(),
            action,
            plan.stack_name.bold(),
            current
        );
        ui::dim(&descriptor.local_path.display().to_string());
    }

    Ok(())
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    println!();
    let confirmed = Confirm::new()
        .with_prompt("Deploy these stacks?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

fn print_summary(report: &RunReport) {
    ui::section("Summary");
    for outcome in &report.outcomes {
        let status = outcome
            .final_status
            .as_ref()
            .map(|s| ui::status(s).to_string())
            .or_else(|| outcome.error.clone())
            .unwrap_or_default();
        println!(
            "  {} {} {} {}",
            ui::outcome_symbol(outcome.terminal_state),
            outcome.stack_name.bold(),
            outcome.action.to_string().dimmed(),
            status
        );
    }

    println!();
    let succeeded = report.count(TerminalState::Succeeded);
    let failed = report.count(TerminalState::Failed);
    let unknown = report.count(TerminalState::Unknown);
    match report.status() {
        RunStatus::Succeeded => ui::success(&format!("{succeeded} stack(s) deployed")),
        RunStatus::Failed => ui::warn(&format!("{succeeded} deployed, {failed} rejected")),
        RunStatus::Interrupted => ui::warn(&format!(
            "{succeeded} deployed, {failed} rejected, {unknown} left running remotely"
        )),
    }
}

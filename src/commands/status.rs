use anyhow::{Result, bail};
use colored::Colorize;

use stackkit::backend::ControlPlane;
use stackkit::{StatusPhase, TemplateDescriptor};

use super::{Session, report_error};
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let config = &session.config;

    ui::header("Stack status");
    ui::kv("Region", &config.region);
    println!();

    let mut missing = 0;
    let mut failing = 0;
    for descriptor in session.batch.templates() {
        match describe(&session, descriptor) {
            Ok(Row::Absent) => {
                missing += 1;
                println!(
                    "  {} {} {}",
                    "○".dimmed(),
                    descriptor.stack_name.bold(),
                    "not created".dimmed()
                );
            }
            Ok(Row::Present { status, reason }) => {
                let symbol = match status.phase() {
                    StatusPhase::Succeeded => "●".green(),
                    StatusPhase::InProgress => "◐".yellow(),
                    StatusPhase::Failed => {
                        failing += 1;
                        "●".red()
                    }
                };
                println!(
                    "  {} {} {}",
                    symbol,
                    descriptor.stack_name.bold(),
                    ui::status(&status)
                );
                if let Some(reason) = reason {
                    ui::dim(&reason);
                }
            }
            Err(e) => {
                report_error(&e);
                bail!("Could not describe stack {}", descriptor.stack_name);
            }
        }
    }

    if !ctx.quiet {
        println!();
        let total = session.batch.len();
        ui::info(&format!(
            "{total} declared, {missing} not created, {failing} in a failed state"
        ));
    }
    Ok(())
}

enum Row {
    Absent,
    Present {
        status: stackkit::StackStatus,
        reason: Option<String>,
    },
}

fn describe(session: &Session, descriptor: &TemplateDescriptor) -> stackkit::Result<Row> {
    let Some(status) = session.backend.describe(&descriptor.stack_name)? else {
        return Ok(Row::Absent);
    };
    // Only failed stacks get a reason lookup.
    let reason = if status.phase() == StatusPhase::Failed {
        session.backend.status_reason(&descriptor.stack_name)?
    } else {
        None
    };
    Ok(Row::Present { status, reason })
}

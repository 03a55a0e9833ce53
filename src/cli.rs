use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Upload, validate and deploy an ordered set of CloudFormation templates", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the deployment config
    #[arg(short, long, global = true, env = "STACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload, validate and reconcile every declared stack
    Deploy(DeployArgs),

    /// Upload and validate templates without touching any stack
    Validate(ValidateArgs),

    /// Show the current status of every declared stack
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    /// Show what would be created or updated without uploading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parallel uploads and validations (overrides the config)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Parallel uploads and validations (overrides the config)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_flags() {
        let cli = Cli::parse_from(["stackup", "-vv", "deploy", "--dry-run", "-j", "4"]);
        assert_eq!(cli.verbose, 2);
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert!(args.dry_run);
        assert!(!args.yes);
        assert_eq!(args.jobs, Some(4));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::parse_from(["stackup", "status", "--config", "prod.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("prod.toml")));
        assert!(matches!(cli.command, Command::Status));
    }
}

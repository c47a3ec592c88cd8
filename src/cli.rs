use crate::controls::Profile;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gke-conform")]
#[command(version)]
#[command(about = "Check a deployed GKE cluster against its declared outputs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate controls against an observation snapshot
    Check(CheckArgs),

    /// List the controls in a profile
    Controls {
        /// Profile to list
        #[arg(short, long, value_enum, default_value_t = Profile::All)]
        profile: Profile,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Declared outputs (JSON object or `terraform output -json`)
    #[arg(short, long, env = "GKE_CONFORM_DECLARATION")]
    pub declaration: PathBuf,

    /// Observed resource snapshot (JSON)
    #[arg(short, long, env = "GKE_CONFORM_OBSERVATIONS")]
    pub observations: PathBuf,

    /// Profile to run
    #[arg(short, long, value_enum, default_value_t = Profile::All)]
    pub profile: Profile,

    /// Only run these controls (comma-separated ids)
    #[arg(short, long, value_delimiter = ',')]
    pub controls: Option<Vec<String>>,

    /// Fail when a control with at least this impact fails
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Number of controls evaluated in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-call observation timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Settings file (defaults to the config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::parse_from([
            "gke-conform",
            "-vv",
            "check",
            "--declaration",
            "outputs.json",
            "--observations",
            "observed.json",
            "--profile",
            "sa",
            "--controls",
            "project,gcr_role",
            "--threshold",
            "1.0",
            "--format",
            "json",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.profile, Profile::Sa);
        assert_eq!(
            args.controls.as_deref(),
            Some(&["project".to_string(), "gcr_role".to_string()][..])
        );
        assert_eq!(args.threshold, Some(1.0));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.jobs.is_none());
    }

    #[test]
    fn test_controls_default_profile() {
        let cli = Cli::parse_from(["gke-conform", "controls"]);
        assert!(matches!(
            cli.command,
            Command::Controls {
                profile: Profile::All
            }
        ));
    }
}

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloudsync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative sync of cloud resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: ~/.config/cloudsync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Management API base URL
    #[arg(long, global = true, env = "CLOUDSYNC_HOST", hide_env_values = true)]
    pub host: Option<String>,

    /// API token
    #[arg(long, global = true, env = "CLOUDSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// User the calls are made on behalf of
    #[arg(long, global = true, env = "CLOUDSYNC_USER")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List resource kinds and their top-level fields
    Kinds {
        /// Only show this kind
        kind: Option<String>,
    },

    /// Print the request object for a config file
    Expand(FileArgs),

    /// Print the normalized config for a response body
    Flatten {
        #[command(flatten)]
        file: FileArgs,

        /// Config the response was written from
        #[arg(long, value_name = "FILE")]
        prior: Option<PathBuf>,
    },

    /// Show the change set between two config files, offline
    Diff {
        #[command(flatten)]
        kind: KindArg,

        /// Desired configuration
        desired: PathBuf,

        /// Observed configuration
        observed: PathBuf,

        /// Also show a line diff of both documents
        #[arg(long)]
        text: bool,
    },

    /// Parse a composite identifier and print its parts
    Id {
        #[command(flatten)]
        kind: KindArg,

        /// Composite identifier
        id: String,
    },

    /// Show what apply would change
    Plan(TargetArgs),

    /// Create or update the remote resource to match a config file
    Apply {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Show the plan without sending it
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Read the remote resource as normalized config
    Read(IdArgs),

    /// Delete the remote resource and wait until it is gone
    Destroy {
        #[command(flatten)]
        target: IdArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Adopt an existing remote resource into the state file
    Import(IdArgs),

    /// Inspect the local state file
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct KindArg {
    /// Resource kind, e.g. cloudfront_distribution
    #[arg(short, long)]
    pub kind: String,
}

#[derive(Args)]
pub struct FileArgs {
    #[command(flatten)]
    pub kind: KindArg,

    /// JSON or TOML document, `-` for stdin
    pub file: PathBuf,
}

#[derive(Args)]
pub struct TargetArgs {
    #[command(flatten)]
    pub file: FileArgs,

    /// Composite identifier of an existing resource
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct IdArgs {
    #[command(flatten)]
    pub kind: KindArg,

    /// Composite identifier
    #[arg(long)]
    pub id: String,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List managed resources
    List,

    /// Show the last recorded config of one resource
    Show {
        /// Composite identifier
        id: String,
    },
}

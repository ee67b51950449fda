// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "Build container images once and promote them through environments")]
#[command(version)]
pub struct Cli {
    /// Path to hoist.yml (discovered in the current directory by default)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to find the artifact being acted on.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ArtifactSource {
    /// Artifact file written by `hoist build`
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Digest of an artifact already recorded in the ledger
    #[arg(short, long)]
    pub digest: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new hoist.yml configuration file
    Init {
        /// Image repository, e.g. ghcr.io/acme/api
        #[arg(short, long)]
        image: Option<String>,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the version a build of this revision would get
    Resolve {
        /// Source control revision (commit SHA)
        #[arg(short, long)]
        revision: String,

        /// Explicit semantic version for release builds
        #[arg(long)]
        set_version: Option<String>,
    },

    /// Build an image for a revision and write the artifact file
    Build {
        #[arg(short, long)]
        revision: String,

        #[arg(long)]
        set_version: Option<String>,

        /// Build context (overrides build.context)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Push to the registry and verify the digest
        #[arg(long)]
        push: bool,

        /// Where to write the artifact file
        #[arg(short, long, default_value = "artifact.json")]
        output: PathBuf,
    },

    /// Push a locally built artifact's tags and verify the digest
    Push {
        /// Artifact file written by `hoist build`
        #[arg(short, long, default_value = "artifact.json")]
        artifact: PathBuf,

        /// Retries for registry outages
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Evaluate an environment's policy gate without promoting
    Gate {
        #[command(flatten)]
        source: ArtifactSource,

        /// Target environment
        #[arg(short, long)]
        env: String,
    },

    /// Promote an artifact into the next environment
    Promote {
        #[command(flatten)]
        source: ArtifactSource,

        /// Target environment
        #[arg(short, long)]
        env: String,

        /// Who is promoting (defaults to the automation actor)
        #[arg(long)]
        actor: Option<String>,

        /// Skip intermediate environments (requires allow_skip in config)
        #[arg(long)]
        skip: bool,

        /// Run the gate again instead of reusing a stored result
        #[arg(long)]
        reevaluate: bool,

        /// Retries for concurrent modifications and check failures
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Restore an earlier artifact in an environment
    #[command(group(clap::ArgGroup::new("target").required(true).args(["to", "previous"])))]
    Rollback {
        /// Environment to roll back
        #[arg(short, long)]
        env: String,

        /// Ledger record whose artifact to restore
        #[arg(long)]
        to: Option<u64>,

        /// Restore the newest earlier artifact that differs from the current one
        #[arg(long)]
        previous: bool,

        #[arg(long)]
        actor: Option<String>,

        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Show the current artifact of every environment
    Status,

    /// Show an environment's promotion history, newest first
    History {
        #[arg(short, long)]
        env: String,

        /// Maximum number of records to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

use clap::Parser;
use std::path::PathBuf;

/// Environment variable naming the configuration file
pub const ENV_CONFIG: &str = "USERSLICE_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "userslice")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Provision Unix accounts and systemd user-slice limits from a manifest",
    long_about = "Reads a manifest of users and, for every `present` user that does not \
                  exist yet, creates the group, account, home directory, SSH \
                  authorized_keys and a user-<id>.slice.d/override.conf drop-in. \
                  Finishes with `systemctl daemon-reload`."
)]
pub struct Cli {
    /// Manifest file (TOML, YAML or JSON)
    pub manifest: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Show what would be created without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Login shell for new accounts
    #[arg(long)]
    pub shell: Option<String>,

    /// Parent directory of the per-letter home buckets
    #[arg(long)]
    pub home_root: Option<String>,

    /// Directory receiving user-<id>.slice.d overrides
    #[arg(long)]
    pub policy_root: Option<String>,
}

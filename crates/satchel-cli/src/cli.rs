use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "satchel",
    version,
    about = "Encrypted push/pull between a working directory and remote object-store buckets",
    after_help = "\
A directory becomes a satchel repository once `satchel init` writes its
.satchel config. Branches name remote buckets; push encrypts and uploads
the working directory, pull selectively restores it."
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Initialize a satchel repository in the current directory
    Init {
        /// Remote connection string (e.g. file:///srv/satchel)
        #[arg(long)]
        conn_string: String,

        /// Path to a hex-encoded 32-byte key file, relative to the repository
        #[arg(long)]
        key_file: Option<String>,
    },

    /// List branches, or create one
    Branch {
        /// Branch to create
        name: Option<String>,
    },

    /// Switch the current branch
    Checkout {
        /// Create the branch if it does not exist
        #[arg(short = 'b')]
        create: bool,

        name: String,
    },

    /// Push the working directory to the remote (or migrate/<bucket>)
    Push {
        /// "origin" (default) or "migrate/<bucket>"
        target: Option<String>,

        /// Filter expression selecting documents to migrate server-side
        #[arg(short, long)]
        filter: Option<String>,

        /// Retry attempts for transient server errors
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Pull documents from the remote into the working directory
    Pull {
        /// Filter expression (e.g. "t('work') && s <= 1000000")
        #[arg(short, long)]
        filter: Option<String>,

        /// Random sample size (default 5)
        #[arg(long, default_value_t = 0)]
        sample: usize,

        /// Number of download workers
        #[arg(short, long, default_value_t = 1)]
        workers: usize,

        /// Mask pulled filenames with fresh UUIDs
        #[arg(short, long)]
        mask: bool,

        /// Describe the query without pulling data
        #[arg(short = 'd', long)]
        describe: bool,

        /// Describe the matching files without pulling data
        #[arg(short = 'n', long = "describe-files")]
        describe_files: bool,
    },

    /// Delete every file pushed under a commit sha
    Revert { sha: String },

    /// Securely remove the working directory's plaintext files
    Clean,

    /// Inspect or modify the repository configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Set a configuration value
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum ConfigKey {
    ConnString,
    KeyFile,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_pull_flags() {
        let cli = Cli::parse_from([
            "satchel", "pull", "-f", "t('work')", "--sample", "10", "-w", "4", "-m",
        ]);
        let Commands::Pull {
            filter,
            sample,
            workers,
            mask,
            describe,
            describe_files,
        } = cli.command
        else {
            panic!("expected pull");
        };
        assert_eq!(filter.as_deref(), Some("t('work')"));
        assert_eq!(sample, 10);
        assert_eq!(workers, 4);
        assert!(mask);
        assert!(!describe && !describe_files);
    }

    #[test]
    fn parses_migrate_target() {
        let cli = Cli::parse_from(["satchel", "push", "migrate/bucket-two"]);
        let Commands::Push { target, .. } = cli.command else {
            panic!("expected push");
        };
        assert_eq!(target.as_deref(), Some("migrate/bucket-two"));
    }

    #[test]
    fn parses_config_set() {
        let cli = Cli::parse_from(["satchel", "config", "set", "conn-string", "mem://"]);
        let Commands::Config {
            command: ConfigCommand::Set { key, value },
        } = cli.command
        else {
            panic!("expected config set");
        };
        assert!(matches!(key, ConfigKey::ConnString));
        assert_eq!(value, "mem://");
    }

    #[test]
    fn verbosity_accumulates() {
        let cli = Cli::parse_from(["satchel", "-vv", "clean"]);
        assert_eq!(cli.verbose, 2);
    }
}

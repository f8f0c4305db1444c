mod cli;
mod cmd;
mod progress;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommand};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            conn_string,
            key_file,
        } => cmd::init::run(&conn_string, key_file),
        Commands::Branch { name } => cmd::branch::run(name),
        Commands::Checkout { create, name } => cmd::checkout::run(&name, create),
        Commands::Push {
            target,
            filter,
            retries,
        } => cmd::push::run(target, filter, retries),
        Commands::Pull {
            filter,
            sample,
            workers,
            mask,
            describe,
            describe_files,
        } => cmd::pull::run(cmd::pull::PullFlags {
            filter,
            sample,
            workers,
            mask,
            describe,
            describe_files,
        }),
        Commands::Revert { sha } => cmd::revert::run(&sha),
        Commands::Clean => cmd::clean::run(),
        Commands::Config { command } => match command {
            ConfigCommand::Set { key, value } => cmd::config::set(key, value),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::use_self,
    clippy::used_underscore_binding,
    clippy::result_large_err
)]

mod build;
mod common;
mod create_signing_events;
mod delegate;
mod error;
mod import;
mod online_sign;
mod settings;
mod sign;
mod status;
mod update_targets;

use crate::error::Result;
use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use snafu::ResultExt;

/// This wrapper enables global options and initializes the logger before running any subcommand.
#[derive(Parser)]
#[command(version)]
struct Program {
    /// Set logging verbosity [trace|debug|info|warn|error]
    #[arg(name = "log-level", short, long, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    cmd: Command,
}

impl Program {
    fn run(self) -> Result<()> {
        TermLogger::init(
            self.log_level,
            ConfigBuilder::new().add_filter_allow_str("tufrepo").build(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
        .context(error::LoggerSnafu)?;
        self.cmd.run()
    }
}

#[derive(Debug, Parser)]
enum Command {
    /// Publish the current metadata into a client-servable layout
    Build(build::BuildArgs),
    /// Refresh snapshot and timestamp with the online keys
    OnlineSign(online_sign::OnlineSignArgs),
    /// Bump whichever offline-signed roles are due for a new signing event
    CreateSigningEvents(create_signing_events::CreateSigningEventsArgs),
    /// Reconcile an artifact tree against targets delegations
    UpdateTargets(update_targets::UpdateTargetsArgs),
    /// Print the signing status of every role
    Status(status::StatusArgs),
    /// Sign whichever roles this operator's keys still owe a signature
    Sign(sign::SignArgs),
    /// Manage a targets role's delegations
    Delegate(delegate::DelegateArgs),
    /// Backfill lifecycle and key-owner annotations on an imported repository
    Import(import::ImportArgs),
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Command::Build(args) => args.run(),
            Command::OnlineSign(args) => args.run(),
            Command::CreateSigningEvents(args) => args.run(),
            Command::UpdateTargets(args) => args.run(),
            Command::Status(args) => args.run(),
            Command::Sign(args) => args.run(),
            Command::Delegate(args) => args.run(),
            Command::Import(args) => args.run(),
        }
    }
}

fn main() -> std::process::ExitCode {
    match Program::parse().run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            std::process::ExitCode::FAILURE
        }
    }
}

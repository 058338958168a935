//! rtctl - periodic real-time thread tooling
//!
//! Measures wake-up latency of periodic threads, inspects the scheduling
//! class threads actually receive, and reads or changes process schedulers.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{CyclicArgs, PriorityArgs, SchedCommands};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "rtctl")]
#[command(about = "Periodic real-time thread control and latency measurement")]
#[command(version)]
#[command(long_about = "
rtctl drives the rtperiodic engine from the command line. It can run a
cyclictest-style latency measurement on a periodic thread, report the
scheduling class a thread receives at a given priority, and read or change
the scheduler of a process.

Real-time scheduling needs CAP_SYS_NICE or an rtprio limit on Linux. Without
it threads run under the default scheduler and a warning is logged.
Use --json for machine-readable output.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Thread configuration file (JSON)
    #[arg(long, global = true, env = "RTCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure wake-up latency of a periodic thread
    Cyclic(CyclicArgs),

    /// Report the scheduling a thread receives at a priority
    Priority(PriorityArgs),

    /// Process scheduler commands
    #[command(subcommand)]
    Sched(SchedCommands),

    /// Print the monotonic and realtime clocks
    Clock,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rtctl={log_level},rtperiodic={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            ExitCode::from(e.downcast_ref::<CliError>().map_or(1, CliError::exit_code))
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Cyclic(args) => commands::cyclic::execute(args, cli.config.as_deref(), cli.json),
        Commands::Priority(args) => commands::priority::execute(args, cli.json),
        Commands::Sched(cmd) => commands::sched::execute(cmd, cli.json),
        Commands::Clock => commands::clock::execute(cli.json),
    }
}

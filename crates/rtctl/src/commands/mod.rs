//! Command implementations for rtctl

pub mod clock;
pub mod cyclic;
pub mod priority;
pub mod sched;

use clap::{Args, Subcommand};
use rtperiodic::SchedulerAlgorithm;

#[derive(Args, Debug)]
pub struct CyclicArgs {
    /// Period between wake-ups in microseconds
    #[arg(short, long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_us: u64,

    /// Number of periods to measure
    #[arg(short, long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub loops: u64,

    /// Thread priority; defaults to the highest the policy allows
    #[arg(short, long)]
    pub priority: Option<i32>,

    /// CPUs to pin the measuring thread to
    #[arg(short, long, value_delimiter = ',')]
    pub affinity: Vec<usize>,

    /// Re-anchor the schedule after this many consecutive misses
    #[arg(long)]
    pub resync_after: Option<u32>,

    /// Lock process memory and hold a zero CPU DMA latency request
    #[arg(long)]
    pub harden: bool,
}

#[derive(Args, Debug)]
pub struct PriorityArgs {
    /// Priority to request; defaults to the highest the policy allows
    pub priority: Option<i32>,
}

#[derive(Subcommand, Debug)]
pub enum SchedCommands {
    /// Show the scheduler and priority of a process
    Get {
        /// Process id; 0 means rtctl itself
        #[arg(default_value_t = 0)]
        pid: i32,
    },

    /// Change the scheduler and priority of a process
    Set {
        /// Process id; 0 means rtctl itself
        pid: i32,
        /// Scheduling class (other, fifo, rr, batch, idle, deadline)
        algorithm: SchedulerAlgorithm,
        /// Class-relative priority
        priority: i32,
    },
}

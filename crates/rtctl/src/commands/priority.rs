//! Report the scheduling a thread actually receives

use std::sync::mpsc;

use anyhow::Result;
use rtperiodic::{
    PeriodicThread, RTResult, SchedulerAlgorithm, ThreadConfig, default_policy,
    maximum_priority, minimum_priority, process,
};
use serde::Serialize;

use crate::commands::PriorityArgs;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
pub struct PriorityReport {
    pub policy: &'static str,
    pub min_priority: i32,
    pub max_priority: i32,
    pub requested: i32,
    pub observed_scheduler: SchedulerAlgorithm,
    pub observed_priority: i32,
}

impl PriorityReport {
    /// Whether the thread runs in a real-time class at the requested priority.
    pub fn granted(&self) -> bool {
        self.observed_scheduler.is_realtime() && self.observed_priority == self.requested
    }
}

pub fn execute(args: &PriorityArgs, json: bool) -> Result<()> {
    let report = probe(args.priority)?;
    output::print_priority_report(&report, json)
}

fn probe(priority: Option<i32>) -> Result<PriorityReport, CliError> {
    let requested = match priority {
        Some(p) => p,
        None => maximum_priority()?,
    };

    let (tx, rx) = mpsc::sync_channel::<RTResult<(SchedulerAlgorithm, i32)>>(1);
    let mut thread = PeriodicThread::new(
        ThreadConfig::new(requested).with_name("probe"),
        Box::new(move |_| {
            let observed = process::current_thread_scheduler()
                .and_then(|class| Ok((class, process::current_thread_priority()?)));
            i32::from(tx.send(observed).is_err())
        }),
    )?;
    thread.start()?;
    let code = thread.join()?;
    let (observed_scheduler, observed_priority) = rx
        .try_recv()
        .map_err(|_| CliError::ThreadFailed(code))??;

    Ok(PriorityReport {
        policy: default_policy().name(),
        min_priority: minimum_priority()?,
        max_priority: maximum_priority()?,
        requested,
        observed_scheduler,
        observed_priority,
    })
}

//! Process scheduler passthrough

use std::io;

use anyhow::Result;
use rtperiodic::SchedulerAlgorithm;
use rtperiodic::process;
use serde::Serialize;
use tracing::info;

use crate::commands::SchedCommands;
use crate::error::CliError;
use crate::output;

/// Scheduling of one process.
#[derive(Debug, Serialize)]
pub struct SchedulerReport {
    pub pid: i32,
    pub algorithm: SchedulerAlgorithm,
    pub priority: i32,
}

pub fn execute(cmd: &SchedCommands, json: bool) -> Result<()> {
    match cmd {
        SchedCommands::Get { pid } => {
            let report = query(*pid)?;
            output::print_scheduler(&report, json)
        }
        SchedCommands::Set {
            pid,
            algorithm,
            priority,
        } => {
            process::set_process_scheduler(*pid, *algorithm, *priority)
                .map_err(|e| permission_aware(e, *pid))?;
            info!(pid, algorithm = %algorithm, priority, "process scheduler changed");
            let report = query(*pid)?;
            output::print_scheduler(&report, json)
        }
    }
}

fn query(pid: i32) -> Result<SchedulerReport, CliError> {
    let algorithm = process::process_scheduler(pid).map_err(|e| permission_aware(e, pid))?;
    let priority = process::process_priority(pid).map_err(|e| permission_aware(e, pid))?;
    Ok(SchedulerReport {
        pid,
        algorithm,
        priority,
    })
}

fn permission_aware(err: io::Error, pid: i32) -> CliError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        CliError::PermissionDenied(format!("cannot change scheduling of pid {pid}: {err}"))
    } else {
        CliError::IoError(err)
    }
}

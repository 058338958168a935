//! Clock readout

use anyhow::Result;
use serde::Serialize;

use crate::error::CliError;
use crate::output;

/// Both clocks read back to back.
#[derive(Debug, Serialize)]
pub struct ClockReport {
    pub monotonic_ns: i64,
    pub realtime_ns: i64,
}

pub fn execute(json: bool) -> Result<()> {
    let report = ClockReport {
        monotonic_ns: rtperiodic::clock::monotonic_nanos().map_err(CliError::from)?,
        realtime_ns: rtperiodic::clock::realtime_nanos().map_err(CliError::from)?,
    };
    output::print_clock(&report, json)
}

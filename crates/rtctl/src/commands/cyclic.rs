//! Cyclictest-style latency measurement

use std::fs;
use std::path::Path;
use std::sync::mpsc;

use anyhow::{Context, Result};
use rtperiodic::stats::DEFAULT_SAMPLE_CAPACITY;
use rtperiodic::{
    LatenessStats, LatenessSummary, OverrunPolicy, PeriodicParameters, PeriodicThread,
    RTResult, RtProcessSetup, SchedulerAlgorithm, ThreadConfig, ThreadContext, Timestamp, clock,
    maximum_priority, process,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::commands::CyclicArgs;
use crate::error::CliError;
use crate::output;

/// Result of one measurement run.
#[derive(Debug, Serialize)]
pub struct CyclicReport {
    pub thread: String,
    pub period_ns: u64,
    pub priority: i32,
    pub scheduler: SchedulerAlgorithm,
    pub memory_locked: bool,
    /// Largest deviation of a wake-to-wake interval from the period
    pub max_jitter_ns: u64,
    pub latency: LatenessSummary,
}

/// Measurements taken on the periodic thread itself.
struct Measurement {
    scheduler: SchedulerAlgorithm,
    max_jitter_ns: u64,
    latency: LatenessSummary,
}

pub fn execute(args: &CyclicArgs, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = build_config(args, config_path)?;
    let guard = args.harden.then(|| RtProcessSetup::default().apply());

    let report = run(config, args.loops)?;
    let report = CyclicReport {
        memory_locked: guard.as_ref().is_some_and(|g| g.memory_locked()),
        ..report
    };
    drop(guard);

    output::print_cyclic_report(&report, json)
}

/// Thread configuration from the optional file, overridden by flags.
fn build_config(args: &CyclicArgs, config_path: Option<&Path>) -> Result<ThreadConfig> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => ThreadConfig::new(maximum_priority().map_err(CliError::from)?),
    };

    if config.periodic.is_none() {
        config.periodic = Some(PeriodicParameters::new(Timestamp::from_nanos(
            args.interval_us.saturating_mul(1_000),
        )));
    }
    if config.name.is_none() {
        config.name = Some("cyclic".to_string());
    }
    if let Some(priority) = args.priority {
        config.priority = priority;
    }
    if !args.affinity.is_empty() {
        config.affinity = args.affinity.clone();
    }
    if let Some(n) = args.resync_after {
        config.overrun = OverrunPolicy::resync_after(n);
    }

    config.validate().map_err(CliError::from)?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<ThreadConfig> {
    let text = fs::read_to_string(path)
        .map_err(CliError::from)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: ThreadConfig = serde_json::from_str(&text).map_err(CliError::from)?;
    debug!(path = %path.display(), "loaded thread configuration");
    Ok(config)
}

fn run(config: ThreadConfig, loops: u64) -> Result<CyclicReport> {
    let priority = config.priority;
    let period = config
        .periodic
        .map(|p| p.period)
        .ok_or_else(|| CliError::InvalidConfiguration("cyclic needs a period".to_string()))?;

    let (tx, rx) = mpsc::sync_channel::<RTResult<Measurement>>(1);
    let mut thread = PeriodicThread::new(
        config,
        Box::new(move |ctx| {
            let result = measure(ctx, loops);
            let code = i32::from(result.is_err());
            if tx.send(result).is_err() {
                return 2;
            }
            code
        }),
    )
    .map_err(CliError::from)?;
    let name = thread.name().to_string();

    info!(thread = %name, period = %period, loops, "starting measurement");
    thread.start().map_err(CliError::from)?;
    let code = thread.join().map_err(CliError::from)?;

    let measurement = match rx.try_recv() {
        Ok(result) => result.map_err(CliError::from)?,
        Err(_) => return Err(CliError::ThreadFailed(code).into()),
    };
    if code != 0 {
        return Err(CliError::ThreadFailed(code).into());
    }

    Ok(CyclicReport {
        thread: name,
        period_ns: u64::try_from(period.as_nanos()).unwrap_or(u64::MAX),
        priority,
        scheduler: measurement.scheduler,
        memory_locked: false,
        max_jitter_ns: measurement.max_jitter_ns,
        latency: measurement.latency,
    })
}

fn measure(ctx: &ThreadContext, loops: u64) -> RTResult<Measurement> {
    let capacity = usize::try_from(loops).map_or(DEFAULT_SAMPLE_CAPACITY, |n| {
        n.min(DEFAULT_SAMPLE_CAPACITY)
    });
    let period_ns = ctx.period().map_or(0, |p| p.as_nanos_i64());
    let scheduler = process::current_thread_scheduler()?;

    let mut stats = LatenessStats::with_capacity(capacity);
    let mut previous_wake: Option<Timestamp> = None;
    let mut max_jitter_ns = 0_u64;
    for _ in 0..loops {
        let lateness = ctx.wait_for_next_period(0)?;
        let woke = clock::now()?;
        let deadline = ctx.next_period()?;
        stats.record(deadline.delta_to(woke), lateness < 0);

        if let Some(previous) = previous_wake {
            let jitter = previous.delta_to(woke).saturating_sub(period_ns);
            max_jitter_ns = max_jitter_ns.max(jitter.unsigned_abs());
        }
        previous_wake = Some(woke);
    }

    Ok(Measurement {
        scheduler,
        max_jitter_ns,
        latency: stats.summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> CyclicArgs {
        CyclicArgs {
            interval_us: 1_000,
            loops: 10,
            priority: None,
            affinity: Vec::new(),
            resync_after: None,
            harden: false,
        }
    }

    #[test]
    fn test_flags_build_periodic_config() -> Result<()> {
        let mut args = args();
        args.interval_us = 250;
        args.resync_after = Some(3);
        let config = build_config(&args, None)?;
        assert_eq!(
            config.periodic.map(|p| p.period),
            Some(Timestamp::from_nanos(250_000))
        );
        assert_eq!(config.name.as_deref(), Some("cyclic"));
        assert_eq!(config.overrun.resync_after, Some(3));
        Ok(())
    }

    #[test]
    fn test_config_file_period_wins() -> Result<()> {
        let priority = rtperiodic::minimum_priority()?;
        let file_config = ThreadConfig::periodic(priority, Timestamp::from_nanos(2_000_000))
            .with_name("from-file");
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(serde_json::to_string(&file_config)?.as_bytes())?;

        let config = build_config(&args(), Some(file.path()))?;
        assert_eq!(config.name.as_deref(), Some("from-file"));
        assert_eq!(config.priority, priority);
        assert_eq!(
            config.periodic.map(|p| p.period),
            Some(Timestamp::from_nanos(2_000_000))
        );
        Ok(())
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let mut args = args();
        args.priority = Some(i32::MAX);
        let err = build_config(&args, None).err();
        let code = err
            .as_ref()
            .and_then(|e| e.downcast_ref::<CliError>())
            .map(CliError::exit_code);
        assert_eq!(code, Some(4));
    }

    #[test]
    fn test_short_run_reports_every_period() -> Result<()> {
        let mut args = args();
        args.priority = Some(rtperiodic::minimum_priority()?);
        let config = build_config(&args, None)?;
        let report = run(config, 10)?;
        assert_eq!(report.latency.samples, 10);
        assert_eq!(report.period_ns, 1_000_000);
        assert!(report.thread.starts_with("cyclic-realtime-thread-"));
        Ok(())
    }
}

//! Output formatting for rtctl

use anyhow::Error;
use colored::*;
use serde::Serialize;
use serde_json::json;

use crate::commands::clock::ClockReport;
use crate::commands::cyclic::CyclicReport;
use crate::commands::priority::PriorityReport;
use crate::commands::sched::SchedulerReport;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "chain": error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format error as JSON: {}", e),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

fn print_json<T: Serialize>(key: &str, value: &T) -> anyhow::Result<()> {
    let output = json!({
        "success": true,
        key: value,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn format_ns(ns: i64) -> String {
    let abs = ns.unsigned_abs();
    let sign = if ns < 0 { "-" } else { "" };
    if abs >= 1_000_000 {
        format!("{sign}{:.3} ms", abs as f64 / 1e6)
    } else if abs >= 1_000 {
        format!("{sign}{:.1} us", abs as f64 / 1e3)
    } else {
        format!("{sign}{abs} ns")
    }
}

pub fn print_cyclic_report(report: &CyclicReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json("cyclic", report);
    }

    let latency = &report.latency;
    println!("{} {}", "Thread:".bold(), report.thread);
    println!(
        "  Period: {}  Priority: {}  Scheduler: {}",
        format_ns(i64::try_from(report.period_ns).unwrap_or(i64::MAX)),
        report.priority,
        if report.scheduler.is_realtime() {
            report.scheduler.as_str().green()
        } else {
            report.scheduler.as_str().yellow()
        }
    );
    if report.memory_locked {
        println!("  Memory: {}", "locked".green());
    }
    println!("{}", "Wake latency:".bold());
    println!("  Samples: {}", latency.samples);
    println!("  Min:     {}", format_ns(latency.min_ns));
    println!("  Mean:    {}", format_ns(latency.mean_ns as i64));
    println!("  P50:     {}", format_ns(latency.p50_ns));
    println!("  P99:     {}", format_ns(latency.p99_ns));
    println!("  Max:     {}", format_ns(latency.max_ns));
    println!(
        "  Jitter:  {}",
        format_ns(i64::try_from(report.max_jitter_ns).unwrap_or(i64::MAX))
    );

    let overruns = format!("{}", latency.overruns);
    if latency.overruns == 0 {
        println!("  Overruns: {}", overruns.green());
    } else {
        println!("  Overruns: {}", overruns.red());
    }
    Ok(())
}

pub fn print_priority_report(report: &PriorityReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json("priority", report);
    }

    println!(
        "{} {} (priorities {}..={})",
        "Policy:".bold(),
        report.policy,
        report.min_priority,
        report.max_priority
    );
    println!("  Requested: {}", report.requested);
    println!(
        "  Observed:  {} at priority {}",
        report.observed_scheduler, report.observed_priority
    );
    if report.granted() {
        println!("  {}", "Real-time scheduling granted".green());
    } else {
        println!(
            "  {}",
            "Real-time scheduling not granted; check CAP_SYS_NICE or rtprio limits".yellow()
        );
    }
    Ok(())
}

pub fn print_scheduler(report: &SchedulerReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json("scheduler", report);
    }

    let pid = if report.pid == 0 {
        "self".to_string()
    } else {
        report.pid.to_string()
    };
    println!(
        "{} {}  {} {}  {} {}",
        "PID:".bold(),
        pid,
        "Scheduler:".bold(),
        report.algorithm,
        "Priority:".bold(),
        report.priority
    );
    Ok(())
}

pub fn print_clock(report: &ClockReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json("clock", report);
    }

    println!("{} {} ns", "Monotonic:".bold(), report.monotonic_ns);
    println!("{} {} ns", "Realtime: ".bold(), report.realtime_ns);
    Ok(())
}

use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::app::{CollapseSummary, ProgressEvent, ProgressSink, RunSummary, SplitSummary};
use crate::reduce::{ReportStatus, SampleReports};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable output; progress is not reported.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_splits(splits: &[SplitSummary]) -> io::Result<()> {
        Self::print_json(&splits)
    }

    pub fn print_collapse(summary: &CollapseSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Spinner on stderr showing the latest progress event.
pub struct SpinnerProgress {
    spinner: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.blue} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(message.to_string());
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SpinnerProgress {
    fn event(&self, event: ProgressEvent) {
        let message = match event.elapsed {
            Some(elapsed) if event.message.starts_with("job.") => {
                format!("{} {:.1}s", event.message, elapsed.as_secs_f64())
            }
            _ => event.message,
        };
        self.spinner.set_message(message);
    }
}

pub fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}centrifuge batch summary{reset}");
    println!(
        "inputs: {} ({} paired sample(s), {} unpaired)",
        summary.inputs, summary.paired_samples, summary.unpaired_samples
    );
    let reused = summary.splits.iter().filter(|split| split.reused).count();
    if !summary.splits.is_empty() {
        let chunks: usize = summary.splits.iter().map(|split| split.chunks).sum();
        println!(
            "split: {} file(s) into {chunks} chunk(s), {reused} reused",
            summary.splits.len()
        );
    }

    if summary.dry_run {
        println!("{yellow}dry run: {} job(s) planned{reset}", summary.planned.len());
        for command in &summary.planned {
            println!("  {command}");
        }
        return;
    }

    let jobs = &summary.jobs;
    println!(
        "{green}jobs: {} succeeded{reset}, {} skipped, {red}{} failed{reset}, {} not attempted",
        jobs.succeeded, jobs.skipped, jobs.failed, jobs.not_attempted
    );
    for failed in &summary.failed_jobs {
        println!("{red}  x {} ({}){reset}", failed.name, failed.reason);
        if let Some(line) = failed.stderr.lines().rev().find(|line| !line.trim().is_empty()) {
            println!("{red}    {line}{reset}");
        }
    }
    if summary.halted {
        println!("{red}halted after {} failure(s){reset}", jobs.failed);
    }

    println!("{cyan}collapsed reports in {}{reset}", summary.collapsed_dir);
    print_reports(&summary.reports);
}

pub fn print_collapse_summary(summary: &CollapseSummary) {
    println!("collapsed reports in {}", summary.collapsed_dir);
    print_reports(&summary.reports);
}

pub fn print_split_summary(splits: &[SplitSummary]) {
    for split in splits {
        let action = if split.reused { "reused" } else { "split" };
        println!(
            "{}: {} record(s) in {} chunk(s) ({action})",
            split.input, split.records, split.chunks
        );
    }
}

fn print_reports(reports: &[SampleReports]) {
    for report in reports {
        println!(
            "  {}: taxonomy {}, summary {}",
            report.sample,
            describe(&report.taxonomy),
            describe(&report.summary)
        );
    }
}

fn describe(status: &ReportStatus) -> String {
    match status {
        ReportStatus::Written { chunks, .. } => format!("written from {chunks} chunk(s)"),
        ReportStatus::Exists { .. } => "exists".to_string(),
        ReportStatus::Missing => "missing".to_string(),
        ReportStatus::Incomplete { missing } => format!("incomplete ({} missing)", missing.len()),
        ReportStatus::Failed { reason } => format!("failed ({reason})"),
    }
}

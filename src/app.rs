use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunSettings;
use crate::discover;
use crate::domain::{InputFile, SeqFormat};
use crate::error::BatchError;
use crate::executor::{BatchCounts, BatchOutcome, Executor, JobRunner, JobStatus};
use crate::fs_util;
use crate::jobs::{SamplePlan, build_jobs};
use crate::layout::Layout;
use crate::pairing::{FileGroup, PairingResolver};
use crate::reduce::{ReduceTarget, Reducer, SampleReports, scan_reports};
use crate::split::Splitter;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub input: Utf8PathBuf,
    pub chunks: usize,
    pub records: usize,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedJob {
    pub name: String,
    pub exit_code: Option<i32>,
    pub reason: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub inputs: usize,
    pub paired_samples: usize,
    pub unpaired_samples: usize,
    pub splits: Vec<SplitSummary>,
    pub dry_run: bool,
    pub planned: Vec<String>,
    pub jobs: BatchCounts,
    pub halted: bool,
    pub failed_jobs: Vec<FailedJob>,
    pub not_attempted: Vec<String>,
    pub collapsed_dir: Utf8PathBuf,
    pub reports: Vec<SampleReports>,
}

impl RunSummary {
    /// The error to exit with once the summary has been shown, if the batch did
    /// not complete cleanly.
    pub fn abort_error(&self) -> Option<BatchError> {
        self.jobs.abort_error(self.halted)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollapseSummary {
    pub collapsed_dir: Utf8PathBuf,
    pub reports: Vec<SampleReports>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<R: JobRunner> {
    settings: RunSettings,
    layout: Layout,
    runner: R,
}

impl<R: JobRunner> App<R> {
    pub fn new(settings: RunSettings, runner: R) -> Self {
        let layout = Layout::new(settings.out_dir.clone());
        Self {
            settings,
            layout,
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Discover, pair, split, classify every work unit, then collapse the chunk
    /// reports of each sample. Job failures do not make this return `Err`; they are
    /// reported through [`RunSummary::abort_error`] after samples that did complete
    /// have been reduced.
    pub fn run(
        &self,
        queries: &[Utf8PathBuf],
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, BatchError> {
        let resolver = PairingResolver::new(&self.settings.extensions)?;
        let executor = Executor::new(self.settings.procs, self.settings.halt_after)?;

        phase(sink, "discover");
        let inputs = discover::discover(queries, self.settings.format)?;
        let group = resolver.resolve(&inputs, self.settings.reads_not_paired);
        info!(
            "{} unpaired input(s), {} pair(s)",
            group.unpaired.len(),
            group.forward.len()
        );

        self.layout.ensure_root()?;
        let (samples, splits) = self.plan_samples(&group, sink)?;
        let paired_samples = samples.iter().filter(|s| s.inputs.len() == 2).count();

        let reports_dir = self.layout.ensure_reports_dir()?;
        let plan = build_jobs(&samples, &self.settings.classifier, &reports_dir)?;
        for job in &plan.skipped {
            info!("\"{}\" exists, skipping job {}", job.report, job.name());
        }

        let mut summary = RunSummary {
            inputs: inputs.len(),
            paired_samples,
            unpaired_samples: samples.len() - paired_samples,
            splits,
            dry_run: options.dry_run,
            planned: Vec::new(),
            jobs: BatchCounts {
                skipped: plan.skipped.len(),
                ..BatchCounts::default()
            },
            halted: false,
            failed_jobs: Vec::new(),
            not_attempted: Vec::new(),
            collapsed_dir: self.layout.collapsed_dir(),
            reports: Vec::new(),
        };

        if options.dry_run {
            summary.planned = plan.jobs.iter().map(|job| job.command_line()).collect();
            summary.jobs.not_attempted = plan.jobs.len();
            return Ok(summary);
        }

        if !plan.jobs.is_empty() {
            self.runner.preflight()?;
        }
        phase(sink, format!("classify {} job(s)", plan.jobs.len()));
        let outcome = executor.run(&self.runner, plan, sink);
        record_outcome(&mut summary, &outcome);

        phase(sink, "collapse");
        let targets = samples
            .iter()
            .map(|sample| ReduceTarget::from_plan(sample, &reports_dir))
            .collect::<Vec<_>>();
        let collapsed_dir = self.layout.ensure_collapsed_dir()?;
        summary.reports = Reducer::new(collapsed_dir).reduce(&targets, sink)?;
        Ok(summary)
    }

    fn plan_samples(
        &self,
        group: &FileGroup,
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<SamplePlan>, Vec<SplitSummary>), BatchError> {
        let mut samples = Vec::new();
        let mut splits = Vec::new();

        if !self.settings.split {
            samples.extend(group.unpaired.iter().map(SamplePlan::whole));
            samples.extend(
                group
                    .pairs()
                    .map(|(forward, reverse)| SamplePlan::whole_pair(forward, reverse)),
            );
            return Ok((samples, splits));
        }

        let split_dir = self.layout.ensure_split_dir()?;
        let splitter = Splitter::new(self.settings.max_seqs_per_file, split_dir)?;
        let mut split_one = |input: &InputFile| {
            phase(sink, format!("split {}", input.file_name()));
            let outcome = splitter.split(input)?;
            splits.push(SplitSummary {
                input: input.path().to_path_buf(),
                chunks: outcome.manifest.chunks.len(),
                records: outcome.manifest.records,
                reused: outcome.reused,
            });
            Ok::<_, BatchError>(outcome.manifest)
        };

        for input in &group.unpaired {
            let manifest = split_one(input)?;
            samples.push(SamplePlan::chunked(input, &manifest));
        }
        for (forward, reverse) in group.pairs() {
            let forward_manifest = split_one(forward)?;
            let reverse_manifest = split_one(reverse)?;
            match SamplePlan::chunked_pair(forward, &forward_manifest, reverse, &reverse_manifest)
            {
                Some(plan) => samples.push(plan),
                None => {
                    warn!(
                        "\"{}\" ({} records) and \"{}\" ({} records) do not split evenly, classifying them unpaired",
                        forward.path(),
                        forward_manifest.records,
                        reverse.path(),
                        reverse_manifest.records
                    );
                    samples.push(SamplePlan::chunked(forward, &forward_manifest));
                    samples.push(SamplePlan::chunked(reverse, &reverse_manifest));
                }
            }
        }
        Ok((samples, splits))
    }
}

fn record_outcome(summary: &mut RunSummary, outcome: &BatchOutcome) {
    summary.jobs = outcome.counts();
    summary.halted = outcome.halted;
    summary.failed_jobs = outcome
        .failures()
        .map(|result| {
            let (exit_code, reason) = match &result.status {
                JobStatus::Failed { exit_code, reason } => (*exit_code, reason.clone()),
                JobStatus::Succeeded => (None, String::new()),
            };
            FailedJob {
                name: result.job.name().to_string(),
                exit_code,
                reason,
                stderr: result.stderr.clone(),
            }
        })
        .collect();
    summary.not_attempted = outcome
        .not_attempted
        .iter()
        .map(|job| job.name().to_string())
        .collect();
}

/// Split each input into chunks under `target_dir` without classifying.
pub fn split_inputs(
    queries: &[Utf8PathBuf],
    format: Option<SeqFormat>,
    max_records: usize,
    target_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<SplitSummary>, BatchError> {
    let splitter = Splitter::new(max_records, target_dir)?;
    let inputs = discover::discover(queries, format)?;
    fs_util::ensure_dir(target_dir)?;
    let mut splits = Vec::with_capacity(inputs.len());
    for input in &inputs {
        phase(sink, format!("split {}", input.file_name()));
        let outcome = splitter.split(input)?;
        splits.push(SplitSummary {
            input: input.path().to_path_buf(),
            chunks: outcome.manifest.chunks.len(),
            records: outcome.manifest.records,
            reused: outcome.reused,
        });
    }
    Ok(splits)
}

/// Collapse chunk reports found in `reports_dir` for each original input, matching
/// chunk reports by name. Directories among `queries` stand for the files in them;
/// `split_dir`, when given, supplies the split manifests that say how many chunks
/// each input was cut into.
pub fn collapse_reports(
    queries: &[Utf8PathBuf],
    reports_dir: &Utf8Path,
    split_dir: Option<&Utf8Path>,
    out_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<CollapseSummary, BatchError> {
    if !reports_dir.as_std_path().is_dir() {
        return Err(BatchError::Config(format!(
            "--reports-dir \"{reports_dir}\" is not a directory"
        )));
    }
    let inputs = discover::find_input_files(queries)?;
    if inputs.is_empty() {
        return Err(BatchError::Discovery("no files from --query".to_string()));
    }
    let targets = scan_reports(&inputs, reports_dir, split_dir)?;
    let reports = Reducer::new(out_dir).reduce(&targets, sink)?;
    Ok(CollapseSummary {
        collapsed_dir: out_dir.to_path_buf(),
        reports,
    })
}

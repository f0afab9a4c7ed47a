use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::BatchError;
use crate::fs_util;
use crate::jobs::{JobPlan, JobSpec};

/// Runs one job to completion. Implementations must be callable from several threads.
pub trait JobRunner: Send + Sync {
    fn preflight(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn run(&self, job: &JobSpec) -> Result<JobOutput, BatchError>;
}

#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job: JobSpec,
    pub status: JobStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_attempted: usize,
}

impl BatchCounts {
    /// The error a batch with these counts ends in, if it did not complete cleanly.
    pub fn abort_error(&self, halted: bool) -> Option<BatchError> {
        if halted {
            return Some(BatchError::BatchAborted {
                started: self.started,
                skipped: self.skipped,
                failed: self.failed,
                not_attempted: self.not_attempted,
            });
        }
        (self.failed > 0).then_some(BatchError::JobsFailed {
            started: self.started,
            failed: self.failed,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One result per started job, in submission order.
    pub results: Vec<JobResult>,
    pub skipped: Vec<JobSpec>,
    pub not_attempted: Vec<JobSpec>,
    pub halted: bool,
}

impl BatchOutcome {
    pub fn counts(&self) -> BatchCounts {
        let failed = self.failures().count();
        BatchCounts {
            started: self.results.len(),
            succeeded: self.results.len() - failed,
            failed,
            skipped: self.skipped.len(),
            not_attempted: self.not_attempted.len(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|result| !result.is_success())
    }

}

/// At most `parallelism` jobs run at once. After `halt_after` failures (0 = never) no
/// further jobs are admitted; jobs already running are left to finish.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    parallelism: usize,
    halt_after: usize,
}

impl Executor {
    pub fn new(parallelism: usize, halt_after: usize) -> Result<Self, BatchError> {
        if parallelism < 1 {
            return Err(BatchError::Config(
                "number of parallel jobs cannot be less than one".to_string(),
            ));
        }
        Ok(Self {
            parallelism,
            halt_after,
        })
    }

    pub fn run<R: JobRunner>(
        &self,
        runner: &R,
        plan: JobPlan,
        sink: &dyn ProgressSink,
    ) -> BatchOutcome {
        let JobPlan { jobs, skipped } = plan;
        let total = jobs.len();
        let mut pending = jobs.into_iter().enumerate();
        let mut slots: Vec<Option<JobResult>> = (0..total).map(|_| None).collect();
        let mut failures = 0usize;
        let mut halted = false;
        let started = Instant::now();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, JobResult)>();
            let mut in_flight = 0usize;
            loop {
                while !halted && in_flight < self.parallelism {
                    let Some((slot, job)) = pending.next() else {
                        break;
                    };
                    debug!("starting {}", job.command_line());
                    sink.event(ProgressEvent {
                        message: format!("job.start {} ({}/{total})", job.name(), slot + 1),
                        elapsed: Some(started.elapsed()),
                    });
                    let tx = tx.clone();
                    scope.spawn(move || {
                        let result = execute(runner, job);
                        let _ = tx.send((slot, result));
                    });
                    in_flight += 1;
                }
                if in_flight == 0 {
                    break;
                }
                let Ok((slot, result)) = rx.recv() else {
                    break;
                };
                in_flight -= 1;

                match &result.status {
                    JobStatus::Succeeded => sink.event(ProgressEvent {
                        message: format!("job.done {}", result.job.name()),
                        elapsed: Some(result.elapsed),
                    }),
                    JobStatus::Failed { reason, .. } => {
                        failures += 1;
                        warn!("job {} failed: {reason}", result.job.name());
                        sink.event(ProgressEvent {
                            message: format!("job.failed {} ({reason})", result.job.name()),
                            elapsed: Some(result.elapsed),
                        });
                        if !halted && self.halt_after > 0 && failures >= self.halt_after {
                            halted = true;
                            warn!(
                                "{failures} job(s) failed, halting: no new jobs will be started"
                            );
                        }
                    }
                }
                slots[slot] = Some(result);
            }
        });

        BatchOutcome {
            results: slots.into_iter().flatten().collect(),
            skipped,
            not_attempted: pending.map(|(_, job)| job).collect(),
            halted,
        }
    }
}

fn execute<R: JobRunner>(runner: &R, job: JobSpec) -> JobResult {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&job)));
    let (status, stdout, stderr) = match outcome {
        Ok(Ok(output)) if output.success => (JobStatus::Succeeded, output.stdout, output.stderr),
        Ok(Ok(output)) => {
            let reason = match output.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            (
                JobStatus::Failed {
                    exit_code: output.exit_code,
                    reason,
                },
                output.stdout,
                output.stderr,
            )
        }
        Ok(Err(err)) => (
            JobStatus::Failed {
                exit_code: None,
                reason: err.to_string(),
            },
            String::new(),
            String::new(),
        ),
        Err(_) => (
            JobStatus::Failed {
                exit_code: None,
                reason: "job runner panicked".to_string(),
            },
            String::new(),
            String::new(),
        ),
    };

    if !matches!(status, JobStatus::Succeeded) {
        for path in [&job.report, &job.summary] {
            if let Err(err) = fs_util::remove_if_exists(path) {
                warn!("could not discard partial output: {err}");
            }
        }
    }

    JobResult {
        job,
        status,
        stdout,
        stderr,
        elapsed: started.elapsed(),
    }
}

/// Runs jobs as child processes, capturing stdout and stderr.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    resolved: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(program: &str) -> Self {
        let candidate = Path::new(program);
        let resolved = if candidate.components().count() > 1 {
            candidate.exists().then(|| candidate.to_path_buf())
        } else {
            find_in_path(program)
        };
        Self {
            program: program.to_string(),
            resolved,
        }
    }

    pub fn version(&self) -> Option<String> {
        let path = self.resolved.as_ref()?;
        let output = Command::new(path).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    }
}

impl JobRunner for ProcessRunner {
    fn preflight(&self) -> Result<(), BatchError> {
        if self.resolved.is_none() {
            return Err(BatchError::MissingTool(self.program.clone()));
        }
        if let Some(version) = self.version() {
            debug!("using {version}");
        }
        Ok(())
    }

    fn run(&self, job: &JobSpec) -> Result<JobOutput, BatchError> {
        let program = self
            .resolved
            .as_deref()
            .unwrap_or_else(|| Path::new(&job.program));
        let output = Command::new(program)
            .args(&job.args)
            .envs(job.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|err| BatchError::Launch {
                program: job.program.clone(),
                message: err.to_string(),
            })?;
        Ok(JobOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}

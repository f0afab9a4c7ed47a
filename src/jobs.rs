use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{IndexName, InputFile, SeqFormat, TaxId};
use crate::error::BatchError;
use crate::split::ChunkManifest;

pub const INDEX_ENV: &str = "CENTRIFUGE_INDEXES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum UnitInputs {
    Single {
        path: Utf8PathBuf,
    },
    Paired {
        forward: Utf8PathBuf,
        reverse: Utf8PathBuf,
    },
}

/// One classifier invocation: a chunk (or an unsplit file) of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub sample: String,
    pub index: u32,
    pub format: SeqFormat,
    pub inputs: UnitInputs,
}

impl WorkUnit {
    pub fn single(sample: &str, index: u32, format: SeqFormat, path: &Utf8Path) -> Self {
        Self {
            sample: sample.to_string(),
            index,
            format,
            inputs: UnitInputs::Single {
                path: path.to_path_buf(),
            },
        }
    }

    pub fn paired(
        sample: &str,
        index: u32,
        format: SeqFormat,
        forward: &Utf8Path,
        reverse: &Utf8Path,
    ) -> Self {
        Self {
            sample: sample.to_string(),
            index,
            format,
            inputs: UnitInputs::Paired {
                forward: forward.to_path_buf(),
                reverse: reverse.to_path_buf(),
            },
        }
    }

    fn primary(&self) -> &Utf8Path {
        match &self.inputs {
            UnitInputs::Single { path } => path,
            UnitInputs::Paired { forward, .. } => forward,
        }
    }

    /// File name of the (forward) input; report names derive from it.
    pub fn name(&self) -> &str {
        let primary = self.primary();
        primary.file_name().unwrap_or(primary.as_str())
    }

    pub fn is_paired(&self) -> bool {
        matches!(self.inputs, UnitInputs::Paired { .. })
    }
}

/// Everything known about one sample before execution: its inputs and its work units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplePlan {
    pub sample: String,
    pub inputs: Vec<InputFile>,
    pub units: Vec<WorkUnit>,
}

impl SamplePlan {
    pub fn whole(input: &InputFile) -> Self {
        Self {
            sample: input.stem().to_string(),
            inputs: vec![input.clone()],
            units: vec![WorkUnit::single(
                input.stem(),
                1,
                input.format(),
                input.path(),
            )],
        }
    }

    pub fn whole_pair(forward: &InputFile, reverse: &InputFile) -> Self {
        Self {
            sample: forward.stem().to_string(),
            inputs: vec![forward.clone(), reverse.clone()],
            units: vec![WorkUnit::paired(
                forward.stem(),
                1,
                forward.format(),
                forward.path(),
                reverse.path(),
            )],
        }
    }

    pub fn chunked(input: &InputFile, manifest: &ChunkManifest) -> Self {
        let units = manifest
            .chunks
            .iter()
            .map(|chunk| WorkUnit::single(input.stem(), chunk.index, input.format(), &chunk.path))
            .collect();
        Self {
            sample: input.stem().to_string(),
            inputs: vec![input.clone()],
            units,
        }
    }

    /// `None` when the mates were not split into the same number of chunks.
    pub fn chunked_pair(
        forward: &InputFile,
        forward_manifest: &ChunkManifest,
        reverse: &InputFile,
        reverse_manifest: &ChunkManifest,
    ) -> Option<Self> {
        if forward_manifest.records != reverse_manifest.records
            || forward_manifest.chunks.len() != reverse_manifest.chunks.len()
        {
            return None;
        }
        let units = forward_manifest
            .chunks
            .iter()
            .zip(&reverse_manifest.chunks)
            .map(|(fwd, rev)| {
                WorkUnit::paired(
                    forward.stem(),
                    fwd.index,
                    forward.format(),
                    &fwd.path,
                    &rev.path,
                )
            })
            .collect();
        Some(Self {
            sample: forward.stem().to_string(),
            inputs: vec![forward.clone(), reverse.clone()],
            units,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierParams {
    pub program: String,
    pub index: IndexName,
    pub index_dir: Utf8PathBuf,
    pub threads: usize,
    pub exclude: Vec<TaxId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub unit: WorkUnit,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub report: Utf8PathBuf,
    pub summary: Utf8PathBuf,
}

impl JobSpec {
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub fn outputs_exist(&self) -> bool {
        self.report.as_std_path().is_file()
    }

    pub fn command_line(&self) -> String {
        let mut parts = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    pub jobs: Vec<JobSpec>,
    pub skipped: Vec<JobSpec>,
}

pub fn report_paths(reports_dir: &Utf8Path, unit: &WorkUnit) -> (Utf8PathBuf, Utf8PathBuf) {
    (
        reports_dir.join(format!("{}.tsv", unit.name())),
        reports_dir.join(format!("{}.sum", unit.name())),
    )
}

pub fn build_job(params: &ClassifierParams, reports_dir: &Utf8Path, unit: &WorkUnit) -> JobSpec {
    let (report, summary) = report_paths(reports_dir, unit);
    let mut args = Vec::new();
    if !params.exclude.is_empty() {
        let ids = params
            .exclude
            .iter()
            .map(TaxId::to_string)
            .collect::<Vec<_>>();
        args.push("--exclude-taxids".to_string());
        args.push(ids.join(","));
    }
    args.push(
        match unit.format {
            SeqFormat::Fasta => "-f",
            SeqFormat::Fastq => "-q",
        }
        .to_string(),
    );
    args.push("-p".to_string());
    args.push(params.threads.to_string());
    args.push("-x".to_string());
    args.push(params.index.to_string());
    match &unit.inputs {
        UnitInputs::Single { path } => {
            args.push("-U".to_string());
            args.push(path.to_string());
        }
        UnitInputs::Paired { forward, reverse } => {
            args.push("-1".to_string());
            args.push(forward.to_string());
            args.push("-2".to_string());
            args.push(reverse.to_string());
        }
    }
    args.push("-S".to_string());
    args.push(summary.to_string());
    args.push("--report-file".to_string());
    args.push(report.to_string());

    JobSpec {
        unit: unit.clone(),
        program: params.program.clone(),
        args,
        env: vec![(INDEX_ENV.to_string(), params.index_dir.to_string())],
        report,
        summary,
    }
}

/// Unpaired units first, then paired ones, each in sample order. Units whose
/// taxonomy report already exists are set aside as skipped.
pub fn build_jobs(
    samples: &[SamplePlan],
    params: &ClassifierParams,
    reports_dir: &Utf8Path,
) -> Result<JobPlan, BatchError> {
    if params.threads < 1 {
        return Err(BatchError::Config(
            "threads per job cannot be less than one".to_string(),
        ));
    }
    let units = samples.iter().flat_map(|sample| sample.units.iter());
    let (paired, unpaired): (Vec<_>, Vec<_>) = units.partition(|unit| unit.is_paired());

    let mut plan = JobPlan::default();
    for unit in unpaired.into_iter().chain(paired) {
        let job = build_job(params, reports_dir, unit);
        if job.outputs_exist() {
            plan.skipped.push(job);
        } else {
            plan.jobs.push(job);
        }
    }
    Ok(plan)
}

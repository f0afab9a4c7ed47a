use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{TaxId, split_file_name};
use crate::error::BatchError;
use crate::fs_util;
use crate::jobs::{SamplePlan, report_paths};
use crate::split;

pub const REPORT_COLUMNS: [&str; 7] = [
    "name",
    "taxID",
    "taxRank",
    "genomeSize",
    "numReads",
    "numUniqueReads",
    "abundance",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyRow {
    pub tax_id: TaxId,
    pub name: String,
    pub rank: String,
    pub genome_size: String,
    pub num_reads: u64,
    pub num_unique_reads: u64,
}

struct Columns {
    tax_id: usize,
    name: usize,
    rank: usize,
    genome_size: Option<usize>,
    num_reads: usize,
    num_unique_reads: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, String> {
        let fields = header.split('\t').map(str::trim).collect::<Vec<_>>();
        let find = |name: &str| fields.iter().position(|field| *field == name);
        let require = |name: &str| find(name).ok_or_else(|| format!("missing column {name}"));
        Ok(Self {
            tax_id: require("taxID")?,
            name: require("name")?,
            rank: require("taxRank")?,
            genome_size: find("genomeSize"),
            num_reads: require("numReads")?,
            num_unique_reads: require("numUniqueReads")?,
        })
    }
}

/// Reads a tab separated taxonomy report. A file without any line has no rows.
pub fn read_taxonomy_report(path: &Utf8Path) -> Result<Vec<TaxonomyRow>, BatchError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("open {path}: {err}")))?;
    let malformed = |line: usize, message: String| BatchError::MalformedReport {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut lines = BufReader::new(file).lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header = header.map_err(|err| BatchError::Filesystem(format!("read {path}: {err}")))?;
    let columns = Columns::from_header(&header).map_err(|message| malformed(1, message))?;

    let mut rows = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line_no = offset + 2;
        let line = line.map_err(|err| BatchError::Filesystem(format!("read {path}: {err}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.trim_end_matches('\r').split('\t').collect::<Vec<_>>();
        let field = |index: usize| {
            fields
                .get(index)
                .copied()
                .ok_or_else(|| malformed(line_no, format!("missing field {}", index + 1)))
        };
        let count = |index: usize| -> Result<u64, BatchError> {
            let value = field(index)?;
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| malformed(line_no, format!("invalid count \"{value}\"")))
        };
        let tax_id = field(columns.tax_id)?
            .parse::<TaxId>()
            .map_err(|err| malformed(line_no, err.to_string()))?;
        rows.push(TaxonomyRow {
            tax_id,
            name: field(columns.name)?.to_string(),
            rank: field(columns.rank)?.to_string(),
            genome_size: match columns.genome_size {
                Some(index) => field(index)?.to_string(),
                None => String::new(),
            },
            num_reads: count(columns.num_reads)?,
            num_unique_reads: count(columns.num_unique_reads)?,
        });
    }
    Ok(rows)
}

/// Read share of `reads` in `total`, rounded half-to-even to two decimals; undefined for an
/// empty total.
pub fn abundance(reads: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((reads as f64 / total as f64 * 100.0).round_ties_even() / 100.0)
}

/// Shortest decimal form, with at least one fractional digit: `0.12`, `0.5`, `1.0`.
pub fn format_abundance(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Taxon-keyed fold of chunk reports. Counts add up; the other fields keep their first value.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyMerge {
    rows: BTreeMap<TaxId, TaxonomyRow>,
}

impl TaxonomyMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: TaxonomyRow) {
        match self.rows.get_mut(&row.tax_id) {
            Some(existing) => {
                existing.num_reads += row.num_reads;
                existing.num_unique_reads += row.num_unique_reads;
            }
            None => {
                self.rows.insert(row.tax_id, row);
            }
        }
    }

    pub fn add_report(&mut self, path: &Utf8Path) -> Result<usize, BatchError> {
        let rows = read_taxonomy_report(path)?;
        let count = rows.len();
        for row in rows {
            self.add(row);
        }
        Ok(count)
    }

    pub fn get(&self, tax_id: TaxId) -> Option<&TaxonomyRow> {
        self.rows.get(&tax_id)
    }

    /// Rows in ascending taxon id order.
    pub fn rows(&self) -> impl Iterator<Item = &TaxonomyRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_reads(&self) -> u64 {
        self.rows.values().map(|row| row.num_reads).sum()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", REPORT_COLUMNS.join("\t"))?;
        let total = self.total_reads();
        for row in self.rows() {
            let abundance = abundance(row.num_reads, total)
                .map(format_abundance)
                .unwrap_or_default();
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.name,
                row.tax_id,
                row.rank,
                row.genome_size,
                row.num_reads,
                row.num_unique_reads,
                abundance
            )?;
        }
        Ok(())
    }
}

/// Concatenates summary files in the given order, keeping only the first file's header.
pub fn merge_summaries<W: Write>(files: &[Utf8PathBuf], out: &mut W) -> Result<(), BatchError> {
    for (position, path) in files.iter().enumerate() {
        let file = File::open(path.as_std_path())
            .map_err(|err| BatchError::Filesystem(format!("open {path}: {err}")))?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.map_err(|err| BatchError::Filesystem(format!("read {path}: {err}")))?;
            if line_no == 0 && position > 0 {
                continue;
            }
            writeln!(out, "{line}")
                .map_err(|err| BatchError::Filesystem(format!("write summary: {err}")))?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    pub index: u32,
    pub path: Utf8PathBuf,
}

/// The chunk reports expected for, and found for, one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReduceTarget {
    pub sample: String,
    pub expected: Vec<u32>,
    pub reports: Vec<ChunkReport>,
    pub summaries: Vec<ChunkReport>,
}

impl ReduceTarget {
    pub fn from_plan(sample: &SamplePlan, reports_dir: &Utf8Path) -> Self {
        let mut target = Self {
            sample: sample.sample.clone(),
            expected: Vec::new(),
            reports: Vec::new(),
            summaries: Vec::new(),
        };
        for unit in &sample.units {
            let (report, summary) = report_paths(reports_dir, unit);
            target.expected.push(unit.index);
            if report.as_std_path().is_file() {
                target.reports.push(ChunkReport {
                    index: unit.index,
                    path: report,
                });
            }
            if summary.as_std_path().is_file() {
                target.summaries.push(ChunkReport {
                    index: unit.index,
                    path: summary,
                });
            }
        }
        target.normalize();
        target
    }

    fn normalize(&mut self) {
        self.expected.sort_unstable();
        self.expected.dedup();
        self.reports.sort_by_key(|report| report.index);
        self.summaries.sort_by_key(|report| report.index);
    }
}

/// Matches `<stem>.<n>.<ext>.(tsv|sum)` report names for each input. The chunks a
/// sample should have come from its split manifest in `split_dir` when one is
/// there, otherwise every index from 1 up to the highest report found.
pub fn scan_reports(
    inputs: &[Utf8PathBuf],
    reports_dir: &Utf8Path,
    split_dir: Option<&Utf8Path>,
) -> Result<Vec<ReduceTarget>, BatchError> {
    let report_files = fs_util::list_files(reports_dir)?;
    let mut targets = Vec::new();
    for input in inputs {
        let name = input.file_name().unwrap_or(input.as_str());
        let (stem, ext) = split_file_name(name);
        let pattern = match ext {
            "" => format!(r"^{}\.(\d+)\.(tsv|sum)$", regex::escape(stem)),
            ext => format!(
                r"^{}\.(\d+)\.{}\.(tsv|sum)$",
                regex::escape(stem),
                regex::escape(ext)
            ),
        };
        let pattern = Regex::new(&pattern).map_err(|err| BatchError::Config(err.to_string()))?;

        let mut target = ReduceTarget {
            sample: stem.to_string(),
            expected: Vec::new(),
            reports: Vec::new(),
            summaries: Vec::new(),
        };
        for path in &report_files {
            let Some(captures) = path.file_name().and_then(|name| pattern.captures(name)) else {
                continue;
            };
            let Ok(index) = captures[1].parse::<u32>() else {
                continue;
            };
            let report = ChunkReport {
                index,
                path: path.clone(),
            };
            target.expected.push(index);
            match &captures[2] {
                "tsv" => target.reports.push(report),
                _ => target.summaries.push(report),
            }
        }
        let manifest = split_dir.and_then(|dir| {
            split::read_manifest(&dir.join(split::manifest_file_name(stem, ext)))
        });
        match manifest {
            Some(manifest) => {
                debug!(
                    "expecting {} chunk(s) for {stem} from its manifest",
                    manifest.chunks.len()
                );
                target.expected = manifest.chunks.iter().map(|chunk| chunk.index).collect();
            }
            None => {
                let last = target.expected.iter().copied().max().unwrap_or(0);
                target.expected = (1..=last).collect();
            }
        }
        target.normalize();
        targets.push(target);
    }
    Ok(targets)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    Written { path: Utf8PathBuf, chunks: usize },
    Exists { path: Utf8PathBuf },
    Missing,
    Incomplete { missing: Vec<u32> },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleReports {
    pub sample: String,
    pub taxonomy: ReportStatus,
    pub summary: ReportStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Taxonomy,
    Summary,
}

impl ReportKind {
    fn extension(self) -> &'static str {
        match self {
            ReportKind::Taxonomy => "tsv",
            ReportKind::Summary => "sum",
        }
    }
}

/// Folds chunk reports into one taxonomy report and one summary per sample.
#[derive(Debug, Clone)]
pub struct Reducer {
    out_dir: Utf8PathBuf,
}

impl Reducer {
    pub fn new(out_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn reduce(
        &self,
        targets: &[ReduceTarget],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<SampleReports>, BatchError> {
        fs_util::ensure_dir(&self.out_dir)?;
        let mut outcomes = Vec::with_capacity(targets.len());
        for (position, target) in targets.iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!(
                    "reduce {} ({}/{})",
                    target.sample,
                    position + 1,
                    targets.len()
                ),
                elapsed: None,
            });
            outcomes.push(SampleReports {
                sample: target.sample.clone(),
                taxonomy: self.reduce_kind(target, ReportKind::Taxonomy),
                summary: self.reduce_kind(target, ReportKind::Summary),
            });
        }
        Ok(outcomes)
    }

    fn reduce_kind(&self, target: &ReduceTarget, kind: ReportKind) -> ReportStatus {
        let found = match kind {
            ReportKind::Taxonomy => &target.reports,
            ReportKind::Summary => &target.summaries,
        };
        if found.is_empty() {
            warn!(
                "no files ending with \"{}\" for \"{}\"",
                kind.extension(),
                target.sample
            );
            return ReportStatus::Missing;
        }

        let missing = target
            .expected
            .iter()
            .copied()
            .filter(|index| !found.iter().any(|report| report.index == *index))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            warn!(
                "\"{}\" is missing {} chunk report(s) ending with \"{}\", not collapsing",
                target.sample,
                missing.len(),
                kind.extension()
            );
            return ReportStatus::Incomplete { missing };
        }

        let out_path = self
            .out_dir
            .join(format!("{}.{}", target.sample, kind.extension()));
        if out_path.as_std_path().exists() {
            info!("\"{out_path}\" exists, skipping");
            return ReportStatus::Exists { path: out_path };
        }

        let paths = found
            .iter()
            .map(|report| report.path.clone())
            .collect::<Vec<_>>();
        let written = match kind {
            ReportKind::Taxonomy => write_taxonomy(&paths, &out_path),
            ReportKind::Summary => write_summary(&paths, &out_path),
        };
        match written {
            Ok(()) => {
                info!("wrote \"{out_path}\" from {} chunk(s)", paths.len());
                ReportStatus::Written {
                    path: out_path,
                    chunks: paths.len(),
                }
            }
            Err(err) => {
                warn!("could not collapse \"{}\": {err}", target.sample);
                ReportStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn write_taxonomy(paths: &[Utf8PathBuf], out_path: &Utf8Path) -> Result<(), BatchError> {
    let mut merge = TaxonomyMerge::new();
    for path in paths {
        merge.add_report(path)?;
    }
    if merge.total_reads() == 0 {
        warn!("total read count for \"{out_path}\" is zero, abundance left empty");
    }
    let mut writer = fs_util::atomic_writer(out_path)?;
    merge
        .write_to(&mut writer)
        .map_err(|err| BatchError::Filesystem(format!("write {out_path}: {err}")))?;
    fs_util::persist(writer, out_path)
}

fn write_summary(paths: &[Utf8PathBuf], out_path: &Utf8Path) -> Result<(), BatchError> {
    let mut writer = fs_util::atomic_writer(out_path)?;
    merge_summaries(paths, &mut writer)?;
    fs_util::persist(writer, out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tax_id: u64, reads: u64, unique: u64) -> TaxonomyRow {
        TaxonomyRow {
            tax_id: TaxId::new(tax_id),
            name: format!("taxon {tax_id}"),
            rank: "species".to_string(),
            genome_size: "1000".to_string(),
            num_reads: reads,
            num_unique_reads: unique,
        }
    }

    #[test]
    fn abundance_rounds_to_two_decimals() {
        assert_eq!(abundance(1, 3), Some(0.33));
        assert_eq!(abundance(2, 3), Some(0.67));
        assert_eq!(abundance(5, 0), None);
    }

    #[test]
    fn abundance_ties_round_to_even() {
        assert_eq!(abundance(1, 8), Some(0.12));
        assert_eq!(abundance(3, 8), Some(0.38));
        assert_eq!(abundance(7, 8), Some(0.88));
    }

    #[test]
    fn abundance_prints_shortest_form() {
        assert_eq!(format_abundance(0.12), "0.12");
        assert_eq!(format_abundance(0.5), "0.5");
        assert_eq!(format_abundance(1.0), "1.0");
        assert_eq!(format_abundance(0.0), "0.0");
    }

    #[test]
    fn merge_keeps_first_non_additive_fields() {
        let mut merge = TaxonomyMerge::new();
        merge.add(row(9606, 100, 10));
        let mut renamed = row(9606, 50, 5);
        renamed.name = "renamed".to_string();
        merge.add(renamed);

        let merged = merge.get(TaxId::new(9606)).unwrap();
        assert_eq!(merged.num_reads, 150);
        assert_eq!(merged.num_unique_reads, 15);
        assert_eq!(merged.name, "taxon 9606");
    }

    #[test]
    fn zero_total_leaves_abundance_empty() {
        let mut merge = TaxonomyMerge::new();
        merge.add(row(2, 0, 0));
        let mut out = Vec::new();
        merge.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().nth(1), Some("taxon 2\t2\tspecies\t1000\t0\t0\t"));
    }
}

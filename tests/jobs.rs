use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use centrifuge_batch::domain::{IndexName, InputFile, SeqFormat, TaxId};
use centrifuge_batch::error::BatchError;
use centrifuge_batch::jobs::{ClassifierParams, INDEX_ENV, SamplePlan, build_jobs};
use centrifuge_batch::split::{ChunkEntry, ChunkManifest};

fn params() -> ClassifierParams {
    ClassifierParams {
        program: "centrifuge".to_string(),
        index: IndexName::default(),
        index_dir: Utf8PathBuf::from("/db/centrifuge"),
        threads: 4,
        exclude: Vec::new(),
    }
}

fn manifest(parent: &str, format: SeqFormat, chunks: &[&str]) -> ChunkManifest {
    ChunkManifest {
        parent: Utf8PathBuf::from(parent),
        format,
        max_records: 10,
        records: chunks.len() * 10,
        chunks: chunks
            .iter()
            .enumerate()
            .map(|(i, path)| ChunkEntry {
                index: i as u32 + 1,
                path: Utf8PathBuf::from(*path),
                records: 10,
            })
            .collect(),
        created_at: String::new(),
    }
}

#[test]
fn unpaired_fasta_job_arguments() {
    let input = InputFile::classify("/in/sample.fa").unwrap();
    let plan = SamplePlan::chunked(
        &input,
        &manifest("/in/sample.fa", SeqFormat::Fasta, &["/out/split/sample.1.fa"]),
    );

    let jobs = build_jobs(&[plan], &params(), Utf8Path::new("/out/reports")).unwrap();
    assert!(jobs.skipped.is_empty());
    let job = &jobs.jobs[0];
    assert_eq!(job.name(), "sample.1.fa");
    assert_eq!(
        job.args,
        [
            "-f",
            "-p",
            "4",
            "-x",
            "p_compressed+h+v",
            "-U",
            "/out/split/sample.1.fa",
            "-S",
            "/out/reports/sample.1.fa.sum",
            "--report-file",
            "/out/reports/sample.1.fa.tsv",
        ]
    );
    assert_eq!(
        job.env,
        [(INDEX_ENV.to_string(), "/db/centrifuge".to_string())]
    );
    assert_eq!(job.report, "/out/reports/sample.1.fa.tsv");
    assert_eq!(job.summary, "/out/reports/sample.1.fa.sum");
    assert!(job.command_line().starts_with("CENTRIFUGE_INDEXES=/db/centrifuge centrifuge -f"));
}

#[test]
fn paired_fastq_job_with_exclusions() {
    let forward = InputFile::classify("/in/s_R1.fq").unwrap();
    let reverse = InputFile::classify("/in/s_R2.fq").unwrap();
    let plan = SamplePlan::whole_pair(&forward, &reverse);
    let params = ClassifierParams {
        exclude: vec![TaxId::new(9606), TaxId::new(32630)],
        threads: 2,
        ..params()
    };

    let jobs = build_jobs(&[plan], &params, Utf8Path::new("/r")).unwrap();
    assert_eq!(
        jobs.jobs[0].args,
        [
            "--exclude-taxids",
            "9606,32630",
            "-q",
            "-p",
            "2",
            "-x",
            "p_compressed+h+v",
            "-1",
            "/in/s_R1.fq",
            "-2",
            "/in/s_R2.fq",
            "-S",
            "/r/s_R1.fq.sum",
            "--report-file",
            "/r/s_R1.fq.tsv",
        ]
    );
}

#[test]
fn unpaired_units_come_first() {
    let forward = InputFile::classify("/in/p_1.fa").unwrap();
    let reverse = InputFile::classify("/in/p_2.fa").unwrap();
    let single = InputFile::classify("/in/u.fa").unwrap();
    let samples = [
        SamplePlan::whole_pair(&forward, &reverse),
        SamplePlan::whole(&single),
    ];

    let jobs = build_jobs(&samples, &params(), Utf8Path::new("/r")).unwrap();
    let names = jobs.jobs.iter().map(|job| job.name()).collect::<Vec<_>>();
    assert_eq!(names, ["u.fa", "p_1.fa"]);
}

#[test]
fn existing_report_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let reports = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    fs::write(reports.join("sample.1.fa.tsv").as_std_path(), "done").unwrap();

    let input = InputFile::classify("/in/sample.fa").unwrap();
    let plan = SamplePlan::chunked(
        &input,
        &manifest(
            "/in/sample.fa",
            SeqFormat::Fasta,
            &["/s/sample.1.fa", "/s/sample.2.fa"],
        ),
    );

    let jobs = build_jobs(&[plan], &params(), &reports).unwrap();
    assert_eq!(jobs.skipped.len(), 1);
    assert_eq!(jobs.skipped[0].name(), "sample.1.fa");
    assert_eq!(jobs.jobs.len(), 1);
    assert_eq!(jobs.jobs[0].name(), "sample.2.fa");
}

#[test]
fn uneven_mates_do_not_pair_chunks() {
    let forward = InputFile::classify("/in/s_1.fa").unwrap();
    let reverse = InputFile::classify("/in/s_2.fa").unwrap();
    let fwd = manifest("/in/s_1.fa", SeqFormat::Fasta, &["/s/s_1.1.fa", "/s/s_1.2.fa"]);
    let rev = manifest("/in/s_2.fa", SeqFormat::Fasta, &["/s/s_2.1.fa"]);
    assert!(SamplePlan::chunked_pair(&forward, &fwd, &reverse, &rev).is_none());

    let rev = manifest("/in/s_2.fa", SeqFormat::Fasta, &["/s/s_2.1.fa", "/s/s_2.2.fa"]);
    let plan = SamplePlan::chunked_pair(&forward, &fwd, &reverse, &rev).unwrap();
    assert_eq!(plan.sample, "s_1");
    assert_eq!(plan.units.len(), 2);
    assert!(plan.units.iter().all(|unit| unit.is_paired()));
}

#[test]
fn zero_threads_is_rejected() {
    let params = ClassifierParams {
        threads: 0,
        ..params()
    };
    assert_matches!(
        build_jobs(&[], &params, Utf8Path::new("/r")),
        Err(BatchError::Config(_))
    );
}

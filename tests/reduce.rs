use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use centrifuge_batch::domain::{InputFile, TaxId};
use centrifuge_batch::error::BatchError;
use centrifuge_batch::jobs::SamplePlan;
use centrifuge_batch::output::JsonOutput;
use centrifuge_batch::reduce::{
    ReduceTarget, Reducer, ReportStatus, TaxonomyMerge, read_taxonomy_report, scan_reports,
};
use centrifuge_batch::split::{ChunkEntry, ChunkManifest, Splitter};

const HEADER: &str = "name\ttaxID\ttaxRank\tgenomeSize\tnumReads\tnumUniqueReads\tabundance";

fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn write(path: &Utf8Path, content: &str) {
    fs::write(path.as_std_path(), content).unwrap();
}

fn chunked_plan(root: &Utf8Path, stem: &str, chunks: u32) -> SamplePlan {
    let input = InputFile::classify(root.join(format!("{stem}.fa"))).unwrap();
    let manifest = ChunkManifest {
        parent: input.path().to_path_buf(),
        format: input.format(),
        max_records: 10,
        records: chunks as usize * 10,
        chunks: (1..=chunks)
            .map(|index| ChunkEntry {
                index,
                path: root.join(format!("split/{stem}.{index}.fa")),
                records: 10,
            })
            .collect(),
        created_at: String::new(),
    };
    SamplePlan::chunked(&input, &manifest)
}

#[test]
fn reads_report_by_header_names() {
    let (_temp, root) = workspace();
    let path = root.join("r.tsv");
    write(
        &path,
        "taxID\tname\ttaxRank\tnumReads\tnumUniqueReads\n9606\tHomo sapiens\tspecies\t12\t3\n",
    );

    let rows = read_taxonomy_report(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tax_id, TaxId::new(9606));
    assert_eq!(rows[0].name, "Homo sapiens");
    assert_eq!(rows[0].genome_size, "");
    assert_eq!(rows[0].num_reads, 12);

    write(&path, "");
    assert!(read_taxonomy_report(&path).unwrap().is_empty());
}

#[test]
fn malformed_report_names_the_line() {
    let (_temp, root) = workspace();
    let path = root.join("bad.tsv");
    write(&path, &format!("{HEADER}\nx\t9606\tspecies\t0\tmany\t1\t0\n"));

    assert_matches!(
        read_taxonomy_report(&path),
        Err(BatchError::MalformedReport { line: 2, .. })
    );

    write(&path, "name\ttaxRank\n");
    assert_matches!(
        read_taxonomy_report(&path),
        Err(BatchError::MalformedReport { line: 1, .. })
    );
}

#[test]
fn chunk_counts_are_summed() {
    let (_temp, root) = workspace();
    let reports = root.join("reports");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    write(
        &reports.join("h.1.fa.tsv"),
        &format!(
            "{HEADER}\nHomo sapiens\t9606\tspecies\t3000\t100\t90\t0.8\nBacteria\t2\tsuperkingdom\t0\t25\t20\t0.2\n"
        ),
    );
    write(
        &reports.join("h.2.fa.tsv"),
        &format!("{HEADER}\nHuman\t9606\tspecies\t3100\t50\t40\t1.0\n"),
    );
    write(&reports.join("h.1.fa.sum"), "readID\tseqID\nr1\t9606\n");
    write(&reports.join("h.2.fa.sum"), "readID\tseqID\nr2\t2\n");

    let plan = chunked_plan(&root, "h", 2);
    let target = ReduceTarget::from_plan(&plan, &reports);
    let collapsed = root.join("collapsed");
    let outcome = Reducer::new(&collapsed)
        .reduce(&[target], &JsonOutput)
        .unwrap();

    assert_eq!(outcome[0].sample, "h");
    assert_matches!(&outcome[0].taxonomy, ReportStatus::Written { chunks: 2, .. });
    assert_matches!(&outcome[0].summary, ReportStatus::Written { chunks: 2, .. });

    let merged = fs::read_to_string(collapsed.join("h.tsv").as_std_path()).unwrap();
    let lines = merged.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[1], "Bacteria\t2\tsuperkingdom\t0\t25\t20\t0.14");
    assert_eq!(lines[2], "Homo sapiens\t9606\tspecies\t3000\t150\t130\t0.86");
    assert_eq!(lines.len(), 3);

    let summary = fs::read_to_string(collapsed.join("h.sum").as_std_path()).unwrap();
    assert_eq!(summary, "readID\tseqID\nr1\t9606\nr2\t2\n");
}

#[test]
fn abundances_sum_to_one() {
    let mut merge = TaxonomyMerge::new();
    let (_temp, root) = workspace();
    let path = root.join("r.tsv");
    write(
        &path,
        &format!("{HEADER}\na\t1\tno rank\t0\t1\t1\t0\nb\t2\tno rank\t0\t1\t1\t0\nc\t3\tno rank\t0\t1\t1\t0\n"),
    );
    merge.add_report(&path).unwrap();

    let mut out = Vec::new();
    merge.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let sum: f64 = text
        .lines()
        .skip(1)
        .map(|line| line.rsplit('\t').next().unwrap().parse::<f64>().unwrap())
        .sum();
    assert!((sum - 1.0).abs() <= 0.01 * merge.len() as f64);
}

#[test]
fn missing_and_incomplete_samples_are_not_written() {
    let (_temp, root) = workspace();
    let reports = root.join("reports");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    write(
        &reports.join("part.1.fa.tsv"),
        &format!("{HEADER}\nx\t1\tno rank\t0\t1\t1\t1\n"),
    );

    let targets = [
        ReduceTarget::from_plan(&chunked_plan(&root, "part", 2), &reports),
        ReduceTarget::from_plan(&chunked_plan(&root, "none", 1), &reports),
    ];
    let collapsed = root.join("collapsed");
    let outcome = Reducer::new(&collapsed)
        .reduce(&targets, &JsonOutput)
        .unwrap();

    assert_eq!(
        outcome[0].taxonomy,
        ReportStatus::Incomplete { missing: vec![2] }
    );
    assert_eq!(outcome[0].summary, ReportStatus::Missing);
    assert_eq!(outcome[1].taxonomy, ReportStatus::Missing);
    assert!(!collapsed.join("part.tsv").as_std_path().exists());
    assert!(!collapsed.join("none.tsv").as_std_path().exists());
    assert!(!collapsed.join("part.sum").as_std_path().exists());
}

#[test]
fn existing_output_is_left_untouched() {
    let (_temp, root) = workspace();
    let reports = root.join("reports");
    let collapsed = root.join("collapsed");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    fs::create_dir_all(collapsed.as_std_path()).unwrap();
    write(
        &reports.join("d.1.fa.tsv"),
        &format!("{HEADER}\nx\t1\tno rank\t0\t1\t1\t1\n"),
    );
    write(&collapsed.join("d.tsv"), "previous run");

    let target = ReduceTarget::from_plan(&chunked_plan(&root, "d", 1), &reports);
    let outcome = Reducer::new(&collapsed)
        .reduce(&[target], &JsonOutput)
        .unwrap();

    assert_matches!(&outcome[0].taxonomy, ReportStatus::Exists { .. });
    assert_eq!(
        fs::read_to_string(collapsed.join("d.tsv").as_std_path()).unwrap(),
        "previous run"
    );
}

#[test]
fn scanning_orders_chunks_numerically() {
    let (_temp, root) = workspace();
    let reports = root.join("reports");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    for index in (1..=10).rev() {
        write(
            &reports.join(format!("big.{index}.fq.tsv")),
            &format!("{HEADER}\nx\t1\tno rank\t0\t{index}\t1\t1\n"),
        );
        write(
            &reports.join(format!("big.{index}.fq.sum")),
            &format!("readID\nread{index}\n"),
        );
    }
    write(&reports.join("bigger.1.fq.tsv"), HEADER);
    write(&reports.join("big.x.fq.tsv"), HEADER);

    let targets = scan_reports(&[root.join("in/big.fq.gz")], &reports, None).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].sample, "big");
    assert_eq!(targets[0].expected, (1..=10).collect::<Vec<u32>>());
    let indexes = targets[0]
        .reports
        .iter()
        .map(|report| report.index)
        .collect::<Vec<_>>();
    assert_eq!(indexes, (1..=10).collect::<Vec<u32>>());

    let collapsed = root.join("collapsed");
    Reducer::new(&collapsed)
        .reduce(&targets, &JsonOutput)
        .unwrap();
    let summary = fs::read_to_string(collapsed.join("big.sum").as_std_path()).unwrap();
    let expected_summary = std::iter::once("readID".to_string())
        .chain((1..=10).map(|index| format!("read{index}")))
        .map(|line| line + "\n")
        .collect::<String>();
    assert_eq!(summary, expected_summary);
    let merged = fs::read_to_string(collapsed.join("big.tsv").as_std_path()).unwrap();
    assert_eq!(merged.lines().nth(1), Some("x\t1\tno rank\t0\t55\t10\t1.0"));
}

#[test]
fn gap_in_scanned_chunks_is_incomplete() {
    let (_temp, root) = workspace();
    let reports = root.join("reports");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    for index in [1, 3] {
        write(
            &reports.join(format!("lane.{index}.fa.tsv")),
            &format!("{HEADER}\nx\t1\tno rank\t0\t1\t1\t1\n"),
        );
        write(
            &reports.join(format!("lane.{index}.fa.sum")),
            &format!("readID\nread{index}\n"),
        );
    }

    let targets = scan_reports(&[root.join("lane.fa")], &reports, None).unwrap();
    assert_eq!(targets[0].expected, [1, 2, 3]);
    let collapsed = root.join("collapsed");
    let outcome = Reducer::new(&collapsed)
        .reduce(&targets, &JsonOutput)
        .unwrap();

    assert_eq!(
        outcome[0].taxonomy,
        ReportStatus::Incomplete { missing: vec![2] }
    );
    assert_eq!(
        outcome[0].summary,
        ReportStatus::Incomplete { missing: vec![2] }
    );
    assert!(!collapsed.join("lane.tsv").as_std_path().exists());
    assert!(!collapsed.join("lane.sum").as_std_path().exists());
}

#[test]
fn split_manifest_reveals_missing_last_chunk() {
    let (_temp, root) = workspace();
    let input_path = root.join("lane.fa");
    write(&input_path, ">a\nAC\n>b\nGT\n>c\nTT\n");
    let input = InputFile::classify(&input_path).unwrap();
    let split_dir = root.join("split");
    Splitter::new(1, &split_dir).unwrap().split(&input).unwrap();

    let reports = root.join("reports");
    fs::create_dir_all(reports.as_std_path()).unwrap();
    for index in [1, 2] {
        write(
            &reports.join(format!("lane.{index}.fa.tsv")),
            &format!("{HEADER}\nx\t1\tno rank\t0\t1\t1\t1\n"),
        );
    }

    let without_manifest = scan_reports(&[input_path.clone()], &reports, None).unwrap();
    assert_eq!(without_manifest[0].expected, [1, 2]);

    let targets = scan_reports(&[input_path], &reports, Some(split_dir.as_path())).unwrap();
    assert_eq!(targets[0].expected, [1, 2, 3]);
    let outcome = Reducer::new(root.join("collapsed"))
        .reduce(&targets, &JsonOutput)
        .unwrap();
    assert_eq!(
        outcome[0].taxonomy,
        ReportStatus::Incomplete { missing: vec![3] }
    );
}

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use centrifuge_batch::config::{
    Config, ConfigLoader, DEFAULT_CLASSIFIER, DEFAULT_MAX_SEQS_PER_FILE, DEFAULT_THREADS,
    ExcludeEntry, RunSettings,
};
use centrifuge_batch::domain::{DEFAULT_INDEX, SeqFormat, TaxId};
use centrifuge_batch::error::BatchError;
use centrifuge_batch::pairing::default_extensions;

fn index_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, dir)
}

#[test]
fn parse_full_config() {
    let config = ConfigLoader::parse(
        r#"{
            "index": "nt",
            "index_dir": "/db/centrifuge",
            "out_dir": "/scratch/out",
            "format": "fastq",
            "threads": 8,
            "procs": 3,
            "max_seqs_per_file": 500,
            "halt_after": 2,
            "reads_not_paired": true,
            "exclude_taxids": [9606],
            "extensions": ["fq", "fastq"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.index.as_deref(), Some("nt"));
    assert_eq!(config.format, Some(SeqFormat::Fastq));
    assert_eq!(config.threads, Some(8));
    assert_eq!(config.halt_after, Some(2));
    assert_eq!(config.reads_not_paired, Some(true));
    assert_matches!(config.exclude_taxids, Some(ExcludeEntry::List(ids)) if ids == vec![9606]);
}

#[test]
fn parse_rejects_invalid_json() {
    assert_matches!(
        ConfigLoader::parse("{ threads: 4 }"),
        Err(BatchError::ConfigParse(_))
    );
    assert_matches!(
        ConfigLoader::parse(r#"{"threads": "four"}"#),
        Err(BatchError::ConfigParse(_))
    );
}

#[test]
fn resolve_reads_explicit_path() {
    let (_temp, dir) = index_dir();
    let path = dir.join("batch.json");
    std::fs::write(path.as_std_path(), r#"{"procs": 5}"#).unwrap();

    let config = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(config.procs, Some(5));

    assert_matches!(
        ConfigLoader::resolve(Some(dir.join("missing.json").as_str())),
        Err(BatchError::ConfigRead(_))
    );
}

#[test]
fn settings_defaults() {
    let (_temp, dir) = index_dir();
    let settings = RunSettings::resolve(Config {
        index_dir: Some(dir.clone()),
        out_dir: Some(dir.join("out")),
        ..Config::default()
    })
    .unwrap();

    assert_eq!(settings.classifier.program, DEFAULT_CLASSIFIER);
    assert_eq!(settings.classifier.index.as_str(), DEFAULT_INDEX);
    assert_eq!(settings.classifier.index_dir, dir);
    assert_eq!(settings.classifier.threads, DEFAULT_THREADS);
    assert!(settings.classifier.exclude.is_empty());
    assert!(settings.procs >= 1);
    assert_eq!(settings.max_seqs_per_file, DEFAULT_MAX_SEQS_PER_FILE);
    assert_eq!(settings.halt_after, 0);
    assert!(settings.split);
    assert!(!settings.reads_not_paired);
    assert_eq!(settings.extensions, default_extensions());
}

#[test]
fn command_line_overrides_file() {
    let (_temp, dir) = index_dir();
    let file = Config {
        index_dir: Some(dir.clone()),
        out_dir: Some(dir.join("out")),
        threads: Some(2),
        exclude_taxids: Some(ExcludeEntry::List(vec![1])),
        ..Config::default()
    };
    let cli = Config {
        threads: Some(6),
        no_split: Some(true),
        exclude_taxids: Some(ExcludeEntry::Shorthand("9606,10090".to_string())),
        ..Config::default()
    };

    let settings = RunSettings::resolve(file.overlay(cli)).unwrap();
    assert_eq!(settings.classifier.threads, 6);
    assert!(!settings.split);
    assert_eq!(
        settings.classifier.exclude,
        vec![TaxId::new(9606), TaxId::new(10090)]
    );
}

#[test]
fn settings_validation_errors() {
    let (_temp, dir) = index_dir();
    let base = Config {
        index_dir: Some(dir.clone()),
        out_dir: Some(dir.join("out")),
        ..Config::default()
    };

    assert_matches!(
        RunSettings::resolve(Config {
            index_dir: None,
            ..base.clone()
        }),
        Err(BatchError::Config(_))
    );
    assert_matches!(
        RunSettings::resolve(Config {
            index_dir: Some(dir.join("nope")),
            ..base.clone()
        }),
        Err(BatchError::Config(_))
    );
    assert_matches!(
        RunSettings::resolve(Config {
            index: Some("refseq".to_string()),
            ..base.clone()
        }),
        Err(BatchError::InvalidIndex(_))
    );
    for invalid in [
        Config {
            threads: Some(0),
            ..base.clone()
        },
        Config {
            procs: Some(0),
            ..base.clone()
        },
        Config {
            max_seqs_per_file: Some(0),
            ..base.clone()
        },
    ] {
        assert_matches!(RunSettings::resolve(invalid), Err(BatchError::Config(_)));
    }
}

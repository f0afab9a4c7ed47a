use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{IndexName, SeqFormat, TaxId, parse_exclusions};
use crate::error::BatchError;
use crate::fs_util;
use crate::jobs::ClassifierParams;
use crate::pairing::default_extensions;

pub const CONFIG_FILE_NAME: &str = "centrifuge-batch.json";
pub const DEFAULT_CLASSIFIER: &str = "centrifuge";
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_MAX_SEQS_PER_FILE: usize = 1_000_000;
pub const DEFAULT_OUT_DIR: &str = "centrifuge-out";

/// Batch settings as written in a config file or given on the command line; every
/// field is optional so the two can be layered.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub index_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub out_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub format: Option<SeqFormat>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub procs: Option<usize>,
    #[serde(default)]
    pub max_seqs_per_file: Option<usize>,
    #[serde(default)]
    pub halt_after: Option<usize>,
    #[serde(default)]
    pub reads_not_paired: Option<bool>,
    #[serde(default)]
    pub no_split: Option<bool>,
    #[serde(default)]
    pub exclude_taxids: Option<ExcludeEntry>,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExcludeEntry {
    List(Vec<u64>),
    Shorthand(String),
}

impl ExcludeEntry {
    fn resolve(self) -> Vec<TaxId> {
        match self {
            ExcludeEntry::List(ids) => ids.into_iter().map(TaxId::new).collect(),
            ExcludeEntry::Shorthand(value) => parse_exclusions(&value),
        }
    }
}

impl Config {
    /// Values set in `top` win over values in `self`.
    pub fn overlay(self, top: Config) -> Config {
        Config {
            classifier: top.classifier.or(self.classifier),
            index: top.index.or(self.index),
            index_dir: top.index_dir.or(self.index_dir),
            out_dir: top.out_dir.or(self.out_dir),
            format: top.format.or(self.format),
            threads: top.threads.or(self.threads),
            procs: top.procs.or(self.procs),
            max_seqs_per_file: top.max_seqs_per_file.or(self.max_seqs_per_file),
            halt_after: top.halt_after.or(self.halt_after),
            reads_not_paired: top.reads_not_paired.or(self.reads_not_paired),
            no_split: top.no_split.or(self.no_split),
            exclude_taxids: top.exclude_taxids.or(self.exclude_taxids),
            extensions: top.extensions.or(self.extensions),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Otherwise `centrifuge-batch.json` in the working
    /// directory, then `config.json` in the user config directory, then defaults.
    pub fn resolve(path: Option<&str>) -> Result<Config, BatchError> {
        if let Some(path) = path {
            return Self::load(PathBuf::from(path));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load(local);
        }
        if let Some(dirs) = ProjectDirs::from("", "", "centrifuge-batch") {
            let user = dirs.config_dir().join("config.json");
            if user.is_file() {
                return Self::load(user);
            }
        }
        Ok(Config::default())
    }

    fn load(path: PathBuf) -> Result<Config, BatchError> {
        let content = fs::read_to_string(&path).map_err(|_| BatchError::ConfigRead(path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, BatchError> {
        serde_json::from_str(content).map_err(|err| BatchError::ConfigParse(err.to_string()))
    }
}

/// Validated settings for a `run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub classifier: ClassifierParams,
    pub out_dir: Utf8PathBuf,
    pub format: Option<SeqFormat>,
    pub procs: usize,
    pub max_seqs_per_file: usize,
    pub halt_after: usize,
    pub reads_not_paired: bool,
    pub split: bool,
    pub extensions: Vec<String>,
}

impl RunSettings {
    pub fn resolve(config: Config) -> Result<Self, BatchError> {
        let index: IndexName = match config.index {
            Some(name) => name.parse()?,
            None => IndexName::default(),
        };
        let index_dir = config
            .index_dir
            .ok_or_else(|| BatchError::Config("--index-dir is required".to_string()))?;
        if !index_dir.as_std_path().is_dir() {
            return Err(BatchError::Config(format!(
                "--index-dir \"{index_dir}\" is not a directory"
            )));
        }

        let threads = config.threads.unwrap_or(DEFAULT_THREADS);
        if threads < 1 {
            return Err(BatchError::Config(
                "--threads cannot be less than one".to_string(),
            ));
        }
        let procs = config.procs.unwrap_or_else(|| default_procs(threads));
        if procs < 1 {
            return Err(BatchError::Config(
                "--procs cannot be less than one".to_string(),
            ));
        }
        let max_seqs_per_file = config
            .max_seqs_per_file
            .unwrap_or(DEFAULT_MAX_SEQS_PER_FILE);
        if max_seqs_per_file < 1 {
            return Err(BatchError::Config(
                "--max-seqs-per-file cannot be less than one".to_string(),
            ));
        }

        let out_dir = match config.out_dir {
            Some(dir) => dir,
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|err| BatchError::Filesystem(err.to_string()))?;
                fs_util::utf8_path(cwd)?.join(DEFAULT_OUT_DIR)
            }
        };

        Ok(Self {
            classifier: ClassifierParams {
                program: config
                    .classifier
                    .unwrap_or_else(|| DEFAULT_CLASSIFIER.to_string()),
                index,
                index_dir,
                threads,
                exclude: config
                    .exclude_taxids
                    .map(ExcludeEntry::resolve)
                    .unwrap_or_default(),
            },
            out_dir,
            format: config.format,
            procs,
            max_seqs_per_file,
            halt_after: config.halt_after.unwrap_or(0),
            reads_not_paired: config.reads_not_paired.unwrap_or(false),
            split: !config.no_split.unwrap_or(false),
            extensions: config.extensions.unwrap_or_else(default_extensions),
        })
    }
}

fn default_procs(threads: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|cores| cores.get())
        .unwrap_or(1);
    (cores / threads).max(1)
}

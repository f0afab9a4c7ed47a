use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

pub const VALID_INDEXES: [&str; 4] = ["nt", "p+h+v", "p_compressed", "p_compressed+h+v"];

pub const DEFAULT_INDEX: &str = "p_compressed+h+v";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

impl SeqFormat {
    /// Maps a sequence file extension (without the dot, `.gz` already stripped).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "fa" | "fna" | "fasta" => Some(SeqFormat::Fasta),
            "fq" | "fastq" => Some(SeqFormat::Fastq),
            _ => None,
        }
    }

    pub fn guess(file_name: &str) -> Option<Self> {
        let (_, ext) = split_file_name(file_name);
        Self::from_extension(ext)
    }
}

impl fmt::Display for SeqFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqFormat::Fasta => write!(f, "fasta"),
            SeqFormat::Fastq => write!(f, "fastq"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MateRole {
    Forward,
    Reverse,
    Unpaired,
}

impl fmt::Display for MateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MateRole::Forward => write!(f, "forward"),
            MateRole::Reverse => write!(f, "reverse"),
            MateRole::Unpaired => write!(f, "unpaired"),
        }
    }
}

/// A discovered sequence file with its inferred format and mate role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputFile {
    path: Utf8PathBuf,
    format: SeqFormat,
    role: MateRole,
}

impl InputFile {
    pub fn new(path: impl Into<Utf8PathBuf>, format: SeqFormat) -> Self {
        Self {
            path: path.into(),
            format,
            role: MateRole::Unpaired,
        }
    }

    /// Infers the format from the file extension.
    pub fn classify(path: impl Into<Utf8PathBuf>) -> Result<Self, BatchError> {
        let path = path.into();
        let format = path
            .file_name()
            .and_then(SeqFormat::guess)
            .ok_or_else(|| BatchError::UnrecognizedFormat(path.clone()))?;
        Ok(Self::new(path, format))
    }

    pub fn with_role(self, role: MateRole) -> Self {
        Self { role, ..self }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn format(&self) -> SeqFormat {
        self.format
    }

    pub fn role(&self) -> MateRole {
        self.role
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    pub fn is_gzipped(&self) -> bool {
        is_gzip_name(self.file_name())
    }

    /// File name without `.gz` and without the sequence extension.
    pub fn stem(&self) -> &str {
        split_file_name(self.file_name()).0
    }

    /// Sequence extension without the dot, empty when the name has none.
    pub fn extension(&self) -> &str {
        split_file_name(self.file_name()).1
    }
}

impl fmt::Display for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

pub fn is_gzip_name(name: &str) -> bool {
    name.len() > 3
        && name
            .get(name.len() - 3..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(".gz"))
}

/// Splits `sample.fa.gz` into (`sample`, `fa`) and `sample` into (`sample`, ``).
pub fn split_file_name(name: &str) -> (&str, &str) {
    let name = if is_gzip_name(name) {
        &name[..name.len() - 3]
    } else {
        name
    };
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxId(u64);

impl TaxId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxId {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(BatchError::InvalidTaxId(value.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| BatchError::InvalidTaxId(value.to_string()))
    }
}

/// Parses a comma separated list of taxon ids, dropping entries that are not numeric.
pub fn parse_exclusions(value: &str) -> Vec<TaxId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.parse::<TaxId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("tax_id \"{item}\" is not numeric, ignoring");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexName(String);

impl IndexName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IndexName {
    fn default() -> Self {
        Self(DEFAULT_INDEX.to_string())
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IndexName {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !VALID_INDEXES.contains(&trimmed) {
            return Err(BatchError::InvalidIndex(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for IndexName {
    type Error = BatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IndexName> for String {
    fn from(value: IndexName) -> Self {
        value.0
    }
}

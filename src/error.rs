use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid index name: {0}")]
    #[diagnostic(help("valid index names: nt, p+h+v, p_compressed, p_compressed+h+v"))]
    InvalidIndex(String),

    #[error("invalid taxonomy id: {0}")]
    InvalidTaxId(String),

    #[error("{0}")]
    Discovery(String),

    #[error("unrecognized sequence format: {0}")]
    UnrecognizedFormat(Utf8PathBuf),

    #[error("malformed record #{record} in {path}: {message}")]
    MalformedRecord {
        path: Utf8PathBuf,
        record: usize,
        message: String,
    },

    #[error("malformed report {path} at line {line}: {message}")]
    MalformedReport {
        path: Utf8PathBuf,
        line: usize,
        message: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    #[error(
        "batch aborted after {failed} failed job(s): {started} started, {skipped} skipped, {not_attempted} not attempted"
    )]
    BatchAborted {
        started: usize,
        skipped: usize,
        failed: usize,
        not_attempted: usize,
    },

    #[error("{failed} of {started} job(s) failed")]
    JobsFailed { started: usize, failed: usize },
}

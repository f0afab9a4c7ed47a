use camino::Utf8PathBuf;

use crate::error::BatchError;
use crate::fs_util;

/// On-disk layout of one batch: split chunks, per-unit reports and collapsed reports.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn split_dir(&self) -> Utf8PathBuf {
        self.root.join("split")
    }

    pub fn reports_dir(&self) -> Utf8PathBuf {
        self.root.join("reports")
    }

    pub fn collapsed_dir(&self) -> Utf8PathBuf {
        self.root.join("collapsed")
    }

    pub fn ensure_root(&self) -> Result<(), BatchError> {
        fs_util::ensure_dir(&self.root)
    }

    pub fn ensure_split_dir(&self) -> Result<Utf8PathBuf, BatchError> {
        let dir = self.split_dir();
        fs_util::ensure_dir(&dir)?;
        Ok(dir)
    }

    pub fn ensure_reports_dir(&self) -> Result<Utf8PathBuf, BatchError> {
        let dir = self.reports_dir();
        fs_util::ensure_dir(&dir)?;
        Ok(dir)
    }

    pub fn ensure_collapsed_dir(&self) -> Result<Utf8PathBuf, BatchError> {
        let dir = self.collapsed_dir();
        fs_util::ensure_dir(&dir)?;
        Ok(dir)
    }
}

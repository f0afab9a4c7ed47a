use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::error::BatchError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), BatchError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("create {path}: {err}")))
}

pub fn utf8_path(path: PathBuf) -> Result<Utf8PathBuf, BatchError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| BatchError::Filesystem(format!("non-utf8 path: {}", path.display())))
}

/// Opens a temporary file next to `dest`; hand it back to [`persist`] once written.
pub fn atomic_writer(dest: &Utf8Path) -> Result<BufWriter<NamedTempFile>, BatchError> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    ensure_dir(parent)?;
    let temp = tempfile::Builder::new()
        .prefix(".cfbatch")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("temp file in {parent}: {err}")))?;
    Ok(BufWriter::new(temp))
}

pub fn persist(writer: BufWriter<NamedTempFile>, dest: &Utf8Path) -> Result<(), BatchError> {
    let temp = writer
        .into_inner()
        .map_err(|err| BatchError::Filesystem(format!("flush {dest}: {}", err.error())))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn write_bytes_atomic(dest: &Utf8Path, content: &[u8]) -> Result<(), BatchError> {
    let mut writer = atomic_writer(dest)?;
    writer
        .write_all(content)
        .map_err(|err| BatchError::Filesystem(format!("write {dest}: {err}")))?;
    persist(writer, dest)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BatchError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| BatchError::Filesystem(format!("read dir {dir}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BatchError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(utf8_path(path)?);
        }
    }
    files.sort();
    Ok(files)
}

pub fn remove_if_exists(path: &Utf8Path) -> Result<(), BatchError> {
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| BatchError::Filesystem(format!("remove {path}: {err}")))?;
    }
    Ok(())
}

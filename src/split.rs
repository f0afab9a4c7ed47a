use std::fs;
use std::io::BufWriter;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::{InputFile, SeqFormat};
use crate::error::BatchError;
use crate::fs_util;
use crate::seqio::SeqReader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u32,
    pub path: Utf8PathBuf,
    pub records: usize,
}

/// Written once every chunk of a parent has been persisted; marks the split as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub parent: Utf8PathBuf,
    pub format: SeqFormat,
    pub max_records: usize,
    pub records: usize,
    pub chunks: Vec<ChunkEntry>,
    pub created_at: String,
}

impl ChunkManifest {
    pub fn is_complete(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| chunk.path.as_std_path().is_file())
    }
}

#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub manifest: ChunkManifest,
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct Splitter {
    max_records: usize,
    target_dir: Utf8PathBuf,
}

impl Splitter {
    pub fn new(max_records: usize, target_dir: impl Into<Utf8PathBuf>) -> Result<Self, BatchError> {
        if max_records < 1 {
            return Err(BatchError::Config(
                "max records per chunk cannot be less than one".to_string(),
            ));
        }
        Ok(Self {
            max_records,
            target_dir: target_dir.into(),
        })
    }

    /// `<stem>.<index>.<ext>`; chunks are always written uncompressed.
    pub fn chunk_path(&self, input: &InputFile, index: u32) -> Utf8PathBuf {
        let name = match input.extension() {
            "" => format!("{}.{index}", input.stem()),
            ext => format!("{}.{index}.{ext}", input.stem()),
        };
        self.target_dir.join(name)
    }

    pub fn manifest_path(&self, input: &InputFile) -> Utf8PathBuf {
        self.target_dir
            .join(manifest_file_name(input.stem(), input.extension()))
    }

    pub fn split(&self, input: &InputFile) -> Result<SplitOutcome, BatchError> {
        if let Some(previous) = read_manifest(&self.manifest_path(input)) {
            let same_request =
                previous.parent == input.path() && previous.max_records == self.max_records;
            if same_request && previous.is_complete() {
                debug!("{} already split into {} chunk(s)", input, previous.chunks.len());
                return Ok(SplitOutcome {
                    manifest: previous,
                    reused: true,
                });
            }
            for chunk in &previous.chunks {
                fs_util::remove_if_exists(&chunk.path)?;
            }
            fs_util::remove_if_exists(&self.manifest_path(input))?;
        }

        fs_util::ensure_dir(&self.target_dir)?;
        let reader = SeqReader::open(input.path(), input.format())?;

        let mut chunks = Vec::new();
        let mut current: Option<(BufWriter<NamedTempFile>, ChunkEntry)> = None;
        let mut records = 0usize;
        for record in reader {
            let record = record?;
            if let Some((writer, entry)) =
                current.take_if(|(_, entry)| entry.records == self.max_records)
            {
                fs_util::persist(writer, &entry.path)?;
                chunks.push(entry);
            }
            if current.is_none() {
                let index = chunks.len() as u32 + 1;
                let path = self.chunk_path(input, index);
                let writer = fs_util::atomic_writer(&path)?;
                current = Some((
                    writer,
                    ChunkEntry {
                        index,
                        path,
                        records: 0,
                    },
                ));
            }
            if let Some((writer, entry)) = current.as_mut() {
                record
                    .write_to(writer)
                    .map_err(|err| BatchError::Filesystem(format!("write {}: {err}", entry.path)))?;
                entry.records += 1;
            }
            records += 1;
        }
        if let Some((writer, entry)) = current.take() {
            fs_util::persist(writer, &entry.path)?;
            chunks.push(entry);
        }

        let manifest = ChunkManifest {
            parent: input.path().to_path_buf(),
            format: input.format(),
            max_records: self.max_records,
            records,
            chunks,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| BatchError::Filesystem(err.to_string()))?;
        fs_util::write_bytes_atomic(&self.manifest_path(input), &content)?;

        info!(
            "wrote {} sequence{} to {} file{} for {}",
            records,
            if records == 1 { "" } else { "s" },
            manifest.chunks.len(),
            if manifest.chunks.len() == 1 { "" } else { "s" },
            input.file_name()
        );
        Ok(SplitOutcome {
            manifest,
            reused: false,
        })
    }
}

/// `<stem>.<ext>.manifest.json`, next to the chunks it lists.
pub fn manifest_file_name(stem: &str, ext: &str) -> String {
    match ext {
        "" => format!("{stem}.manifest.json"),
        ext => format!("{stem}.{ext}.manifest.json"),
    }
}

/// `None` when the manifest is absent or unreadable; callers treat both as "not split".
pub fn read_manifest(path: &Utf8Path) -> Option<ChunkManifest> {
    let content = fs::read_to_string(path.as_std_path()).ok()?;
    serde_json::from_str(&content).ok()
}

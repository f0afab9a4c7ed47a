use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::domain::{InputFile, MateRole};
use crate::error::BatchError;

pub const DEFAULT_EXTENSIONS: [&str; 5] = ["fa", "fna", "fasta", "fq", "fastq"];

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Inputs grouped by mate role. `forward[i]` and `reverse[i]` are the same sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub forward: Vec<InputFile>,
    pub reverse: Vec<InputFile>,
    pub unpaired: Vec<InputFile>,
}

impl FileGroup {
    pub fn pairs(&self) -> impl Iterator<Item = (&InputFile, &InputFile)> {
        self.forward.iter().zip(self.reverse.iter())
    }

    pub fn len(&self) -> usize {
        self.forward.len() + self.reverse.len() + self.unpaired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mate {
    First,
    Second,
}

/// Matches `<stem>[_-][Rr]?(1|2).<ext>[.gz]` against an explicit extension allow-list.
#[derive(Debug, Clone)]
pub struct PairingResolver {
    pattern: Regex,
}

impl PairingResolver {
    pub fn new(extensions: &[String]) -> Result<Self, BatchError> {
        let alternatives = extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>();
        if alternatives.is_empty() {
            return Err(BatchError::Config(
                "pairing extension list is empty".to_string(),
            ));
        }
        let pattern = format!(
            r"^(?P<stem>.+)[_-][Rr]?(?P<mate>[12])\.(?i:{})(?i:\.gz)?$",
            alternatives.join("|")
        );
        let pattern = Regex::new(&pattern).map_err(|err| BatchError::Config(err.to_string()))?;
        Ok(Self { pattern })
    }

    fn mate_of<'a>(&self, name: &'a str) -> Option<(&'a str, Mate)> {
        let captures = self.pattern.captures(name)?;
        let stem = captures.name("stem")?.as_str();
        let mate = match captures.name("mate")?.as_str() {
            "1" => Mate::First,
            _ => Mate::Second,
        };
        Some((stem, mate))
    }

    pub fn resolve(&self, files: &[InputFile], reads_not_paired: bool) -> FileGroup {
        if reads_not_paired {
            return FileGroup {
                unpaired: files
                    .iter()
                    .map(|file| file.clone().with_role(MateRole::Unpaired))
                    .collect(),
                ..FileGroup::default()
            };
        }

        let mut unpaired = Vec::new();
        let mut forward: Vec<(&str, &InputFile)> = Vec::new();
        let mut forward_stems = HashSet::new();
        let mut reverse: HashMap<&str, &InputFile> = HashMap::new();
        let mut reverse_order = Vec::new();

        for file in files {
            match self.mate_of(file.file_name()) {
                Some((stem, Mate::First)) if forward_stems.insert(stem) => {
                    forward.push((stem, file));
                }
                Some((stem, Mate::Second)) if !reverse.contains_key(stem) => {
                    reverse.insert(stem, file);
                    reverse_order.push(stem);
                }
                _ => unpaired.push(file),
            }
        }

        let mut group = FileGroup::default();
        for (stem, fwd) in forward {
            match reverse.remove(stem) {
                Some(rev) if rev.format() == fwd.format() => {
                    group.forward.push(fwd.clone().with_role(MateRole::Forward));
                    group.reverse.push(rev.clone().with_role(MateRole::Reverse));
                }
                Some(rev) => {
                    warn!(
                        "mates {} and {} differ in format, treating both as unpaired",
                        fwd, rev
                    );
                    unpaired.push(fwd);
                    unpaired.push(rev);
                }
                None => unpaired.push(fwd),
            }
        }
        for stem in reverse_order {
            if let Some(rev) = reverse.remove(stem) {
                warn!("reverse mate {} has no forward mate, treating as unpaired", rev);
                unpaired.push(rev);
            }
        }

        group.unpaired = unpaired
            .into_iter()
            .map(|file| file.clone().with_role(MateRole::Unpaired))
            .collect();
        group
    }
}

use std::collections::HashMap;

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::domain::{InputFile, SeqFormat};
use crate::error::BatchError;
use crate::fs_util;

/// Expands each query: a file is taken as is, a directory contributes its regular
/// files (not recursively, sorted by name). Anything else is ignored with a warning.
pub fn find_input_files(queries: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, BatchError> {
    let mut files = Vec::new();
    for query in queries {
        let path = query.as_std_path();
        if path.is_dir() {
            files.extend(fs_util::list_files(query)?);
        } else if path.is_file() {
            files.push(query.clone());
        } else {
            warn!("--query \"{query}\" neither file nor directory");
        }
    }
    Ok(files)
}

/// Assigns each file a sequence format, dropping those whose format cannot be inferred.
pub fn classify_inputs(
    files: Vec<Utf8PathBuf>,
    format: Option<SeqFormat>,
) -> Result<Vec<InputFile>, BatchError> {
    let mut inputs = Vec::with_capacity(files.len());
    let mut stems: HashMap<String, Utf8PathBuf> = HashMap::new();
    for path in files {
        let input = match format {
            Some(format) => InputFile::new(path, format),
            None => match InputFile::classify(path) {
                Ok(input) => input,
                Err(err) => {
                    warn!("skipping input: {err}");
                    continue;
                }
            },
        };
        if let Some(previous) = stems.insert(input.stem().to_string(), input.path().to_path_buf())
        {
            return Err(BatchError::Discovery(format!(
                "inputs \"{previous}\" and \"{}\" share the sample name \"{}\"",
                input.path(),
                input.stem()
            )));
        }
        inputs.push(input);
    }

    info!(
        "found {} input file{}",
        inputs.len(),
        if inputs.len() == 1 { "" } else { "s" }
    );
    if inputs.is_empty() {
        return Err(BatchError::Discovery("no usable files from --query".to_string()));
    }
    Ok(inputs)
}

pub fn discover(
    queries: &[Utf8PathBuf],
    format: Option<SeqFormat>,
) -> Result<Vec<InputFile>, BatchError> {
    classify_inputs(find_input_files(queries)?, format)
}

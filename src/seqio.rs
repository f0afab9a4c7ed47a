use std::fs::File;
use std::io::{self, BufReader, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use seq_io::fasta::{self, Record as _};
use seq_io::fastq::{self, Record as _};

use crate::domain::{SeqFormat, is_gzip_name};
use crate::error::BatchError;

/// One sequence record, kept as raw bytes. The splitter never interprets it beyond counting and
/// re-serializing, so headers in any encoding pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    pub header: Vec<u8>,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

impl SeqRecord {
    /// Header up to the first space or tab.
    pub fn id(&self) -> &[u8] {
        self.header
            .split(|byte| *byte == b' ' || *byte == b'\t')
            .next()
            .unwrap_or_default()
    }

    /// Writes the record back in the format it was read from.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match &self.qual {
            Some(qual) => {
                out.write_all(b"@")?;
                out.write_all(&self.header)?;
                out.write_all(b"\n")?;
                out.write_all(&self.seq)?;
                out.write_all(b"\n+\n")?;
                out.write_all(qual)?;
                out.write_all(b"\n")
            }
            None => {
                out.write_all(b">")?;
                out.write_all(&self.header)?;
                out.write_all(b"\n")?;
                out.write_all(&self.seq)?;
                out.write_all(b"\n")
            }
        }
    }
}

enum Failure {
    Io(io::Error),
    Malformed(String),
}

enum Records {
    Fasta(fasta::Reader<Box<dyn Read>>),
    Fastq(fastq::Reader<Box<dyn Read>>),
}

/// Streaming FASTA/FASTQ reader over a plain or gzip-compressed source.
pub struct SeqReader {
    records: Records,
    path: Utf8PathBuf,
    format: SeqFormat,
    count: usize,
}

impl SeqReader {
    pub fn open(path: &Utf8Path, format: SeqFormat) -> Result<Self, BatchError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| BatchError::Filesystem(format!("open {path}: {err}")))?;
        let is_gz = path.file_name().map(is_gzip_name).unwrap_or(false);
        let inner: Box<dyn Read> = if is_gz {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };
        Ok(Self::from_reader(inner, path, format))
    }

    pub fn from_reader(inner: Box<dyn Read>, path: &Utf8Path, format: SeqFormat) -> Self {
        let records = match format {
            SeqFormat::Fasta => Records::Fasta(fasta::Reader::new(inner)),
            SeqFormat::Fastq => Records::Fastq(fastq::Reader::new(inner)),
        };
        Self {
            records,
            path: path.to_path_buf(),
            format,
            count: 0,
        }
    }

    pub fn format(&self) -> SeqFormat {
        self.format
    }

    fn io_error(&self, err: io::Error) -> BatchError {
        BatchError::Filesystem(format!("read {}: {err}", self.path))
    }

    fn malformed(&self, message: String) -> BatchError {
        BatchError::MalformedRecord {
            path: self.path.clone(),
            record: self.count + 1,
            message,
        }
    }
}

impl Iterator for SeqReader {
    type Item = Result<SeqRecord, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.records {
            Records::Fasta(reader) => reader.next().map(|result| match result {
                Ok(record) => Ok(SeqRecord {
                    header: record.head().to_vec(),
                    seq: record.full_seq().into_owned(),
                    qual: None,
                }),
                Err(fasta::Error::Io(err)) => Err(Failure::Io(err)),
                Err(err) => Err(Failure::Malformed(err.to_string())),
            }),
            Records::Fastq(reader) => reader.next().map(|result| match result {
                Ok(record) => Ok(SeqRecord {
                    header: record.head().to_vec(),
                    seq: record.seq().to_vec(),
                    qual: Some(record.qual().to_vec()),
                }),
                Err(fastq::Error::Io(err)) => Err(Failure::Io(err)),
                Err(err) => Err(Failure::Malformed(err.to_string())),
            }),
        }?;
        Some(match item {
            Ok(record) => {
                self.count += 1;
                Ok(record)
            }
            Err(Failure::Io(err)) => Err(self.io_error(err)),
            Err(Failure::Malformed(message)) => Err(self.malformed(message)),
        })
    }
}

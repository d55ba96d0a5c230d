use std::io::{BufRead, Lines};
use std::path::{Path, PathBuf};

use crate::error::BatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    /// Header text after the leading `@`.
    pub header: String,
    pub sequence: String,
    /// Spacer text after the leading `+`.
    pub spacer: String,
    pub quality: String,
}

/// Strict four-line FASTQ reader. Blank lines between records are skipped; anything else
/// that breaks the header/sequence/spacer/quality layout is a `MalformedRecord` error,
/// after which iteration stops.
pub struct FastqRecords<R: BufRead> {
    lines: Lines<R>,
    path: PathBuf,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> FastqRecords<R> {
    pub fn new(reader: R, path: &Path) -> Self {
        Self {
            lines: reader.lines(),
            path: path.to_path_buf(),
            line_number: 0,
            done: false,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, BatchError> {
        match self.lines.next() {
            Some(Ok(line)) => {
                self.line_number += 1;
                Ok(Some(line))
            }
            Some(Err(err)) => Err(BatchError::Filesystem(format!(
                "read {}: {err}",
                self.path.display()
            ))),
            None => Ok(None),
        }
    }

    fn malformed(&self, line: &str, reason: &str) -> BatchError {
        BatchError::MalformedRecord {
            path: self.path.clone(),
            line_number: self.line_number,
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }

    fn read_record(&mut self) -> Result<Option<FastqRecord>, BatchError> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        let Some(header) = header.strip_prefix('@').map(str::to_string) else {
            return Err(self.malformed(&header, "header line does not start with '@'"));
        };

        let Some(sequence) = self.next_line()? else {
            return Err(self.malformed(
                &format!("@{header}"),
                "header and sequence line counts differ",
            ));
        };

        let Some(spacer) = self.next_line()? else {
            return Err(self.malformed(&sequence, "record ends before the spacer line"));
        };
        let Some(spacer) = spacer.strip_prefix('+').map(str::to_string) else {
            return Err(self.malformed(&spacer, "spacer line does not start with '+'"));
        };

        let Some(quality) = self.next_line()? else {
            return Err(self.malformed(&format!("+{spacer}"), "record ends before the quality line"));
        };

        Ok(Some(FastqRecord {
            header,
            sequence,
            spacer,
            quality,
        }))
    }
}

impl<R: BufRead> Iterator for FastqRecords<R> {
    type Item = Result<FastqRecord, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

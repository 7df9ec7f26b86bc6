//! Streaming record source over a directory of capture text files.

use std::fs::File;
use std::io::{BufRead, BufReader, Split};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::IdsResult;
use crate::record::{FlowRecord, RecordParser};

/// Counters of a [`DirectorySource`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub files: u64,
    pub lines: u64,
    pub records: u64,
    pub dropped: u64,
}

/// Lazily yields the records of every regular file in a directory,
/// files in name order, lines in file order. Malformed lines are
/// dropped and counted; I/O failures are yielded as errors.
pub struct DirectorySource {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, Split<BufReader<File>>)>,
    parser: RecordParser,
    stats: SourceStats,
}

impl DirectorySource {
    /// Open `path`. A plain file is read on its own.
    pub fn open(path: impl AsRef<Path>) -> IdsResult<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.path());
                }
            }
            files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        }
        debug!(path = %path.display(), files = files.len(), "record source opened");
        Ok(Self {
            files: files.into_iter(),
            current: None,
            parser: RecordParser::new()?,
            stats: SourceStats::default(),
        })
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn next_line(&mut self) -> Option<IdsResult<(PathBuf, Vec<u8>)>> {
        loop {
            if let Some((path, lines)) = self.current.as_mut() {
                match lines.next() {
                    Some(Ok(line)) => return Some(Ok((path.clone(), line))),
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => self.current = None,
                }
            }
            let path = self.files.next()?;
            match File::open(&path) {
                Ok(file) => {
                    self.stats.files += 1;
                    debug!(file = %path.display(), "reading capture file");
                    let lines = BufReader::new(file).split(b'\n');
                    self.current = Some((path, lines));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

impl Iterator for DirectorySource {
    type Item = IdsResult<FlowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (path, raw) = match self.next_line()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.stats.lines += 1;
            let Ok(line) = String::from_utf8(raw) else {
                self.stats.dropped += 1;
                warn!(file = %path.display(), line = self.stats.lines, "non-utf8 line dropped");
                continue;
            };
            if line.trim().is_empty() {
                self.stats.dropped += 1;
                continue;
            }
            match self.parser.parse(&line) {
                Ok(record) => {
                    self.stats.records += 1;
                    return Some(Ok(record));
                }
                Err(e) => {
                    self.stats.dropped += 1;
                    debug!(file = %path.display(), line = self.stats.lines, error = %e, "line dropped");
                }
            }
        }
    }
}

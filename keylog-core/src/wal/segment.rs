//! A single segment file

use super::{SegmentEntry, SegmentName};
use crate::{KeylogError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// An open segment file, either the append handle or a read handle
pub struct Segment {
    name: SegmentName,
    path: PathBuf,
    handle: Handle,
}

enum Handle {
    Append(Appender),
    Read(BufReader<File>),
}

struct Appender {
    file: File,
    // bytes of complete records, the length to roll back to
    committed: u64,
    poisoned: bool,
}

impl Segment {
    /// Open a segment for appending, creating the file if needed
    pub fn open_append(dir: &Path, name: SegmentName) -> Result<Self> {
        let path = dir.join(name.file_name());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed = file.metadata()?.len();
        Ok(Self {
            name,
            path,
            handle: Handle::Append(Appender {
                file,
                committed,
                poisoned: false,
            }),
        })
    }

    /// Open an existing segment for iteration only
    pub fn open_read(dir: &Path, name: SegmentName) -> Result<Self> {
        let path = dir.join(name.file_name());
        let file = File::open(&path)?;
        Ok(Self {
            name,
            path,
            handle: Handle::Read(BufReader::new(file)),
        })
    }

    /// Create (or truncate) a file at `path` that will later be published
    /// under `name`
    pub(crate) fn create_staged(path: PathBuf, name: SegmentName) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            name,
            path,
            handle: Handle::Append(Appender {
                file,
                committed: 0,
                poisoned: false,
            }),
        })
    }

    /// Sync a staged segment and rename it to its final location
    pub(crate) fn publish(&mut self, dir: &Path) -> Result<()> {
        self.sync()?;
        let target = dir.join(self.name.file_name());
        fs::rename(&self.path, &target)?;
        sync_dir(dir);
        self.path = target;
        Ok(())
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.handle, Handle::Read(_))
    }

    /// Whether a failed write left bytes that could not be rolled back.
    /// A poisoned segment refuses further writes.
    pub fn is_poisoned(&self) -> bool {
        matches!(&self.handle, Handle::Append(appender) if appender.poisoned)
    }

    /// Append one entry; the whole line reaches the OS before returning.
    ///
    /// On failure the file is cut back to its last complete record, so a
    /// failed append leaves nothing behind. If that cut fails too, the
    /// segment is poisoned.
    pub fn write_entry(&mut self, entry: &SegmentEntry) -> Result<()> {
        let appender = match &mut self.handle {
            Handle::Append(appender) => appender,
            Handle::Read(_) => return Err(KeylogError::ReadOnlySegment(self.name.file_name())),
        };
        if appender.poisoned {
            return Err(KeylogError::Poisoned(self.name.file_name()));
        }

        let line = entry.to_line();
        if let Err(e) = appender.file.write_all(line.as_bytes()) {
            if let Err(rollback) = appender.file.set_len(appender.committed) {
                error!(
                    "Failed to roll back partial write in segment {}: {}",
                    self.name, rollback
                );
                appender.poisoned = true;
            }
            return Err(e.into());
        }
        appender.committed += line.len() as u64;
        Ok(())
    }

    /// Force written data down to the storage device
    pub fn sync(&mut self) -> Result<()> {
        if let Handle::Append(appender) = &mut self.handle {
            appender.file.sync_data()?;
        }
        Ok(())
    }

    /// Current size of the backing file in bytes
    pub fn size(&self) -> Result<u64> {
        let file = match &self.handle {
            Handle::Append(appender) => &appender.file,
            Handle::Read(reader) => reader.get_ref(),
        };
        Ok(file.metadata()?.len())
    }

    /// Consume the segment into a one-shot iterator over its entries.
    ///
    /// A read handle continues from its current position; an append handle
    /// is released and the file is reopened from the start.
    pub fn into_entries(self) -> Result<SegmentEntries<BufReader<File>>> {
        let source = self.name.file_name();
        let reader = match self.handle {
            Handle::Read(reader) => reader,
            Handle::Append(_) => BufReader::new(File::open(&self.path)?),
        };
        Ok(SegmentEntries::new(reader, source))
    }

    /// Release the file handle
    pub fn close(self) -> Result<()> {
        debug!("Closed segment {}", self.name);
        Ok(())
    }
}

/// Drop a final record left incomplete by a crash.
///
/// If the last line of the file is missing its newline or does not parse,
/// the file is truncated to the start of that line. Returns the number of
/// bytes removed.
pub fn truncate_torn_tail(path: &Path) -> Result<u64> {
    let data = fs::read(path)?;
    if data.is_empty() {
        return Ok(0);
    }

    let terminated = data.ends_with(b"\n");
    let body_end = if terminated { data.len() - 1 } else { data.len() };
    let last_start = data[..body_end]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);

    let intact = terminated
        && match std::str::from_utf8(&data[last_start..body_end]) {
            Ok(line) => line.is_empty() || SegmentEntry::parse_line(line).is_ok(),
            Err(_) => false,
        };
    if intact {
        return Ok(0);
    }

    let dropped = (data.len() - last_start) as u64;
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(last_start as u64)?;
    file.sync_all()?;
    warn!(
        "Truncated {} bytes of incomplete record from the end of {:?}",
        dropped, path
    );
    Ok(dropped)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!("Failed to sync directory {:?}: {}", dir, e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Lazy iterator over the entries of one segment, in file order
pub struct SegmentEntries<R> {
    reader: R,
    source: String,
    tolerate_torn_tail: bool,
    line: String,
    done: bool,
}

impl<R: BufRead> SegmentEntries<R> {
    /// Iterate the records readable from `reader`; `source` names the
    /// segment in log output
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
            tolerate_torn_tail: false,
            line: String::new(),
            done: false,
        }
    }

    /// Discard, instead of failing on, a final record that is unterminated or
    /// unparseable
    pub fn tolerate_torn_tail(mut self, tolerate: bool) -> Self {
        self.tolerate_torn_tail = tolerate;
        self
    }

    fn at_eof(&mut self) -> bool {
        self.reader.fill_buf().map(|b| b.is_empty()).unwrap_or(false)
    }

    fn discard_tail(&self, reason: &str) -> Option<Result<SegmentEntry>> {
        warn!(
            "Discarding torn record at end of segment {} ({}): {:?}",
            self.source, reason, self.line
        );
        None
    }
}

impl<R: BufRead> Iterator for SegmentEntries<R> {
    type Item = Result<SegmentEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let terminated = self.line.ends_with('\n');
                    let text = self.line.strip_suffix('\n').unwrap_or(&self.line);
                    if text.is_empty() {
                        continue;
                    }

                    if !terminated && self.tolerate_torn_tail {
                        self.done = true;
                        return self.discard_tail("missing newline");
                    }

                    match SegmentEntry::parse_line(text) {
                        Ok(entry) => return Some(Ok(entry)),
                        Err(e) => {
                            self.done = true;
                            if self.tolerate_torn_tail && self.at_eof() {
                                return self.discard_tail("unparseable");
                            }
                            return Some(Err(e));
                        }
                    }
                }
                Err(e) => {
                    self.done = true;
                    if self.tolerate_torn_tail
                        && e.kind() == std::io::ErrorKind::InvalidData
                        && self.at_eof()
                    {
                        return self.discard_tail("invalid utf-8");
                    }
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

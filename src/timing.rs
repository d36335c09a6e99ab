use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::foundation::error::{ConvError, ConvResult};

pub const TIMING_FILE: &str = "time.txt";

/// One `(strategy, elapsed)` measurement of a whole batch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimingEntry {
    pub strategy: String,
    pub elapsed_ms: u128,
}

impl TimingEntry {
    pub fn new(strategy: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            strategy: strategy.into(),
            elapsed_ms: elapsed.as_millis(),
        }
    }

    /// `Time (<strategy>): <elapsed-ms>`
    pub fn to_line(&self) -> String {
        format!("Time ({}): {}", self.strategy, self.elapsed_ms)
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_end().strip_prefix("Time (")?;
        let (strategy, ms) = rest.split_once("): ")?;
        Some(Self {
            strategy: strategy.to_string(),
            elapsed_ms: ms.trim().parse().ok()?,
        })
    }
}

/// Append-only handle on `<out_dir>/time.txt`.
#[derive(Debug)]
pub struct TimingLog {
    path: PathBuf,
    file: File,
}

impl TimingLog {
    pub fn open(out_dir: &Path) -> ConvResult<Self> {
        let path = out_dir.join(TIMING_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ConvError::config(format!("open timing log '{}': {e}", path.display()))
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &TimingEntry) -> ConvResult<()> {
        writeln!(self.file, "{}", entry.to_line())
            .and_then(|_| self.file.flush())
            .map_err(|e| {
                ConvError::config(format!("append to '{}': {e}", self.path.display()))
            })
    }
}

/// Every well-formed entry in a timing log, oldest first.
pub fn read_timing_log(path: &Path) -> ConvResult<Vec<TimingEntry>> {
    let f = File::open(path)
        .map_err(|e| ConvError::invalid_input(format!("open '{}': {e}", path.display())))?;
    let mut out = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line
            .map_err(|e| ConvError::invalid_input(format!("read '{}': {e}", path.display())))?;
        if let Some(entry) = TimingEntry::parse_line(&line) {
            out.push(entry);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_is_stable() {
        let e = TimingEntry::new("native_locked", Duration::from_micros(1_234_567));
        assert_eq!(e.to_line(), "Time (native_locked): 1234");
        assert_eq!(TimingEntry::parse_line(&e.to_line()), Some(e));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(TimingEntry::parse_line("Time (x) 12"), None);
        assert_eq!(TimingEntry::parse_line("Time (x): abc"), None);
        assert_eq!(TimingEntry::parse_line(""), None);
    }
}

//! Append-only warning log for flagged rides.
//!
//! A [`FlagSink`] is opened once per run, written by the Flagger, and closed
//! when the stage finishes. Each line also goes out as a `tracing` warning so
//! it shows up next to the rest of the run's logs.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use tracing::{debug, warn};

pub struct FlagSink<W: Write> {
    writer: W,
    lines: usize,
}

impl FlagSink<BufWriter<File>> {
    /// Opens `path` for appending, creating it and its parent directory if
    /// needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        debug!(path = %path.display(), "Flag sink opened");
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> FlagSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Appends `{timestamp} - {message}`.
    pub fn warn(&mut self, message: &str) -> std::io::Result<()> {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        writeln!(self.writer, "{now} - {message}")?;
        self.lines += 1;
        warn!(target: "ride_flags", "{message}");
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    /// Flushes and hands back the underlying writer.
    pub fn close(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_lines_have_timestamp_prefix() {
        let mut sink = FlagSink::from_writer(Vec::new());
        sink.warn("Long rides > 45 mins: 3").unwrap();
        assert_eq!(sink.lines_written(), 1);

        let out = String::from_utf8(sink.close().unwrap()).unwrap();
        let line = out.lines().next().unwrap();
        let (stamp, message) = line.split_once(" - ").unwrap();
        assert_eq!(message, "Long rides > 45 mins: 3");
        assert_eq!(stamp.len(), "2022-12-01 10:00:00,000".len());
    }

    #[test]
    fn test_open_appends_across_runs() {
        let path = env::temp_dir().join(format!("bikeshare_etl_flags_{}.log", std::process::id()));
        let _ = fs::remove_file(&path);

        for _ in 0..2 {
            let mut sink = FlagSink::open(&path).unwrap();
            sink.warn("one").unwrap();
            sink.close().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        fs::remove_file(&path).unwrap();
    }
}

//!
//! Access-log sinks
//! ----------------
//! The request access log goes through an explicit sink abstraction instead
//! of swapping process-wide output streams: a console sink, a file sink and
//! a fan-out sink composing any number of them. Writes are serialized per
//! sink so concurrent handlers never interleave lines.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// One line at a time, in order, no interleaving.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes to standard output.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Appends to a log file, flushing after every line so the log survives an
/// abrupt exit.
pub struct FileSink {
    writer: Mutex<std::io::BufWriter<std::fs::File>>,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening access log {}", path.display()))?;
        Ok(Self { writer: Mutex::new(std::io::BufWriter::new(file)) })
    }
}

impl LogSink for FileSink {
    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", line);
        let _ = writer.flush();
    }
}

/// Fans one line out to every composed sink.
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for TeeSink {
    fn write_line(&self, line: &str) {
        for sink in &self.sinks {
            sink.write_line(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CaptureSink {
        lines: Mutex<Vec<String>>,
    }

    impl LogSink for CaptureSink {
        fn write_line(&self, line: &str) {
            self.lines.lock().push(line.to_string());
        }
    }

    #[test]
    fn tee_fans_out_to_all_sinks() {
        let a = Arc::new(CaptureSink { lines: Mutex::new(Vec::new()) });
        let b = Arc::new(CaptureSink { lines: Mutex::new(Vec::new()) });
        let tee = TeeSink::new(vec![a.clone(), b.clone()]);
        tee.write_line("hello");
        tee.write_line("world");
        assert_eq!(*a.lines.lock(), vec!["hello", "world"]);
        assert_eq!(*b.lines.lock(), vec!["hello", "world"]);
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        {
            let sink = FileSink::create(&path).unwrap();
            sink.write_line("first");
            sink.write_line("second");
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}

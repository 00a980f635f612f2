use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};

/// Destination for reconciliation log lines.
///
/// Implementations must serialise appends so that concurrent producers
/// never interleave within a line.
pub trait LogSink: Send + Sync {
    /// Append `line` (without trailing newline) to the file at `path`.
    fn append(&self, path: &Path, line: &str) -> ReconcileResult<()>;
}

struct OpenFile {
    path: PathBuf,
    file: File,
}

/// Appends lines to day files, one writer at a time.
///
/// The handle of the most recently written file stays open; writing to a
/// different file (the next day, another store) reopens.
pub struct FileLogSink {
    current: Mutex<Option<OpenFile>>,
    sync: bool,
}

impl FileLogSink {
    pub fn new(sync: bool) -> Self {
        Self {
            current: Mutex::new(None),
            sync,
        }
    }

    fn open(path: &Path) -> ReconcileResult<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ReconcileError::Open {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl Default for FileLogSink {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LogSink for FileLogSink {
    fn append(&self, path: &Path, line: &str) -> ReconcileResult<()> {
        let mut record = Vec::with_capacity(line.len() + 1);
        record.extend_from_slice(line.as_bytes());
        record.push(b'\n');

        let mut current = self.current.lock().expect("log sink mutex poisoned");
        let mut open = match current.take() {
            Some(open) if open.path == path => open,
            _ => {
                debug!(path = %path.display(), "reconciliation log opened");
                OpenFile {
                    path: path.to_path_buf(),
                    file: Self::open(path)?,
                }
            }
        };

        // Each line goes out in a single write.
        open.file.write_all(&record)?;
        if self.sync {
            open.file.sync_data()?;
        }
        *current = Some(open);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn appends_lines_and_switches_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(true);
        let day1 = dir.path().join("logs/2021-04-13");
        let day2 = dir.path().join("logs/2021-04-14");

        sink.append(&day1, "a").unwrap();
        sink.append(&day1, "b").unwrap();
        sink.append(&day2, "c").unwrap();
        sink.append(&day1, "d").unwrap();

        assert_eq!(fs::read_to_string(&day1).unwrap(), "a\nb\nd\n");
        assert_eq!(fs::read_to_string(&day2).unwrap(), "c\n");
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2021-04-13");
        let sink = Arc::new(FileLogSink::default());

        std::thread::scope(|scope| {
            for t in 0..4 {
                let sink = sink.clone();
                let path = path.clone();
                scope.spawn(move || {
                    for i in 0..250 {
                        sink.append(&path, &format!("thread-{t}-line-{i:04}")).unwrap();
                    }
                });
            }
        });

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 1000);
        assert!(lines.iter().all(|l| l.starts_with("thread-") && l.len() == "thread-0-line-0000".len()));
    }
}

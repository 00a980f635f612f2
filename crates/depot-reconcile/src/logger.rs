//! Append-only, date-sharded log of blob creations.
//!
//! Each store writes to its own log directory, one file per calendar day
//! named by ISO date (`2021-04-13`). A line records one creation:
//!
//! ```text
//! 2021-04-13 10:15:00,<blob id>,<date-based layout flag>
//! ```
//!
//! Replay also accepts `<timestamp>,<blob id>` and the legacy
//! `<blob id>,<flag>` shape; for legacy lines the file's date stands in for
//! the missing timestamp. Every record ends in a newline, so a last line
//! without one is a torn write and is skipped.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use depot_types::BlobId;

use crate::clock::{Clock, SystemClock};
use crate::config::ReconciliationConfig;
use crate::directories::ApplicationDirectories;
use crate::error::{ReconcileError, ReconcileResult};
use crate::sink::{FileLogSink, LogSink};

/// Name pattern of day files.
pub const LOG_FILE_DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp column pattern.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One parsed log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationEntry {
    pub blob_id: BlobId,
    /// Creation time, absent on legacy lines.
    pub timestamp: Option<NaiveDateTime>,
    /// Whether the blob uses the date-based layout, when recorded.
    pub date_based: Option<bool>,
    /// Date of the day file the line came from.
    pub file_date: NaiveDate,
}

impl ReconciliationEntry {
    /// Parse one line of the day file dated `file_date`. `None` if malformed.
    pub fn parse(line: &str, file_date: NaiveDate) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end_matches('\r').split(',').map(str::trim).collect();
        let (timestamp, id, date_based) = match fields.as_slice() {
            [ts, id, flag] => (Some(parse_timestamp(ts)?), *id, Some(parse_flag(flag)?)),
            [first, second] => match parse_timestamp(first) {
                Some(ts) => (Some(ts), *second, None),
                None => (None, *first, Some(parse_flag(second)?)),
            },
            _ => return None,
        };
        if id.is_empty() || id.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            blob_id: BlobId::new(id),
            timestamp,
            date_based,
            file_date,
        })
    }

    /// Returns `true` if this entry was logged at or after `since`.
    pub fn is_since(&self, since: NaiveDateTime) -> bool {
        match self.timestamp {
            Some(ts) => ts >= since,
            None => self.file_date >= since.date(),
        }
    }
}

/// Parse a replay cut-off: `2021-04-14`, `2021-04-14 10:00:00` or
/// `2021-04-14T10:00:00`. A bare date means its midnight.
pub fn parse_since(s: &str) -> ReconcileResult<NaiveDateTime> {
    let s = s.trim();
    parse_timestamp(s)
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, LOG_FILE_DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ReconcileError::InvalidTimestamp(s.to_string()))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, LOG_TIMESTAMP_FORMAT).ok()
}

fn parse_flag(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    NaiveDate::parse_from_str(name, LOG_FILE_DATE_FORMAT).ok()
}

/// Day files in `dir`, oldest first. A missing or unreadable directory
/// has none.
fn day_files(dir: &Path) -> Vec<(NaiveDate, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no reconciliation log directory");
            return Vec::new();
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list reconciliation log directory");
            return Vec::new();
        }
    };
    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter_map(|path| parse_file_date(&path).map(|date| (date, path)))
        .collect();
    files.sort();
    files
}

/// Records blob creations and replays them.
pub struct BlobStoreReconciliationLogger {
    directories: Arc<dyn ApplicationDirectories>,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    config: ReconciliationConfig,
}

impl BlobStoreReconciliationLogger {
    /// A logger writing through a [`FileLogSink`] on the system clock.
    pub fn new(directories: Arc<dyn ApplicationDirectories>, config: ReconciliationConfig) -> Self {
        Self {
            directories,
            sink: Arc::new(FileLogSink::new(config.sync_on_append)),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Physical directory behind the logical `log_dir`.
    pub fn log_directory(&self, log_dir: &Path) -> PathBuf {
        self.directories.work_directory(log_dir)
    }

    /// Append a creation record for `blob_id` to today's file.
    ///
    /// Temporary blobs are never logged.
    pub fn log_blob_created(&self, log_dir: &Path, blob_id: &BlobId) -> ReconcileResult<()> {
        if blob_id.is_temporary() {
            return Ok(());
        }
        let now = self.clock.now();
        let path = self
            .log_directory(log_dir)
            .join(now.format(LOG_FILE_DATE_FORMAT).to_string());
        let line = format!(
            "{},{},{}",
            now.format(LOG_TIMESTAMP_FORMAT),
            blob_id.as_unique_string(),
            blob_id.is_date_based()
        );
        self.sink.append(&path, &line)?;
        debug!(blob_id = %blob_id, file = %path.display(), "blob creation logged");
        Ok(())
    }

    /// Entries logged at or after `since`, file by file then line by line.
    ///
    /// Files are listed up front; their lines are read lazily. Malformed
    /// lines and unreadable files are skipped.
    pub fn entries_since(&self, log_dir: &Path, since: NaiveDateTime) -> ReplayEntries {
        let dir = self.log_directory(log_dir);
        let files: Vec<_> = day_files(&dir)
            .into_iter()
            .filter(|(date, _)| *date >= since.date())
            .collect();
        debug!(dir = %dir.display(), files = files.len(), since = %since, "replaying reconciliation log");
        ReplayEntries {
            files: files.into_iter(),
            current: None,
            since,
        }
    }

    /// Ids of blobs logged at or after `since`.
    pub fn blobs_created_since(
        &self,
        log_dir: &Path,
        since: NaiveDateTime,
    ) -> impl Iterator<Item = BlobId> {
        self.entries_since(log_dir, since).map(|entry| entry.blob_id)
    }

    /// Delete day files older than the retention period. Returns how many
    /// were removed.
    pub fn prune_expired(&self, log_dir: &Path) -> ReconcileResult<usize> {
        let Some(days) = self.config.retention_days else {
            return Ok(0);
        };
        let cutoff = self.clock.now().date() - Duration::days(i64::from(days));
        let dir = self.log_directory(log_dir);
        let mut removed = 0;
        for (date, path) in day_files(&dir) {
            if date >= cutoff {
                break;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %path.display(), error = %e, "cannot remove expired reconciliation log"),
            }
        }
        if removed > 0 {
            info!(dir = %dir.display(), removed, cutoff = %cutoff, "expired reconciliation logs removed");
        }
        Ok(removed)
    }
}

struct DayFile {
    date: NaiveDate,
    path: PathBuf,
    reader: BufReader<File>,
    line_no: usize,
}

/// Lazy, one-pass iterator over replayed [`ReconciliationEntry`] values.
pub struct ReplayEntries {
    files: std::vec::IntoIter<(NaiveDate, PathBuf)>,
    current: Option<DayFile>,
    since: NaiveDateTime,
}

impl Iterator for ReplayEntries {
    type Item = ReconciliationEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(day) = self.current.as_mut() {
                let mut bytes = Vec::new();
                match day.reader.read_until(b'\n', &mut bytes) {
                    Ok(0) => self.current = None,
                    Ok(_) => {
                        day.line_no += 1;
                        // Records always end in a newline; a tail without one
                        // was cut off mid-write.
                        if bytes.pop() != Some(b'\n') {
                            warn!(
                                file = %day.path.display(),
                                line = day.line_no,
                                "skipping unterminated reconciliation log line"
                            );
                            self.current = None;
                            continue;
                        }
                        if bytes.iter().all(u8::is_ascii_whitespace) {
                            continue;
                        }
                        let parsed = std::str::from_utf8(&bytes)
                            .ok()
                            .and_then(|line| ReconciliationEntry::parse(line, day.date));
                        match parsed {
                            Some(entry) if entry.is_since(self.since) => return Some(entry),
                            Some(_) => {}
                            None => warn!(
                                file = %day.path.display(),
                                line = day.line_no,
                                "skipping malformed reconciliation log line"
                            ),
                        }
                    }
                    Err(e) => {
                        warn!(file = %day.path.display(), error = %e, "reconciliation log unreadable, skipping rest of file");
                        self.current = None;
                    }
                }
                continue;
            }

            let (date, path) = self.files.next()?;
            match File::open(&path) {
                Ok(file) => {
                    self.current = Some(DayFile {
                        date,
                        path,
                        reader: BufReader::new(file),
                        line_no: 0,
                    });
                }
                Err(e) => warn!(file = %path.display(), error = %e, "cannot open reconciliation log, skipping"),
            }
        }
    }
}

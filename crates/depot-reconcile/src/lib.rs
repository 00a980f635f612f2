//! Reconciliation log for depot.
//!
//! Records which blobs each store created, one file per calendar day, so a
//! maintenance pass can later replay "everything created since T" to
//! recover or verify storage state.
//!
//! # Components
//!
//! - [`BlobStoreReconciliationLogger`] -- append and replay ([`ReplayEntries`])
//! - [`ReconciliationListener`] -- hooks the logger into a store's create path
//! - [`LogSink`] / [`FileLogSink`] -- serialised line appends
//! - [`ApplicationDirectories`] -- logical-to-physical work directory mapping
//! - [`DateBasedHelper`] -- time-bucket prefixes for date-sharded scans
//!
//! Replay never fails: missing directories, unreadable files and malformed
//! lines contribute nothing and are logged.

pub mod clock;
pub mod config;
pub mod date_helper;
pub mod directories;
pub mod error;
pub mod listener;
pub mod logger;
pub mod sink;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ReconciliationConfig, DEFAULT_DIRECTORY_NAME};
pub use date_helper::{DateBasedHelper, Granularity};
pub use directories::{ApplicationDirectories, FixedApplicationDirectories};
pub use error::{ReconcileError, ReconcileResult};
pub use listener::ReconciliationListener;
pub use logger::{
    parse_since, BlobStoreReconciliationLogger, ReconciliationEntry, ReplayEntries,
    LOG_FILE_DATE_FORMAT, LOG_TIMESTAMP_FORMAT,
};
pub use sink::{FileLogSink, LogSink};

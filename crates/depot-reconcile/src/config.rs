use serde::{Deserialize, Serialize};

/// Logical name of the directory holding per-store reconciliation logs.
pub const DEFAULT_DIRECTORY_NAME: &str = "reconciliationLogDirectory";

/// Configuration for the reconciliation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Logical work directory, resolved through
    /// [`ApplicationDirectories`](crate::directories::ApplicationDirectories).
    pub directory_name: String,
    /// Day files older than this many days are removed by
    /// [`prune_expired`](crate::logger::BlobStoreReconciliationLogger::prune_expired).
    /// `None` keeps everything.
    pub retention_days: Option<u32>,
    /// `fsync` after every appended line.
    pub sync_on_append: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            directory_name: DEFAULT_DIRECTORY_NAME.to_string(),
            retention_days: None,
            sync_on_append: false,
        }
    }
}

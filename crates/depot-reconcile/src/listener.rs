use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use depot_store::BlobCreatedListener;
use depot_types::BlobId;

use crate::logger::BlobStoreReconciliationLogger;

/// Logs every blob a store creates into that store's reconciliation log.
///
/// Each store gets its own directory under the configured
/// `directory_name`. Logging failures are reported and never fail the
/// write that triggered them.
pub struct ReconciliationListener {
    logger: Arc<BlobStoreReconciliationLogger>,
}

impl ReconciliationListener {
    pub fn new(logger: Arc<BlobStoreReconciliationLogger>) -> Self {
        Self { logger }
    }

    /// Logical log directory of `store_name`.
    pub fn log_dir_for(&self, store_name: &str) -> PathBuf {
        Path::new(&self.logger.config().directory_name).join(store_name)
    }
}

impl BlobCreatedListener for ReconciliationListener {
    fn blob_created(&self, store_name: &str, blob_id: &BlobId) {
        let log_dir = self.log_dir_for(store_name);
        if let Err(e) = self.logger.log_blob_created(&log_dir, blob_id) {
            warn!(store = store_name, blob_id = %blob_id, error = %e, "failed to log blob creation");
        }
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::traits::BlobStoreMetrics;

/// Plain-data [`BlobStoreMetrics`] captured at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub blob_count: u64,
    pub total_size: u64,
    pub available_space: u64,
    pub unlimited: bool,
    pub unavailable: bool,
    pub available_space_by_file_store: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Copy any metrics implementation into a snapshot.
    pub fn capture(metrics: &dyn BlobStoreMetrics) -> Self {
        Self {
            blob_count: metrics.blob_count(),
            total_size: metrics.total_size(),
            available_space: metrics.available_space(),
            unlimited: metrics.is_unlimited(),
            unavailable: metrics.is_unavailable(),
            available_space_by_file_store: metrics.available_space_by_file_store(),
        }
    }
}

impl BlobStoreMetrics for MetricsSnapshot {
    fn blob_count(&self) -> u64 {
        self.blob_count
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn available_space(&self) -> u64 {
        self.available_space
    }

    fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    fn available_space_by_file_store(&self) -> BTreeMap<String, u64> {
        self.available_space_by_file_store.clone()
    }
}

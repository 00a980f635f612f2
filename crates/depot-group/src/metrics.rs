use std::collections::BTreeMap;

use depot_store::BlobStoreMetrics;

/// Metrics of a group, aggregated from its members.
///
/// Counts and sizes are summed (saturating). The group is unlimited if any
/// member is, and unavailable only if it has members and all of them are
/// unavailable.
#[derive(Debug, Default)]
pub struct BlobStoreGroupMetrics {
    members: Vec<Box<dyn BlobStoreMetrics>>,
}

impl BlobStoreGroupMetrics {
    pub fn new(members: Vec<Box<dyn BlobStoreMetrics>>) -> Self {
        Self { members }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn sum(&self, f: impl Fn(&dyn BlobStoreMetrics) -> u64) -> u64 {
        self.members
            .iter()
            .fold(0u64, |acc, m| acc.saturating_add(f(m.as_ref())))
    }
}

impl BlobStoreMetrics for BlobStoreGroupMetrics {
    fn blob_count(&self) -> u64 {
        self.sum(|m| m.blob_count())
    }

    fn total_size(&self) -> u64 {
        self.sum(|m| m.total_size())
    }

    fn available_space(&self) -> u64 {
        self.sum(|m| m.available_space())
    }

    fn is_unlimited(&self) -> bool {
        self.members.iter().any(|m| m.is_unlimited())
    }

    fn is_unavailable(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.is_unavailable())
    }

    /// Every member is queried, even ones sharing a file store; later
    /// members overwrite earlier entries for the same file store.
    fn available_space_by_file_store(&self) -> BTreeMap<String, u64> {
        let mut merged = BTreeMap::new();
        for member in &self.members {
            merged.extend(member.available_space_by_file_store());
        }
        merged
    }
}

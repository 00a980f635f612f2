use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use depot_store::{BlobStore, BlobStoreQuotaService, StoreResult};
use depot_types::Headers;

use crate::config::RoundRobinConfig;

/// Largest sequence value before the counter wraps to zero.
pub const MAX_SEQUENCE: u32 = i32::MAX as u32;

/// Rotates writes across eligible members.
///
/// The sequence counter is shared by every caller. Each selection consumes
/// exactly one value, and the scan starts at `sequence % members` and wraps
/// around the member list once.
pub struct RoundRobinFillPolicy {
    sequence: AtomicU32,
    config: RoundRobinConfig,
    quota: Option<Arc<dyn BlobStoreQuotaService>>,
}

impl RoundRobinFillPolicy {
    pub fn new(config: RoundRobinConfig) -> Self {
        Self {
            sequence: AtomicU32::new(0),
            config,
            quota: None,
        }
    }

    pub fn with_quota_service(mut self, quota: Arc<dyn BlobStoreQuotaService>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Preset the counter.
    pub fn with_sequence(self, sequence: u32) -> Self {
        self.sequence.store(sequence.min(MAX_SEQUENCE), Ordering::SeqCst);
        self
    }

    /// Current counter value (the next value [`next_index`](Self::next_index) returns).
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Return the current counter value and advance it, wrapping to zero
    /// after [`MAX_SEQUENCE`].
    pub fn next_index(&self) -> u32 {
        let advanced = self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(if current >= MAX_SEQUENCE { 0 } else { current + 1 })
            });
        match advanced {
            Ok(previous) | Err(previous) => previous,
        }
    }

    pub fn choose_from(
        &self,
        members: &[Arc<dyn BlobStore>],
        _headers: &Headers,
    ) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        if members.is_empty() {
            return Ok(None);
        }
        let start = self.next_index() as usize % members.len();
        for offset in 0..members.len() {
            let candidate = &members[(start + offset) % members.len()];
            if self.is_eligible(candidate.as_ref())? {
                debug!(member = candidate.name(), start, "round robin selected member");
                return Ok(Some(candidate.clone()));
            }
        }
        debug!(members = members.len(), start, "round robin found no eligible member");
        Ok(None)
    }

    fn is_eligible(&self, member: &dyn BlobStore) -> StoreResult<bool> {
        if !member.is_storage_available() || !member.is_writable() {
            return Ok(false);
        }
        if self.config.skip_on_soft_quota_violation {
            if let Some(quota) = &self.quota {
                if let Some(result) = quota.check_quota(member)? {
                    if result.is_violation() {
                        debug!(member = member.name(), message = %result.message, "skipping member over soft quota");
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

impl Default for RoundRobinFillPolicy {
    fn default() -> Self {
        Self::new(RoundRobinConfig::default())
    }
}

impl fmt::Debug for RoundRobinFillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundRobinFillPolicy")
            .field("sequence", &self.sequence())
            .field("config", &self.config)
            .field("quota", &self.quota.is_some())
            .finish()
    }
}

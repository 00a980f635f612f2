//! Strategies that pick the group member receiving a new write.
//!
//! Policies form a closed set selected by name through a
//! [`FillPolicyRegistry`]; an unknown name falls back to
//! [`FALLBACK_FILL_POLICY`].

pub mod round_robin;
pub mod write_to_first;

use std::sync::Arc;

use tracing::warn;

use depot_store::{BlobStore, BlobStoreQuotaService, StoreResult};
use depot_types::Headers;

use crate::config::RoundRobinConfig;
use crate::group::BlobStoreGroup;

pub use round_robin::RoundRobinFillPolicy;
pub use write_to_first::WriteToFirstMemberFillPolicy;

pub const ROUND_ROBIN: &str = "roundRobin";
pub const WRITE_TO_FIRST: &str = "writeToFirst";

/// Policy used when a group names a policy that does not exist.
pub const FALLBACK_FILL_POLICY: &str = WRITE_TO_FIRST;

/// A member-selection strategy.
#[derive(Debug)]
pub enum FillPolicy {
    RoundRobin(RoundRobinFillPolicy),
    WriteToFirstMember(WriteToFirstMemberFillPolicy),
}

impl FillPolicy {
    /// Registered name of this policy.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundRobin(_) => ROUND_ROBIN,
            Self::WriteToFirstMember(_) => WRITE_TO_FIRST,
        }
    }

    /// Choose the member of `group` that should receive a write.
    ///
    /// `Ok(None)` means no member is eligible. Quota-service errors propagate.
    pub fn choose_blob_store(
        &self,
        group: &BlobStoreGroup,
        headers: &Headers,
    ) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        self.choose_from(group.members(), headers)
    }

    /// Choose among an explicit member list, in declared order.
    pub fn choose_from(
        &self,
        members: &[Arc<dyn BlobStore>],
        headers: &Headers,
    ) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        match self {
            Self::RoundRobin(policy) => policy.choose_from(members, headers),
            Self::WriteToFirstMember(policy) => Ok(policy.choose_from(members, headers)),
        }
    }
}

/// Builds fill policies by name.
///
/// Every call to [`create`](Self::create) returns a fresh policy, so each
/// group owns its own round-robin counter.
#[derive(Clone, Default)]
pub struct FillPolicyRegistry {
    round_robin: RoundRobinConfig,
    quota: Option<Arc<dyn BlobStoreQuotaService>>,
}

impl FillPolicyRegistry {
    pub fn new(round_robin: RoundRobinConfig) -> Self {
        Self {
            round_robin,
            quota: None,
        }
    }

    /// Quota service consulted by round-robin selection.
    pub fn with_quota_service(mut self, quota: Arc<dyn BlobStoreQuotaService>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Names of every known policy.
    pub fn names(&self) -> &'static [&'static str] {
        &[ROUND_ROBIN, WRITE_TO_FIRST]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(&name)
    }

    /// Build the policy registered under `name`.
    pub fn create(&self, name: &str) -> Option<FillPolicy> {
        match name {
            ROUND_ROBIN => {
                let mut policy = RoundRobinFillPolicy::new(self.round_robin);
                if let Some(quota) = &self.quota {
                    policy = policy.with_quota_service(quota.clone());
                }
                Some(FillPolicy::RoundRobin(policy))
            }
            WRITE_TO_FIRST => Some(FillPolicy::WriteToFirstMember(
                WriteToFirstMemberFillPolicy,
            )),
            _ => None,
        }
    }

    /// Build the policy named `name`, or the fallback policy when unknown.
    pub fn create_or_fallback(&self, name: &str, group: &str) -> FillPolicy {
        match self.create(name) {
            Some(policy) => policy,
            None => {
                warn!(
                    fill_policy = name,
                    group,
                    fallback = FALLBACK_FILL_POLICY,
                    "unable to find fill policy, using fallback"
                );
                FillPolicy::WriteToFirstMember(WriteToFirstMemberFillPolicy)
            }
        }
    }
}

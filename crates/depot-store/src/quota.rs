//! Soft-quota evaluation backed by store metrics.
//!
//! A store opts into a soft quota through its `blobStoreQuotaConfig`
//! attribute section:
//!
//! ```text
//! quotaType       = "spaceUsedQuota" | "spaceRemainingQuota"
//! quotaLimitBytes = <non-negative integer>
//! ```
//!
//! Quotas are advisory: they are reported, never enforced, here.

use serde_json::Value;
use tracing::debug;

use depot_types::config::QUOTA_SECTION;
use depot_types::{BlobStoreConfiguration, QuotaResult};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, BlobStoreQuotaService};

pub const QUOTA_TYPE_KEY: &str = "quotaType";
pub const QUOTA_LIMIT_KEY: &str = "quotaLimitBytes";

/// Kind of soft quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaKind {
    /// Violated when the store holds more than the limit.
    SpaceUsed,
    /// Violated when less than the limit remains available.
    SpaceRemaining,
}

impl QuotaKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "spaceUsedQuota" => Some(Self::SpaceUsed),
            "spaceRemainingQuota" => Some(Self::SpaceRemaining),
            _ => None,
        }
    }
}

/// Parsed soft-quota settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftQuota {
    pub kind: QuotaKind,
    pub limit_bytes: u64,
}

impl SoftQuota {
    /// Read the quota section of `config`. `Ok(None)` when no quota is set.
    pub fn from_configuration(config: &BlobStoreConfiguration) -> StoreResult<Option<Self>> {
        let Some(section) = config.section(QUOTA_SECTION) else {
            return Ok(None);
        };
        let kind = match section.get(QUOTA_TYPE_KEY) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(name)) => QuotaKind::from_name(name).ok_or_else(|| {
                StoreError::Quota(format!("unknown quota type '{name}' on '{}'", config.name))
            })?,
            Some(other) => {
                return Err(StoreError::Quota(format!(
                    "quota type on '{}' must be a string, got {other}",
                    config.name
                )))
            }
        };
        let limit_bytes = section
            .get(QUOTA_LIMIT_KEY)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                StoreError::Quota(format!(
                    "quota limit on '{}' must be a non-negative integer",
                    config.name
                ))
            })?;
        Ok(Some(Self { kind, limit_bytes }))
    }
}

/// [`BlobStoreQuotaService`] evaluating [`SoftQuota`] against store metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftQuotaService;

impl BlobStoreQuotaService for SoftQuotaService {
    fn check_quota(&self, store: &dyn BlobStore) -> StoreResult<Option<QuotaResult>> {
        let Some(quota) = SoftQuota::from_configuration(store.configuration())? else {
            return Ok(None);
        };
        let metrics = store.metrics()?;
        let name = store.name();
        let result = match quota.kind {
            QuotaKind::SpaceUsed => {
                let used = metrics.total_size();
                if used > quota.limit_bytes {
                    QuotaResult::violation(
                        name,
                        format!("Blob store {name} is using {used} bytes and has a limit of {} bytes", quota.limit_bytes),
                    )
                } else {
                    QuotaResult::ok(name, format!("Blob store {name} is using {used} bytes"))
                }
            }
            QuotaKind::SpaceRemaining => {
                let remaining = metrics.available_space();
                if !metrics.is_unlimited() && remaining < quota.limit_bytes {
                    QuotaResult::violation(
                        name,
                        format!("Blob store {name} has {remaining} bytes remaining and a limit of {} bytes", quota.limit_bytes),
                    )
                } else {
                    QuotaResult::ok(name, format!("Blob store {name} has {remaining} bytes remaining"))
                }
            }
        };
        debug!(store = name, violation = result.is_violation(), "quota checked");
        Ok(Some(result))
    }

    fn validate_soft_quota_config(&self, config: &BlobStoreConfiguration) -> StoreResult<()> {
        SoftQuota::from_configuration(config).map(|_| ())
    }
}

use serde::{Deserialize, Serialize};

/// Tunables for [`RoundRobinFillPolicy`](crate::fill_policy::RoundRobinFillPolicy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRobinConfig {
    /// Skip members whose soft quota is currently violated.
    #[serde(default)]
    pub skip_on_soft_quota_violation: bool,
}

/// How [`BlobStoreGroupDescriptor`](crate::descriptor::BlobStoreGroupDescriptor)
/// reports violations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Run every rule and report all violations together.
    #[default]
    CollectAll,
    /// Stop at the first violated rule.
    FailFast,
}

/// Configuration for group construction and validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(default)]
    pub round_robin: RoundRobinConfig,
    #[serde(default)]
    pub validation: ValidationMode,
}

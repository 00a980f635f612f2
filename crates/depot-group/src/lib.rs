//! Blob store groups for depot.
//!
//! A group is a [`BlobStore`](depot_store::BlobStore) made of member
//! stores. Writes are placed by a [`FillPolicy`]; reads, copies and deletes
//! follow the member that holds the blob.
//!
//! # Components
//!
//! - [`FillPolicy`] -- closed set of placement strategies ([`RoundRobinFillPolicy`],
//!   [`WriteToFirstMemberFillPolicy`]) built by name through [`FillPolicyRegistry`]
//! - [`BlobStoreGroup`] -- the composite store with its ownership cache
//! - [`BlobStoreGroupDescriptor`] -- structural validation of group configurations
//! - [`BlobStoreGroupMetrics`] -- member metrics aggregated for monitoring
//! - [`BlobStoreRegistry`] -- the store registry wiring all of the above together
//!
//! # Group Rules
//!
//! 1. A group never lists itself and never lists another group.
//! 2. A store belongs to at most one group at a time.
//! 3. A store used directly by a repository cannot join a group.
//! 4. A non-empty, writable member cannot simply be dropped from a group.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fill_policy;
pub mod group;
pub mod metrics;
pub mod registry;

#[cfg(test)]
mod testing;

pub use config::{GroupSettings, RoundRobinConfig, ValidationMode};
pub use descriptor::BlobStoreGroupDescriptor;
pub use error::{GroupError, GroupResult, ValidationErrors, Violation, ViolationKind};
pub use fill_policy::{
    FillPolicy, FillPolicyRegistry, RoundRobinFillPolicy, WriteToFirstMemberFillPolicy,
    FALLBACK_FILL_POLICY, ROUND_ROBIN, WRITE_TO_FIRST,
};
pub use group::BlobStoreGroup;
pub use metrics::BlobStoreGroupMetrics;
pub use registry::BlobStoreRegistry;

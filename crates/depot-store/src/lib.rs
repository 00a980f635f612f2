//! Blob store contract and transactional sessions for depot.
//!
//! This crate defines what the coordination layer expects from a physical
//! blob store and from the services around it, and provides the
//! [`BlobSession`] unit of work on top of any store.
//!
//! # Contracts
//!
//! - [`BlobStore`] -- create/get/exists/delete/copy by [`BlobId`](depot_types::BlobId)
//! - [`BlobStoreMetrics`] -- usage and capacity of a store
//! - [`BlobStoreManager`] -- registry of live stores, parent and task lookups
//! - [`BlobStoreUtil`] -- repository usage counts
//! - [`BlobStoreQuotaService`] -- advisory soft-quota evaluation
//! - [`BlobCreatedListener`] -- creation hook (used by reconciliation logging)
//!
//! # Implementations
//!
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests, simulation and embedding
//! - [`SoftQuotaService`] -- quota evaluation from store metrics
//!
//! # Design Rules
//!
//! 1. Sessions never buffer writes, only deletes.
//! 2. Commit and rollback never fail; store errors and panics are logged.
//! 3. A session is owned by a single caller; stores are shared across threads.

pub mod error;
pub mod memory;
pub mod metrics;
pub mod quota;
pub mod session;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryBlobStore, MEMORY_TYPE};
pub use metrics::MetricsSnapshot;
pub use quota::{QuotaKind, SoftQuota, SoftQuotaService};
pub use session::BlobSession;
pub use traits::{
    BlobCreatedListener, BlobStore, BlobStoreManager, BlobStoreMetrics, BlobStoreQuotaService,
    BlobStoreUtil,
};

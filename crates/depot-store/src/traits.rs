use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use depot_types::{Blob, BlobId, BlobStoreConfiguration, ContentHash, Headers, QuotaResult};

use crate::error::StoreResult;

/// A physical (or composite) blob store.
///
/// All implementations must satisfy these invariants:
/// - A blob is owned by exactly one store at a time.
/// - `delete` is a soft delete: the blob stops being visible to `get` and
///   `exists` but stays retrievable through `get_with_deleted(.., true)`
///   until it is hard-deleted.
/// - Writes on a store that is not writable or not storage-available fail
///   instead of silently dropping data.
pub trait BlobStore: Send + Sync {
    /// Store `data` under a freshly generated identifier.
    fn create(&self, data: &[u8], headers: &Headers) -> StoreResult<Blob> {
        self.create_with_id(data, headers, None)
    }

    /// Store `data`, under `id` when given.
    fn create_with_id(
        &self,
        data: &[u8],
        headers: &Headers,
        id: Option<BlobId>,
    ) -> StoreResult<Blob>;

    /// Ingest an existing file whose size and digest the caller already knows.
    fn create_from_file(
        &self,
        source: &Path,
        headers: &Headers,
        size: u64,
        hash: &ContentHash,
    ) -> StoreResult<Blob>;

    /// Duplicate an existing blob under a new identifier.
    fn copy(&self, id: &BlobId, headers: &Headers) -> StoreResult<Blob>;

    /// Turn a temporary blob into a permanent one.
    ///
    /// The default copies the blob to a fresh identifier and hard-deletes the
    /// temporary original.
    fn make_blob_permanent(&self, id: &BlobId, headers: &Headers) -> StoreResult<Blob> {
        let blob = self.copy(id, headers)?;
        self.delete_hard(id)?;
        Ok(blob)
    }

    /// Read a live blob. Returns `Ok(None)` if it does not exist.
    fn get(&self, id: &BlobId) -> StoreResult<Option<Blob>> {
        self.get_with_deleted(id, false)
    }

    /// Read a blob, optionally including soft-deleted ones.
    fn get_with_deleted(&self, id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>>;

    /// Check whether a live blob exists.
    fn exists(&self, id: &BlobId) -> StoreResult<bool>;

    /// Soft-delete a blob. Returns `true` if a live blob was deleted.
    fn delete(&self, id: &BlobId, reason: &str) -> StoreResult<bool>;

    /// Remove a blob permanently. Returns `true` if it existed.
    fn delete_hard(&self, id: &BlobId) -> StoreResult<bool>;

    /// The persisted configuration of this store.
    fn configuration(&self) -> &BlobStoreConfiguration;

    /// Unique name of this store.
    fn name(&self) -> &str {
        &self.configuration().name
    }

    /// Returns `false` for read-only stores.
    fn is_writable(&self) -> bool {
        true
    }

    /// Returns `false` when backing storage is unreachable.
    fn is_storage_available(&self) -> bool;

    /// Returns `true` if this store may become a group member.
    fn is_groupable(&self) -> bool {
        true
    }

    /// Returns `true` if the store holds no live blobs.
    fn is_empty(&self) -> StoreResult<bool>;

    /// Identifiers of all live blobs.
    fn blob_ids(&self) -> StoreResult<Vec<BlobId>>;

    /// Point-in-time usage and capacity metrics.
    fn metrics(&self) -> StoreResult<Box<dyn BlobStoreMetrics>>;
}

/// Usage and capacity metrics of a store.
pub trait BlobStoreMetrics: Send + Sync + fmt::Debug {
    fn blob_count(&self) -> u64;

    fn total_size(&self) -> u64;

    fn available_space(&self) -> u64;

    fn is_unlimited(&self) -> bool;

    fn is_unavailable(&self) -> bool;

    /// Available bytes keyed by physical file store.
    fn available_space_by_file_store(&self) -> BTreeMap<String, u64>;
}

/// Registry of live blob stores.
pub trait BlobStoreManager: Send + Sync {
    /// Look up a store by name.
    fn get(&self, name: &str) -> Option<Arc<dyn BlobStore>>;

    /// All known stores.
    fn browse(&self) -> Vec<Arc<dyn BlobStore>>;

    /// Name of the group that currently lists `name` as a member.
    fn parent(&self, name: &str) -> Option<String>;

    /// Returns `true` while a maintenance task that conflicts with
    /// reconfiguration is running against `name`.
    fn has_conflicting_tasks(&self, name: &str) -> bool;
}

/// Usage lookups across repositories.
pub trait BlobStoreUtil: Send + Sync {
    /// Number of repositories using `name` directly as their storage.
    fn usage_count(&self, name: &str) -> u64;
}

/// Soft-quota evaluation.
pub trait BlobStoreQuotaService: Send + Sync {
    /// Evaluate the quota of `store`. `Ok(None)` means no quota is configured.
    fn check_quota(&self, store: &dyn BlobStore) -> StoreResult<Option<QuotaResult>>;

    /// Validate the soft-quota attributes embedded in `config`.
    fn validate_soft_quota_config(&self, config: &BlobStoreConfiguration) -> StoreResult<()>;
}

/// Notified after a store has durably created a blob.
pub trait BlobCreatedListener: Send + Sync {
    fn blob_created(&self, store_name: &str, blob_id: &BlobId);
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use tracing::debug;

use depot_types::headers::is_temporary;
use depot_types::{Blob, BlobId, BlobMetrics, BlobStoreConfiguration, ContentHash, Headers};

use crate::error::{StoreError, StoreResult};
use crate::metrics::MetricsSnapshot;
use crate::traits::{BlobCreatedListener, BlobStore, BlobStoreMetrics};

/// Store type name of [`InMemoryBlobStore`].
pub const MEMORY_TYPE: &str = "Memory";

struct Entry {
    blob: Blob,
    deleted: bool,
}

/// In-memory, HashMap-based blob store.
///
/// Intended for tests, simulations and embedding. Blobs are held behind a
/// `RwLock`; availability and writability can be toggled at runtime to
/// exercise fill policies and validation.
pub struct InMemoryBlobStore {
    config: BlobStoreConfiguration,
    blobs: RwLock<HashMap<BlobId, Entry>>,
    writable: AtomicBool,
    available: AtomicBool,
    groupable: bool,
    date_based: bool,
    capacity: Option<u64>,
    file_store: String,
    listener: Option<Arc<dyn BlobCreatedListener>>,
}

impl InMemoryBlobStore {
    /// Create a new empty, writable, available store.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_configuration(BlobStoreConfiguration::new(name, MEMORY_TYPE))
    }

    /// Create a new empty store from an existing configuration.
    pub fn with_configuration(config: BlobStoreConfiguration) -> Self {
        let file_store = format!("mem:{}", config.name);
        Self {
            config,
            blobs: RwLock::new(HashMap::new()),
            writable: AtomicBool::new(true),
            available: AtomicBool::new(true),
            groupable: true,
            date_based: false,
            capacity: None,
            file_store,
            listener: None,
        }
    }

    /// Generate date-based identifiers for new blobs.
    pub fn with_date_based_layout(mut self, date_based: bool) -> Self {
        self.date_based = date_based;
        self
    }

    /// Limit the store to `bytes` of live content. Writes that would exceed
    /// it fail with [`StoreError::Full`].
    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Report available space under the given file-store name.
    pub fn with_file_store(mut self, file_store: impl Into<String>) -> Self {
        self.file_store = file_store.into();
        self
    }

    /// Mark the store as eligible (or not) for group membership.
    pub fn with_groupable(mut self, groupable: bool) -> Self {
        self.groupable = groupable;
        self
    }

    /// Notify `listener` after every successful create or copy.
    pub fn with_listener(mut self, listener: Arc<dyn BlobCreatedListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live blobs.
    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|e| !e.deleted)
            .count()
    }

    /// Bytes held by live blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|e| !e.deleted)
            .map(|e| e.blob.metrics().content_size)
            .sum()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if !self.is_storage_available() {
            return Err(StoreError::Unavailable(self.config.name.clone()));
        }
        if !self.is_writable() {
            return Err(StoreError::ReadOnly(self.config.name.clone()));
        }
        Ok(())
    }

    fn next_id(&self, headers: &Headers, now: NaiveDateTime) -> BlobId {
        if is_temporary(headers) {
            BlobId::generate_temporary()
        } else if self.date_based {
            BlobId::generate_date_based(now)
        } else {
            BlobId::generate()
        }
    }

    fn store(&self, blob: Blob) -> StoreResult<Blob> {
        let id = blob.id().clone();
        let mut map = self.blobs.write().expect("lock poisoned");
        if let Some(capacity) = self.capacity {
            let used: u64 = map
                .values()
                .filter(|e| !e.deleted)
                .map(|e| e.blob.metrics().content_size)
                .sum();
            let requested = blob.metrics().content_size;
            let available = capacity.saturating_sub(used);
            if requested > available {
                return Err(StoreError::Full {
                    store: self.config.name.clone(),
                    requested,
                    available,
                });
            }
        }
        map.insert(
            id.clone(),
            Entry {
                blob: blob.clone(),
                deleted: false,
            },
        );
        drop(map);
        debug!(store = %self.config.name, blob_id = %id, size = blob.metrics().content_size, "blob created");
        if let Some(listener) = &self.listener {
            listener.blob_created(&self.config.name, &id);
        }
        Ok(blob)
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create_with_id(
        &self,
        data: &[u8],
        headers: &Headers,
        id: Option<BlobId>,
    ) -> StoreResult<Blob> {
        self.check_writable()?;
        let now = Local::now().naive_local();
        let id = id.unwrap_or_else(|| self.next_id(headers, now));
        let metrics = BlobMetrics {
            creation_time: now,
            content_hash: ContentHash::of(data),
            content_size: data.len() as u64,
        };
        let blob = Blob::new(id, headers.clone(), Bytes::copy_from_slice(data), metrics);
        self.store(blob)
    }

    fn create_from_file(
        &self,
        source: &Path,
        headers: &Headers,
        size: u64,
        hash: &ContentHash,
    ) -> StoreResult<Blob> {
        self.check_writable()?;
        let data = std::fs::read(source)?;
        if data.len() as u64 != size {
            return Err(StoreError::SizeMismatch {
                path: source.display().to_string(),
                declared: size,
                actual: data.len() as u64,
            });
        }
        let now = Local::now().naive_local();
        let metrics = BlobMetrics {
            creation_time: now,
            content_hash: hash.clone(),
            content_size: size,
        };
        let blob = Blob::new(self.next_id(headers, now), headers.clone(), Bytes::from(data), metrics);
        self.store(blob)
    }

    fn copy(&self, id: &BlobId, headers: &Headers) -> StoreResult<Blob> {
        self.check_writable()?;
        let source = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let now = Local::now().naive_local();
        let new_id = if self.date_based {
            BlobId::generate_date_based(now)
        } else {
            BlobId::generate()
        };
        self.store(source.with_id(new_id, headers.clone()))
    }

    fn get_with_deleted(&self, id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map
            .get(id)
            .filter(|e| include_deleted || !e.deleted)
            .map(|e| e.blob.clone()))
    }

    fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(id).is_some_and(|e| !e.deleted))
    }

    fn delete(&self, id: &BlobId, reason: &str) -> StoreResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        match map.get_mut(id) {
            Some(entry) if !entry.deleted => {
                entry.deleted = true;
                debug!(store = %self.config.name, blob_id = %id, reason, "blob soft-deleted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_hard(&self, id: &BlobId) -> StoreResult<bool> {
        let mut map = self.blobs.write().expect("lock poisoned");
        Ok(map.remove(id).is_some())
    }

    fn configuration(&self) -> &BlobStoreConfiguration {
        &self.config
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn is_storage_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_groupable(&self) -> bool {
        self.groupable
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len() == 0)
    }

    fn blob_ids(&self) -> StoreResult<Vec<BlobId>> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut ids: Vec<BlobId> = map
            .iter()
            .filter(|(_, e)| !e.deleted)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn metrics(&self) -> StoreResult<Box<dyn BlobStoreMetrics>> {
        let total_size = self.total_bytes();
        let available_space = match self.capacity {
            Some(capacity) => capacity.saturating_sub(total_size),
            None => u64::MAX,
        };
        Ok(Box::new(MetricsSnapshot {
            blob_count: self.len() as u64,
            total_size,
            available_space,
            unlimited: self.capacity.is_none(),
            unavailable: !self.is_storage_available(),
            available_space_by_file_store: BTreeMap::from([(
                self.file_store.clone(),
                available_space,
            )]),
        }))
    }
}

impl fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("name", &self.config.name)
            .field("blob_count", &self.len())
            .field("writable", &self.is_writable())
            .field("available", &self.is_storage_available())
            .finish()
    }
}

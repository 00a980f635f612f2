//! Transactional unit of work over a single [`BlobStore`].
//!
//! Writes go straight to the store; only deletes are buffered. The session
//! remembers every blob it created so that a rollback can remove them, and
//! every blob the caller asked to delete so that a commit can apply them.
//!
//! Commit and rollback are cleanup steps that run alongside a broader
//! transaction the caller coordinates. They therefore never fail: every
//! error and every panic raised by the store is logged and discarded.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use depot_types::{Blob, BlobId, ContentHash, Headers};

use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStore;

/// Reason recorded against blobs removed by a rollback.
const ROLLBACK_REASON: &str = "new blob";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Open,
    Committed,
    RolledBack,
}

/// A unit of work against one blob store.
///
/// Not thread-safe: a session belongs to exactly one caller. Dropping an
/// open session rolls it back.
pub struct BlobSession {
    store: Arc<dyn BlobStore>,
    created: BTreeSet<BlobId>,
    pending_deletes: BTreeMap<BlobId, String>,
    state: SessionState,
}

impl BlobSession {
    /// Open a session on `store`.
    pub fn open(store: Arc<dyn BlobStore>) -> Self {
        debug!(store = store.name(), "blob session opened");
        Self {
            store,
            created: BTreeSet::new(),
            pending_deletes: BTreeMap::new(),
            state: SessionState::Open,
        }
    }

    /// The store this session operates on.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Returns `true` until the session is committed, rolled back or closed.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Blobs created by this session so far.
    pub fn created(&self) -> impl Iterator<Item = &BlobId> {
        self.created.iter()
    }

    /// Blobs the caller asked to delete, with their reasons.
    pub fn pending_deletes(&self) -> impl Iterator<Item = (&BlobId, &str)> {
        self.pending_deletes.iter().map(|(id, r)| (id, r.as_str()))
    }

    pub fn create(&mut self, data: &[u8], headers: &Headers) -> StoreResult<Blob> {
        self.ensure_open()?;
        let blob = self.store.create(data, headers)?;
        Ok(self.track(blob))
    }

    pub fn create_with_id(
        &mut self,
        data: &[u8],
        headers: &Headers,
        id: BlobId,
    ) -> StoreResult<Blob> {
        self.ensure_open()?;
        let blob = self.store.create_with_id(data, headers, Some(id))?;
        Ok(self.track(blob))
    }

    pub fn create_from_file(
        &mut self,
        source: &Path,
        headers: &Headers,
        size: u64,
        hash: &ContentHash,
    ) -> StoreResult<Blob> {
        self.ensure_open()?;
        let blob = self.store.create_from_file(source, headers, size, hash)?;
        Ok(self.track(blob))
    }

    pub fn copy(&mut self, id: &BlobId, headers: &Headers) -> StoreResult<Blob> {
        self.ensure_open()?;
        let blob = self.store.copy(id, headers)?;
        Ok(self.track(blob))
    }

    /// Read a blob, hiding blobs deleted in this session.
    pub fn get(&self, id: &BlobId) -> StoreResult<Option<Blob>> {
        self.get_with_deleted(id, false)
    }

    /// Read a blob. With `include_deleted`, blobs deleted in this session
    /// (and soft-deleted in the store) are returned as well.
    pub fn get_with_deleted(&self, id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        if !include_deleted && self.pending_deletes.contains_key(id) {
            return Ok(None);
        }
        self.store.get_with_deleted(id, include_deleted)
    }

    /// Physical existence in the store; pending deletes are not considered.
    pub fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        self.store.exists(id)
    }

    /// Mark `id` for deletion on commit. The store is not touched yet.
    pub fn delete(&mut self, id: &BlobId, reason: impl Into<String>) -> StoreResult<()> {
        self.ensure_open()?;
        let reason = reason.into();
        debug!(blob_id = %id, reason = %reason, "blob delete deferred to commit");
        self.pending_deletes.insert(id.clone(), reason);
        Ok(())
    }

    /// Apply pending deletes. Blobs created but not deleted are kept.
    ///
    /// Never fails; no-op unless the session is open.
    pub fn commit(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        self.state = SessionState::Committed;

        let pending = std::mem::take(&mut self.pending_deletes);
        self.created.clear();
        for (id, reason) in pending {
            let reason = format!("committing {reason}");
            self.swallow("commit delete", &id, |store| store.delete(&id, &reason));
        }
        debug!(store = self.store.name(), "blob session committed");
    }

    /// Remove every blob created in this session that still exists.
    ///
    /// Blobs only marked for deletion are left alone: a rollback undoes
    /// creation, not unrelated delete intents. Never fails; no-op unless the
    /// session is open.
    pub fn rollback(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        self.state = SessionState::RolledBack;

        let created = std::mem::take(&mut self.created);
        self.pending_deletes.clear();
        let reason = format!("rolling back {ROLLBACK_REASON}");
        for id in created {
            let present = self
                .swallow("rollback exists", &id, |store| store.exists(&id))
                .unwrap_or(true);
            if present {
                self.swallow("rollback delete", &id, |store| store.delete(&id, &reason));
            }
        }
        debug!(store = self.store.name(), "blob session rolled back");
    }

    /// End the session, rolling back if it was never committed.
    pub fn close(&mut self) {
        self.rollback();
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::SessionClosed)
        }
    }

    fn track(&mut self, blob: Blob) -> Blob {
        debug!(blob_id = %blob.id(), "blob created in session");
        self.created.insert(blob.id().clone());
        blob
    }

    /// Run a store call, logging and discarding any error or panic.
    fn swallow<T>(
        &self,
        operation: &str,
        id: &BlobId,
        f: impl FnOnce(&dyn BlobStore) -> StoreResult<T>,
    ) -> Option<T> {
        let store = self.store.as_ref();
        match panic::catch_unwind(AssertUnwindSafe(|| f(store))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(store = store.name(), blob_id = %id, operation, error = %e, "blob session cleanup failed");
                None
            }
            Err(payload) => {
                warn!(
                    store = store.name(),
                    blob_id = %id,
                    operation,
                    panic = panic_message(payload.as_ref()),
                    "blob session cleanup panicked"
                );
                None
            }
        }
    }
}

impl Drop for BlobSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BlobSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobSession")
            .field("store", &self.store.name())
            .field("state", &self.state)
            .field("created", &self.created.len())
            .field("pending_deletes", &self.pending_deletes.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

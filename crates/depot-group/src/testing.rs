//! Test doubles shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use depot_store::{
    BlobStore, BlobStoreManager, BlobStoreQuotaService, BlobStoreUtil, InMemoryBlobStore,
    StoreError, StoreResult,
};
use depot_types::{BlobStoreConfiguration, QuotaResult};

/// An in-memory member with the given availability and writability.
pub fn member(name: &str, available: bool, writable: bool) -> Arc<dyn BlobStore> {
    let store = InMemoryBlobStore::new(name);
    store.set_available(available);
    store.set_writable(writable);
    Arc::new(store)
}

/// Quota service reporting violations for a fixed set of store names.
pub struct StubQuota {
    violating: HashSet<String>,
    fail: bool,
}

impl StubQuota {
    pub fn violating(names: &[&str]) -> Self {
        Self {
            violating: names.iter().map(|n| n.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            violating: HashSet::new(),
            fail: true,
        }
    }
}

impl BlobStoreQuotaService for StubQuota {
    fn check_quota(&self, store: &dyn BlobStore) -> StoreResult<Option<QuotaResult>> {
        if self.fail {
            return Err(StoreError::Quota("quota service down".into()));
        }
        let name = store.name();
        Ok(Some(if self.violating.contains(name) {
            QuotaResult::violation(name, format!("{name} is over quota"))
        } else {
            QuotaResult::ok(name, format!("{name} is within quota"))
        }))
    }

    fn validate_soft_quota_config(&self, config: &BlobStoreConfiguration) -> StoreResult<()> {
        if self.fail {
            return Err(StoreError::Quota(format!("invalid quota on '{}'", config.name)));
        }
        Ok(())
    }
}

/// Manager over a fixed map of stores that records conflicting-task checks.
#[derive(Default)]
pub struct StubManager {
    pub stores: BTreeMap<String, Arc<dyn BlobStore>>,
    pub parents: BTreeMap<String, String>,
    pub conflicting: HashSet<String>,
    pub conflict_checks: Mutex<Vec<String>>,
}

impl StubManager {
    pub fn with_stores(stores: impl IntoIterator<Item = Arc<dyn BlobStore>>) -> Self {
        Self {
            stores: stores
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect(),
            ..Self::default()
        }
    }

    pub fn conflict_checks(&self) -> Vec<String> {
        self.conflict_checks.lock().expect("lock poisoned").clone()
    }
}

impl BlobStoreManager for StubManager {
    fn get(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        self.stores.get(name).cloned()
    }

    fn browse(&self) -> Vec<Arc<dyn BlobStore>> {
        self.stores.values().cloned().collect()
    }

    fn parent(&self, name: &str) -> Option<String> {
        self.parents.get(name).cloned()
    }

    fn has_conflicting_tasks(&self, name: &str) -> bool {
        self.conflict_checks
            .lock()
            .expect("lock poisoned")
            .push(name.to_string());
        self.conflicting.contains(name)
    }
}

/// Fixed repository usage counts.
#[derive(Default)]
pub struct StubUtil {
    pub usage: BTreeMap<String, u64>,
}

impl BlobStoreUtil for StubUtil {
    fn usage_count(&self, name: &str) -> u64 {
        self.usage.get(name).copied().unwrap_or(0)
    }
}

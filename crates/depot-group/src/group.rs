use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use depot_store::{
    BlobStore, BlobStoreManager, BlobStoreMetrics, StoreError, StoreResult,
};
use depot_types::{Blob, BlobId, BlobStoreConfiguration, ContentHash, GroupConfig, Headers};

use crate::error::{GroupError, GroupResult};
use crate::fill_policy::{FillPolicy, FillPolicyRegistry};
use crate::metrics::BlobStoreGroupMetrics;

/// A composite [`BlobStore`] spreading writes across member stores.
///
/// Writes go to the member chosen by the group's [`FillPolicy`]. Reads,
/// copies and deletes go to whichever member holds the blob. Owners found
/// on writable members are remembered in an in-process cache so repeated
/// reads skip the member scan.
pub struct BlobStoreGroup {
    config: BlobStoreConfiguration,
    members: Vec<Arc<dyn BlobStore>>,
    fill_policy: FillPolicy,
    located: RwLock<HashMap<BlobId, String>>,
}

impl BlobStoreGroup {
    /// Build a group from its configuration, resolving members by name.
    pub fn new(
        config: BlobStoreConfiguration,
        manager: &dyn BlobStoreManager,
        policies: &FillPolicyRegistry,
    ) -> GroupResult<Self> {
        if !config.is_group() {
            return Err(GroupError::NotAGroup(config.name));
        }
        let group = GroupConfig::from_configuration(&config)?;
        let members = group
            .members
            .iter()
            .map(|name| {
                manager.get(name).ok_or_else(|| GroupError::MissingMember {
                    group: config.name.clone(),
                    member: name.clone(),
                })
            })
            .collect::<GroupResult<Vec<_>>>()?;
        let fill_policy = policies.create_or_fallback(&group.fill_policy, &config.name);
        info!(
            group = %config.name,
            members = ?group.members,
            fill_policy = fill_policy.name(),
            "blob store group initialised"
        );
        Ok(Self::from_parts(config, members, fill_policy))
    }

    /// Assemble a group from already-resolved members.
    pub fn from_parts(
        config: BlobStoreConfiguration,
        members: Vec<Arc<dyn BlobStore>>,
        fill_policy: FillPolicy,
    ) -> Self {
        Self {
            config,
            members,
            fill_policy,
            located: RwLock::new(HashMap::new()),
        }
    }

    pub fn members(&self) -> &[Arc<dyn BlobStore>] {
        &self.members
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name()).collect()
    }

    pub fn fill_policy(&self) -> &FillPolicy {
        &self.fill_policy
    }

    /// Name of the fill policy in effect.
    pub fn fill_policy_name(&self) -> &str {
        self.fill_policy.name()
    }

    /// Member remembered as the owner of `id`, if any.
    pub fn cached_owner(&self, id: &BlobId) -> Option<String> {
        self.located.read().expect("lock poisoned").get(id).cloned()
    }

    /// Find the member holding a live copy of `id`.
    ///
    /// Writable members are searched first. Only owners that are writable
    /// are cached.
    pub fn locate(&self, id: &BlobId) -> StoreResult<Option<Arc<dyn BlobStore>>> {
        if let Some(name) = self.cached_owner(id) {
            if let Some(member) = self.member(&name) {
                return Ok(Some(member.clone()));
            }
            self.forget(id);
        }

        let mut ordered: Vec<(bool, &Arc<dyn BlobStore>)> =
            self.members.iter().map(|m| (m.is_writable(), m)).collect();
        ordered.sort_by_key(|(writable, _)| !writable);

        for (writable, member) in ordered {
            if member.exists(id)? {
                if writable {
                    self.remember(id, member.name());
                }
                debug!(group = %self.config.name, blob_id = %id, member = member.name(), "located blob");
                return Ok(Some(member.clone()));
            }
        }
        Ok(None)
    }

    fn member(&self, name: &str) -> Option<&Arc<dyn BlobStore>> {
        self.members.iter().find(|m| m.name() == name)
    }

    fn remember(&self, id: &BlobId, member: &str) {
        self.located
            .write()
            .expect("lock poisoned")
            .insert(id.clone(), member.to_string());
    }

    fn forget(&self, id: &BlobId) {
        self.located.write().expect("lock poisoned").remove(id);
    }

    fn choose(&self, headers: &Headers, operation: &str) -> StoreResult<Arc<dyn BlobStore>> {
        self.fill_policy
            .choose_blob_store(self, headers)?
            .ok_or_else(|| StoreError::NoEligibleMember {
                group: self.config.name.clone(),
                operation: operation.to_string(),
            })
    }

    /// Members holding `id`, live or soft-deleted when `include_deleted`.
    fn holders(&self, id: &BlobId, include_deleted: bool) -> StoreResult<Vec<&Arc<dyn BlobStore>>> {
        let mut holders = Vec::new();
        for member in &self.members {
            let holds = if include_deleted {
                member.get_with_deleted(id, true)?.is_some()
            } else {
                member.exists(id)?
            };
            if holds {
                holders.push(member);
            }
        }
        Ok(holders)
    }
}

impl BlobStore for BlobStoreGroup {
    fn create_with_id(
        &self,
        data: &[u8],
        headers: &Headers,
        id: Option<BlobId>,
    ) -> StoreResult<Blob> {
        let target = self.choose(headers, "create")?;
        let blob = target.create_with_id(data, headers, id)?;
        self.remember(blob.id(), target.name());
        debug!(group = %self.config.name, blob_id = %blob.id(), member = target.name(), "group create");
        Ok(blob)
    }

    fn create_from_file(
        &self,
        source: &Path,
        headers: &Headers,
        size: u64,
        hash: &ContentHash,
    ) -> StoreResult<Blob> {
        let target = self.choose(headers, "create")?;
        let blob = target.create_from_file(source, headers, size, hash)?;
        self.remember(blob.id(), target.name());
        debug!(group = %self.config.name, blob_id = %blob.id(), member = target.name(), "group create from file");
        Ok(blob)
    }

    fn copy(&self, id: &BlobId, headers: &Headers) -> StoreResult<Blob> {
        let source = self
            .locate(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let blob = source.copy(id, headers)?;
        self.remember(blob.id(), source.name());
        Ok(blob)
    }

    fn make_blob_permanent(&self, id: &BlobId, headers: &Headers) -> StoreResult<Blob> {
        let owner = self
            .locate(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let blob = owner.make_blob_permanent(id, headers)?;
        self.forget(id);
        self.remember(blob.id(), owner.name());
        Ok(blob)
    }

    fn get_with_deleted(&self, id: &BlobId, include_deleted: bool) -> StoreResult<Option<Blob>> {
        if include_deleted {
            // Soft-deleted blobs are never cached, so search every member.
            for member in &self.members {
                if let Some(blob) = member.get_with_deleted(id, true)? {
                    return Ok(Some(blob));
                }
            }
            return Ok(None);
        }
        match self.locate(id)? {
            Some(target) => target.get_with_deleted(id, false),
            None => Ok(None),
        }
    }

    fn exists(&self, id: &BlobId) -> StoreResult<bool> {
        for member in &self.members {
            if member.exists(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Soft-delete `id` on every member holding it. `true` only if every
    /// holder deleted it.
    fn delete(&self, id: &BlobId, reason: &str) -> StoreResult<bool> {
        self.forget(id);
        let holders = self.holders(id, false)?;
        if holders.is_empty() {
            return Ok(false);
        }
        let mut all = true;
        for member in holders {
            all &= member.delete(id, reason)?;
        }
        debug!(group = %self.config.name, blob_id = %id, reason, deleted = all, "group delete");
        Ok(all)
    }

    fn delete_hard(&self, id: &BlobId) -> StoreResult<bool> {
        self.forget(id);
        let holders = self.holders(id, true)?;
        if holders.is_empty() {
            return Ok(false);
        }
        let mut all = true;
        for member in holders {
            all &= member.delete_hard(id)?;
        }
        Ok(all)
    }

    fn configuration(&self) -> &BlobStoreConfiguration {
        &self.config
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn is_storage_available(&self) -> bool {
        true
    }

    fn is_groupable(&self) -> bool {
        false
    }

    fn is_empty(&self) -> StoreResult<bool> {
        for member in &self.members {
            if !member.is_empty()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn blob_ids(&self) -> StoreResult<Vec<BlobId>> {
        let mut ids = Vec::new();
        for member in &self.members {
            ids.extend(member.blob_ids()?);
        }
        Ok(ids)
    }

    fn metrics(&self) -> StoreResult<Box<dyn BlobStoreMetrics>> {
        let mut members = Vec::with_capacity(self.members.len());
        for member in &self.members {
            match member.metrics() {
                Ok(metrics) => members.push(metrics),
                Err(e) => warn!(group = %self.config.name, member = member.name(), error = %e, "member metrics unavailable"),
            }
        }
        Ok(Box::new(BlobStoreGroupMetrics::new(members)))
    }
}

impl fmt::Debug for BlobStoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStoreGroup")
            .field("name", &self.config.name)
            .field("members", &self.member_names())
            .field("fill_policy", &self.fill_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill_policy::{RoundRobinFillPolicy, WriteToFirstMemberFillPolicy, ROUND_ROBIN, WRITE_TO_FIRST};
    use crate::testing::StubManager;
    use depot_store::InMemoryBlobStore;
    use depot_types::headers::{headers, TEMPORARY_BLOB_HEADER};

    fn stores(names: &[&str]) -> Vec<Arc<InMemoryBlobStore>> {
        names.iter().map(|n| Arc::new(InMemoryBlobStore::new(*n))).collect()
    }

    fn group_of(members: &[Arc<InMemoryBlobStore>], policy: FillPolicy) -> BlobStoreGroup {
        let names: Vec<String> = members.iter().map(|m| m.name().to_string()).collect();
        let config = GroupConfig::new(names, policy.name()).to_configuration("group");
        let members = members
            .iter()
            .map(|m| m.clone() as Arc<dyn BlobStore>)
            .collect();
        BlobStoreGroup::from_parts(config, members, policy)
    }

    fn write_to_first(members: &[Arc<InMemoryBlobStore>]) -> BlobStoreGroup {
        group_of(members, FillPolicy::WriteToFirstMember(WriteToFirstMemberFillPolicy))
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn new_resolves_members_through_manager() {
        let one: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new("one"));
        let two: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new("two"));
        let manager = StubManager::with_stores([one, two]);
        let config = GroupConfig::new(vec!["two".into(), "one".into()], ROUND_ROBIN).to_configuration("g");
        let group = BlobStoreGroup::new(config, &manager, &FillPolicyRegistry::default()).unwrap();
        assert_eq!(group.member_names(), ["two", "one"]);
        assert_eq!(group.fill_policy_name(), ROUND_ROBIN);
    }

    #[test]
    fn new_fails_on_missing_member() {
        let manager = StubManager::default();
        let config = GroupConfig::new(vec!["ghost".into()], ROUND_ROBIN).to_configuration("g");
        let err = BlobStoreGroup::new(config, &manager, &FillPolicyRegistry::default()).unwrap_err();
        assert!(matches!(err, GroupError::MissingMember { ref member, .. } if member == "ghost"));
    }

    #[test]
    fn unknown_fill_policy_falls_back() {
        let one: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new("one"));
        let manager = StubManager::with_stores([one]);
        let config = GroupConfig::new(vec!["one".into()], "nonExistentPolicy").to_configuration("g");
        let group = BlobStoreGroup::new(config, &manager, &FillPolicyRegistry::default()).unwrap();
        assert_eq!(group.fill_policy_name(), WRITE_TO_FIRST);
    }

    #[test]
    fn rejects_non_group_configuration() {
        let config = BlobStoreConfiguration::new("plain", "Memory");
        let err = BlobStoreGroup::new(config, &StubManager::default(), &FillPolicyRegistry::default())
            .unwrap_err();
        assert!(matches!(err, GroupError::NotAGroup(_)));
    }

    #[test]
    fn group_flags() {
        let group = write_to_first(&stores(&["one"]));
        assert!(!group.is_writable());
        assert!(group.is_storage_available());
        assert!(!group.is_groupable());
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    #[test]
    fn create_delegates_to_chosen_member_and_caches_owner() {
        let members = stores(&["one", "two"]);
        let group = group_of(&members, FillPolicy::RoundRobin(RoundRobinFillPolicy::default()));
        let first = group.create(b"a", &Headers::new()).unwrap();
        let second = group.create(b"b", &Headers::new()).unwrap();
        assert_eq!(members[0].len(), 1);
        assert_eq!(members[1].len(), 1);
        assert_eq!(group.cached_owner(first.id()).as_deref(), Some("one"));
        assert_eq!(group.cached_owner(second.id()).as_deref(), Some("two"));
    }

    #[test]
    fn create_without_eligible_member_fails() {
        let members = stores(&["one"]);
        members[0].set_writable(false);
        let group = write_to_first(&members);
        let err = group.create(b"a", &Headers::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to find a member Blob Store of 'group' for create"
        );
    }

    #[test]
    fn create_from_file_uses_fill_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.bin");
        std::fs::write(&path, b"file bytes").unwrap();

        let members = stores(&["one", "two"]);
        members[0].set_available(false);
        let group = write_to_first(&members);
        let blob = group
            .create_from_file(&path, &Headers::new(), 10, &ContentHash::of(b"file bytes"))
            .unwrap();
        assert!(members[1].exists(blob.id()).unwrap());
    }

    #[test]
    fn copy_goes_to_source_member() {
        let members = stores(&["one", "two"]);
        let source = members[1].create(b"data", &Headers::new()).unwrap();
        let group = write_to_first(&members);
        let copy = group.copy(source.id(), &Headers::new()).unwrap();
        assert!(members[1].exists(copy.id()).unwrap());
        assert!(!members[0].exists(copy.id()).unwrap());

        let missing = group.copy(&BlobId::new("nope"), &Headers::new()).unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[test]
    fn make_blob_permanent_stays_on_owner() {
        let members = stores(&["one"]);
        let group = write_to_first(&members);
        let temp = group
            .create(b"tmp", &headers([(TEMPORARY_BLOB_HEADER, "true")]))
            .unwrap();
        assert!(temp.id().is_temporary());
        let permanent = group.make_blob_permanent(temp.id(), &Headers::new()).unwrap();
        assert!(!permanent.id().is_temporary());
        assert!(!group.exists(temp.id()).unwrap());
        assert_eq!(group.cached_owner(permanent.id()).as_deref(), Some("one"));
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[test]
    fn get_with_no_members_is_none() {
        let group = write_to_first(&[]);
        assert!(group.get(&BlobId::new("x")).unwrap().is_none());
    }

    #[test]
    fn get_finds_blob_on_any_member() {
        let members = stores(&["one", "two"]);
        let blob = members[1].create(b"two's", &Headers::new()).unwrap();
        let group = write_to_first(&members);
        let found = group.get(blob.id()).unwrap().unwrap();
        assert_eq!(found.content().as_ref(), b"two's");
        assert!(group.get(&BlobId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn get_including_deleted_searches_all_members() {
        let members = stores(&["one", "two"]);
        let blob = members[1].create(b"gone", &Headers::new()).unwrap();
        let group = write_to_first(&members);
        assert!(group.delete(blob.id(), "test").unwrap());
        assert!(group.get(blob.id()).unwrap().is_none());
        assert!(group.get_with_deleted(blob.id(), false).unwrap().is_none());
        assert!(group.get_with_deleted(blob.id(), true).unwrap().is_some());
    }

    #[test]
    fn locate_searches_writable_members_first() {
        let members = stores(&["readonly", "writable"]);
        let id = BlobId::new("BLOB_ID_VALUE");
        members[0].create_with_id(b"r", &Headers::new(), Some(id.clone())).unwrap();
        members[1].create_with_id(b"w", &Headers::new(), Some(id.clone())).unwrap();
        members[0].set_writable(false);
        let group = write_to_first(&members);
        let located = group.locate(&id).unwrap().unwrap();
        assert_eq!(located.name(), "writable");
        assert_eq!(group.cached_owner(&id).as_deref(), Some("writable"));
    }

    #[test]
    fn only_writable_owners_are_cached() {
        let members = stores(&["readonly", "writable"]);
        let blob = members[0].create(b"r", &Headers::new()).unwrap();
        members[0].set_writable(false);
        let group = write_to_first(&members);
        assert_eq!(group.locate(blob.id()).unwrap().unwrap().name(), "readonly");
        assert!(group.cached_owner(blob.id()).is_none());
    }

    #[test]
    fn exists_is_empty_and_blob_ids_span_members() {
        let members = stores(&["one", "two"]);
        let group = write_to_first(&members);
        assert!(group.is_empty().unwrap());
        let a = members[0].create(b"a", &Headers::new()).unwrap();
        let b = members[1].create(b"b", &Headers::new()).unwrap();
        assert!(!group.is_empty().unwrap());
        assert!(group.exists(a.id()).unwrap());
        assert!(group.exists(b.id()).unwrap());
        let mut ids = group.blob_ids().unwrap();
        ids.sort();
        let mut expected = vec![a.id().clone(), b.id().clone()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    #[test]
    fn delete_applies_to_every_holder() {
        let members = stores(&["one", "two"]);
        let both = BlobId::new("in_both");
        for m in &members {
            m.create_with_id(b"x", &Headers::new(), Some(both.clone())).unwrap();
        }
        let only_one = members[0].create(b"y", &Headers::new()).unwrap();
        let group = write_to_first(&members);

        assert!(!group.delete(&BlobId::new("doesntexist"), "just because").unwrap());
        assert!(group.delete(only_one.id(), "just because").unwrap());
        assert!(group.delete(&both, "just because").unwrap());
        assert!(!members[0].exists(&both).unwrap());
        assert!(!members[1].exists(&both).unwrap());
        assert!(group.cached_owner(&both).is_none());
    }

    #[test]
    fn delete_hard_removes_soft_deleted_blobs() {
        let members = stores(&["one", "two"]);
        let blob = members[1].create(b"x", &Headers::new()).unwrap();
        let group = write_to_first(&members);
        assert!(!group.delete_hard(&BlobId::new("doesntexist")).unwrap());
        group.delete(blob.id(), "soft").unwrap();
        assert!(group.delete_hard(blob.id()).unwrap());
        assert!(group.get_with_deleted(blob.id(), true).unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    #[test]
    fn metrics_aggregate_members() {
        let members = stores(&["one", "two"]);
        members[0].create(b"abc", &Headers::new()).unwrap();
        members[1].create(b"de", &Headers::new()).unwrap();
        let group = write_to_first(&members);
        let metrics = group.metrics().unwrap();
        assert_eq!(metrics.blob_count(), 2);
        assert_eq!(metrics.total_size(), 5);
        assert!(!metrics.is_unavailable());
        let by_store = metrics.available_space_by_file_store();
        assert!(by_store.contains_key("mem:one"));
        assert!(by_store.contains_key("mem:two"));
    }
}

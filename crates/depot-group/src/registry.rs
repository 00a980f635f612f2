//! Process-wide registry of blob stores.
//!
//! [`BlobStoreRegistry`] is the composition root: it owns every store by
//! name, builds groups through the validating descriptor, and answers the
//! manager and usage lookups the descriptor and groups depend on.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use depot_store::{
    BlobSession, BlobStore, BlobStoreManager, BlobStoreQuotaService, BlobStoreUtil, StoreError,
};
use depot_types::BlobStoreConfiguration;

use crate::config::GroupSettings;
use crate::descriptor::BlobStoreGroupDescriptor;
use crate::error::{GroupError, GroupResult};
use crate::fill_policy::FillPolicyRegistry;
use crate::group::BlobStoreGroup;

/// Registry of named stores, groups, repository attachments and running
/// maintenance tasks.
pub struct BlobStoreRegistry {
    stores: RwLock<BTreeMap<String, Arc<dyn BlobStore>>>,
    groups: RwLock<BTreeMap<String, Arc<BlobStoreGroup>>>,
    /// Repository name to the store it uses directly.
    repositories: RwLock<BTreeMap<String, String>>,
    /// Running conflicting tasks per store.
    tasks: RwLock<HashMap<String, usize>>,
    /// Held from validation to registration of a group change, so two
    /// changes never validate against the same topology.
    topology: Mutex<()>,
    quota: Arc<dyn BlobStoreQuotaService>,
    policies: FillPolicyRegistry,
    settings: GroupSettings,
}

impl BlobStoreRegistry {
    pub fn new(settings: GroupSettings, quota: Arc<dyn BlobStoreQuotaService>) -> Self {
        let policies =
            FillPolicyRegistry::new(settings.round_robin).with_quota_service(quota.clone());
        Self {
            stores: RwLock::new(BTreeMap::new()),
            groups: RwLock::new(BTreeMap::new()),
            repositories: RwLock::new(BTreeMap::new()),
            tasks: RwLock::new(HashMap::new()),
            topology: Mutex::new(()),
            quota,
            policies,
            settings,
        }
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    /// Register a leaf store.
    pub fn register(&self, store: Arc<dyn BlobStore>) -> GroupResult<()> {
        let name = store.name().to_string();
        let mut stores = self.stores.write().expect("lock poisoned");
        if stores.contains_key(&name) {
            return Err(GroupError::AlreadyExists(name));
        }
        stores.insert(name.clone(), store);
        info!(store = %name, "blob store registered");
        Ok(())
    }

    /// A validator bound to this registry's topology.
    pub fn descriptor(&self) -> BlobStoreGroupDescriptor<'_> {
        BlobStoreGroupDescriptor::new(self, self, self.quota.as_ref())
            .with_mode(self.settings.validation)
    }

    /// Sanitize and validate `config` without registering anything.
    pub fn validate(&self, config: &BlobStoreConfiguration) -> GroupResult<BlobStoreConfiguration> {
        let mut config = config.clone();
        BlobStoreGroupDescriptor::sanitize_config(&mut config)?;
        self.descriptor().validate_config(&config)?;
        Ok(config)
    }

    /// Validate, build and register a new group.
    pub fn create_group(&self, config: BlobStoreConfiguration) -> GroupResult<Arc<BlobStoreGroup>> {
        let _topology = self.topology.lock().expect("topology lock poisoned");
        if self.get(&config.name).is_some() {
            return Err(GroupError::AlreadyExists(config.name));
        }
        let config = self.validate(&config)?;
        let group = Arc::new(BlobStoreGroup::new(config, self, &self.policies)?);
        self.insert_group(group.clone(), false)?;
        info!(group = group.name(), members = ?group.member_names(), "blob store group created");
        Ok(group)
    }

    /// Validate a new configuration for an existing group and swap it in.
    ///
    /// The rebuilt group starts with a fresh fill policy and ownership cache.
    pub fn update_group(&self, config: BlobStoreConfiguration) -> GroupResult<Arc<BlobStoreGroup>> {
        let _topology = self.topology.lock().expect("topology lock poisoned");
        if self.group(&config.name).is_none() {
            return Err(match self.get(&config.name) {
                Some(_) => GroupError::NotAGroup(config.name),
                None => GroupError::Store(StoreError::StoreNotFound(config.name)),
            });
        }
        let config = self.validate(&config)?;
        let group = Arc::new(BlobStoreGroup::new(config, self, &self.policies)?);
        self.insert_group(group.clone(), true)?;
        info!(group = group.name(), members = ?group.member_names(), "blob store group updated");
        Ok(group)
    }

    fn insert_group(&self, group: Arc<BlobStoreGroup>, replace: bool) -> GroupResult<()> {
        let name = group.name().to_string();
        let mut stores = self.stores.write().expect("lock poisoned");
        if !replace && stores.contains_key(&name) {
            return Err(GroupError::AlreadyExists(name));
        }
        stores.insert(name.clone(), group.clone());
        self.groups
            .write()
            .expect("lock poisoned")
            .insert(name, group);
        Ok(())
    }

    pub fn group(&self, name: &str) -> Option<Arc<BlobStoreGroup>> {
        self.groups.read().expect("lock poisoned").get(name).cloned()
    }

    pub fn groups(&self) -> Vec<Arc<BlobStoreGroup>> {
        self.groups
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Names of groups listing `name` as a member.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.groups()
            .iter()
            .filter(|g| BlobStoreGroupDescriptor::config_has_dependency_on(g.configuration(), name))
            .map(|g| g.name().to_string())
            .collect()
    }

    /// Unregister a store that nothing uses any more.
    pub fn remove(&self, name: &str) -> GroupResult<Arc<dyn BlobStore>> {
        let _topology = self.topology.lock().expect("topology lock poisoned");
        if self.get(name).is_none() {
            return Err(StoreError::StoreNotFound(name.to_string()).into());
        }
        let in_use = |usage: String| GroupError::InUse {
            name: name.to_string(),
            usage,
        };
        if self.has_conflicting_tasks(name) {
            return Err(in_use("running tasks".into()));
        }
        let repositories = self.usage_count(name);
        if repositories > 0 {
            return Err(in_use(format!("{repositories} repositories")));
        }
        if let Some(group) = self.dependents(name).into_iter().next() {
            return Err(in_use(format!("Blob Store Group '{group}'")));
        }

        self.groups.write().expect("lock poisoned").remove(name);
        let removed = self
            .stores
            .write()
            .expect("lock poisoned")
            .remove(name)
            .ok_or_else(|| StoreError::StoreNotFound(name.to_string()))?;
        info!(store = name, "blob store removed");
        Ok(removed)
    }

    /// Record that `repository` stores its blobs directly in `store`.
    pub fn attach_repository(&self, repository: &str, store: &str) -> GroupResult<()> {
        let _topology = self.topology.lock().expect("topology lock poisoned");
        if self.get(store).is_none() {
            return Err(StoreError::StoreNotFound(store.to_string()).into());
        }
        self.repositories
            .write()
            .expect("lock poisoned")
            .insert(repository.to_string(), store.to_string());
        debug!(repository, store, "repository attached");
        Ok(())
    }

    /// Forget a repository attachment, returning the store it used.
    pub fn detach_repository(&self, repository: &str) -> Option<String> {
        self.repositories
            .write()
            .expect("lock poisoned")
            .remove(repository)
    }

    /// Mark a conflicting maintenance task as running against `store`.
    pub fn begin_task(&self, store: &str) {
        let _topology = self.topology.lock().expect("topology lock poisoned");
        *self
            .tasks
            .write()
            .expect("lock poisoned")
            .entry(store.to_string())
            .or_insert(0) += 1;
    }

    pub fn end_task(&self, store: &str) {
        let mut tasks = self.tasks.write().expect("lock poisoned");
        if let Some(count) = tasks.get_mut(store) {
            *count -= 1;
            if *count == 0 {
                tasks.remove(store);
            }
        }
    }

    /// Returns `true` if `name` can be turned into a group holding itself:
    /// groupable, writable, not already grouped and not busy.
    pub fn is_convertible(&self, name: &str) -> bool {
        self.get(name).is_some_and(|store| {
            store.is_groupable()
                && store.is_writable()
                && self.parent(name).is_none()
                && !self.has_conflicting_tasks(name)
        })
    }

    /// Open a session against the named store.
    pub fn open_session(&self, name: &str) -> GroupResult<BlobSession> {
        let store = self
            .get(name)
            .ok_or_else(|| StoreError::StoreNotFound(name.to_string()))?;
        Ok(BlobSession::open(store))
    }
}

impl BlobStoreManager for BlobStoreRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        self.stores.read().expect("lock poisoned").get(name).cloned()
    }

    fn browse(&self) -> Vec<Arc<dyn BlobStore>> {
        self.stores
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn parent(&self, name: &str) -> Option<String> {
        self.groups
            .read()
            .expect("lock poisoned")
            .values()
            .find(|g| g.member_names().contains(&name))
            .map(|g| g.name().to_string())
    }

    fn has_conflicting_tasks(&self, name: &str) -> bool {
        self.tasks
            .read()
            .expect("lock poisoned")
            .get(name)
            .is_some_and(|count| *count > 0)
    }
}

impl BlobStoreUtil for BlobStoreRegistry {
    fn usage_count(&self, name: &str) -> u64 {
        self.repositories
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|store| store.as_str() == name)
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use crate::fill_policy::{ROUND_ROBIN, WRITE_TO_FIRST};
    use depot_store::{InMemoryBlobStore, SoftQuotaService};
    use depot_types::{GroupConfig, Headers};
    use std::sync::Barrier;
    use std::thread;

    fn registry_with(names: &[&str]) -> BlobStoreRegistry {
        let registry = BlobStoreRegistry::new(GroupSettings::default(), Arc::new(SoftQuotaService));
        for name in names {
            registry.register(Arc::new(InMemoryBlobStore::new(*name))).unwrap();
        }
        registry
    }

    fn group_config(name: &str, members: &[&str]) -> BlobStoreConfiguration {
        GroupConfig::new(members.iter().map(|m| m.to_string()).collect(), ROUND_ROBIN)
            .to_configuration(name)
    }

    fn violation_kinds(err: GroupError) -> Vec<ViolationKind> {
        err.violations()
            .map(|v| v.violations.iter().map(|v| v.kind).collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = registry_with(&["a"]);
        let err = registry.register(Arc::new(InMemoryBlobStore::new("a"))).unwrap_err();
        assert!(matches!(err, GroupError::AlreadyExists(_)));
    }

    #[test]
    fn create_group_registers_and_parents_members() {
        let registry = registry_with(&["a", "b"]);
        let group = registry.create_group(group_config("g", &["a", "b"])).unwrap();
        assert_eq!(group.member_names(), ["a", "b"]);
        assert_eq!(registry.parent("a").as_deref(), Some("g"));
        assert!(registry.get("g").is_some());
        assert_eq!(registry.browse().len(), 3);
        assert_eq!(registry.dependents("b"), ["g"]);
    }

    #[test]
    fn create_group_sanitizes_first() {
        let registry = registry_with(&["a"]);
        let config = GroupConfig::new(vec![" a ".into(), "a".into()], "").to_configuration("g");
        let group = registry.create_group(config).unwrap();
        assert_eq!(group.member_names(), ["a"]);
        assert_eq!(group.fill_policy_name(), WRITE_TO_FIRST);
    }

    #[test]
    fn member_cannot_join_two_groups() {
        let registry = registry_with(&["a"]);
        registry.create_group(group_config("g1", &["a"])).unwrap();
        let err = registry.create_group(group_config("g2", &["a"])).unwrap_err();
        assert_eq!(violation_kinds(err), [ViolationKind::AlreadyGrouped]);
    }

    #[test]
    fn concurrent_groups_never_share_a_member() {
        for _ in 0..200 {
            let registry = registry_with(&["a"]);
            let barrier = Barrier::new(4);
            let created = thread::scope(|s| {
                let handles: Vec<_> = (0..4)
                    .map(|i| {
                        let (registry, barrier) = (&registry, &barrier);
                        s.spawn(move || {
                            barrier.wait();
                            registry.create_group(group_config(&format!("g{i}"), &["a"])).is_ok()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(false))
                    .filter(|&ok| ok)
                    .count()
            });
            assert_eq!(created, 1);
            assert_eq!(registry.dependents("a").len(), 1);
        }
    }

    #[test]
    fn groups_cannot_nest() {
        let registry = registry_with(&["a"]);
        registry.create_group(group_config("inner", &["a"])).unwrap();
        let err = registry.create_group(group_config("outer", &["inner"])).unwrap_err();
        assert_eq!(violation_kinds(err), [ViolationKind::NestedGroup]);
    }

    #[test]
    fn running_task_blocks_membership() {
        let registry = registry_with(&["a"]);
        registry.begin_task("a");
        let err = registry.create_group(group_config("g", &["a"])).unwrap_err();
        assert_eq!(violation_kinds(err), [ViolationKind::ConflictingTasks]);
        registry.end_task("a");
        assert!(registry.create_group(group_config("g", &["a"])).is_ok());
    }

    #[test]
    fn repository_storage_blocks_membership() {
        let registry = registry_with(&["a"]);
        registry.attach_repository("maven-releases", "a").unwrap();
        assert_eq!(registry.usage_count("a"), 1);
        let err = registry.create_group(group_config("g", &["a"])).unwrap_err();
        assert!(err.to_string().contains("is set as storage for 1 repositories"));
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    #[test]
    fn update_group_adds_members() {
        let registry = registry_with(&["a", "b"]);
        registry.create_group(group_config("g", &["a"])).unwrap();
        let updated = registry.update_group(group_config("g", &["a", "b"])).unwrap();
        assert_eq!(updated.member_names(), ["a", "b"]);
        assert_eq!(registry.group("g").unwrap().member_names(), ["a", "b"]);
    }

    #[test]
    fn update_group_refuses_dropping_non_empty_member() {
        let registry = registry_with(&["a", "b"]);
        registry.create_group(group_config("g", &["a", "b"])).unwrap();
        registry.get("b").unwrap().create(b"x", &Headers::new()).unwrap();
        let err = registry.update_group(group_config("g", &["a"])).unwrap_err();
        assert_eq!(violation_kinds(err), [ViolationKind::MemberRemoval]);
    }

    #[test]
    fn update_unknown_group_fails() {
        let registry = registry_with(&["a"]);
        assert!(matches!(
            registry.update_group(group_config("a", &["b"])).unwrap_err(),
            GroupError::NotAGroup(_)
        ));
        assert!(matches!(
            registry.update_group(group_config("nope", &["a"])).unwrap_err(),
            GroupError::Store(StoreError::StoreNotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Removal and conversion
    // -----------------------------------------------------------------------

    #[test]
    fn remove_refuses_stores_in_use() {
        let registry = registry_with(&["a", "b", "c"]);
        registry.create_group(group_config("g", &["a"])).unwrap();
        registry.attach_repository("npm", "b").unwrap();
        registry.begin_task("c");

        assert!(matches!(registry.remove("a"), Err(GroupError::InUse { .. })));
        assert!(matches!(registry.remove("b"), Err(GroupError::InUse { .. })));
        assert!(matches!(registry.remove("c"), Err(GroupError::InUse { .. })));

        registry.remove("g").unwrap();
        registry.remove("a").unwrap();
        assert!(registry.get("a").is_none());
        assert!(registry.group("g").is_none());

        assert_eq!(registry.detach_repository("npm").as_deref(), Some("b"));
        registry.remove("b").unwrap();
    }

    #[test]
    fn convertible_stores() {
        let registry = registry_with(&["a", "b", "c"]);
        registry
            .register(Arc::new(InMemoryBlobStore::new("d").with_groupable(false)))
            .unwrap();
        registry.create_group(group_config("g", &["b"])).unwrap();
        registry.begin_task("c");
        assert!(registry.is_convertible("a"));
        assert!(!registry.is_convertible("b"));
        assert!(!registry.is_convertible("c"));
        assert!(!registry.is_convertible("d"));
        assert!(!registry.is_convertible("g"));
        assert!(!registry.is_convertible("missing"));
    }

    #[test]
    fn sessions_open_against_groups() {
        let registry = registry_with(&["a"]);
        registry.create_group(group_config("g", &["a"])).unwrap();
        let mut session = registry.open_session("g").unwrap();
        let blob = session.create(b"data", &Headers::new()).unwrap();
        session.commit();
        assert!(registry.get("a").unwrap().exists(blob.id()).unwrap());
        assert!(registry.open_session("missing").is_err());
    }
}

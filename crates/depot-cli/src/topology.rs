//! TOML description of a store topology and its assembly into a
//! [`BlobStoreRegistry`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use depot_group::{BlobStoreRegistry, GroupError, GroupSettings};
use depot_reconcile::ReconciliationConfig;
use depot_store::quota::{QUOTA_LIMIT_KEY, QUOTA_TYPE_KEY};
use depot_store::{BlobCreatedListener, BlobStore, InMemoryBlobStore, SoftQuotaService, MEMORY_TYPE};
use depot_types::config::QUOTA_SECTION;
use depot_types::{BlobStoreConfiguration, GroupConfig, GROUP_TYPE};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub stores: Vec<StoreDef>,
    pub repositories: Vec<RepositoryDef>,
    pub settings: GroupSettings,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StoreDef {
    pub name: String,
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_available")]
    pub available: bool,
    /// Byte capacity of a memory store; unlimited when absent.
    pub capacity: Option<u64>,
    #[serde(default)]
    pub date_based: bool,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub fill_policy: String,
    pub quota: Option<QuotaDef>,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuotaDef {
    #[serde(rename = "type")]
    pub quota_type: String,
    pub limit_bytes: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RepositoryDef {
    pub name: String,
    pub blob_store: String,
}

fn default_store_type() -> String {
    MEMORY_TYPE.to_string()
}

fn default_available() -> bool {
    true
}

impl StoreDef {
    pub fn is_group(&self) -> bool {
        self.store_type == GROUP_TYPE
    }

    /// Persisted configuration of this store, quota and group sections included.
    pub fn configuration(&self) -> BlobStoreConfiguration {
        let mut config = BlobStoreConfiguration::new(&self.name, &self.store_type);
        config.attributes = self.attributes.clone();
        if let Some(quota) = &self.quota {
            config.set_attribute(QUOTA_SECTION, QUOTA_TYPE_KEY, Value::String(quota.quota_type.clone()));
            config.set_attribute(QUOTA_SECTION, QUOTA_LIMIT_KEY, Value::from(quota.limit_bytes));
        }
        if self.is_group() {
            GroupConfig::new(self.members.clone(), self.fill_policy.clone()).apply_to(&mut config);
        }
        config
    }

    fn memory_store(&self, listener: Option<&Arc<dyn BlobCreatedListener>>) -> InMemoryBlobStore {
        let mut store = InMemoryBlobStore::with_configuration(self.configuration())
            .with_date_based_layout(self.date_based);
        if let Some(capacity) = self.capacity {
            store = store.with_capacity(capacity);
        }
        if let Some(listener) = listener {
            store = store.with_listener(listener.clone());
        }
        store.set_writable(!self.read_only);
        store.set_available(self.available);
        store
    }
}

/// A registry assembled from a [`Topology`], with the groups that failed.
pub struct Assembled {
    pub registry: BlobStoreRegistry,
    /// Group name and the error that kept it out of the registry, in file order.
    pub failures: Vec<(String, GroupError)>,
}

impl Topology {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading topology {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing topology {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let topology: Self = toml::from_str(text)?;
        for store in &topology.stores {
            if store.store_type != MEMORY_TYPE && !store.is_group() {
                bail!("store '{}' has unsupported type '{}'", store.name, store.store_type);
            }
        }
        Ok(topology)
    }

    pub fn groups(&self) -> impl Iterator<Item = &StoreDef> {
        self.stores.iter().filter(|s| s.is_group())
    }

    /// Register leaf stores, attach repositories, then create groups in
    /// file order.
    ///
    /// Repositories on leaves are attached before any group is built so the
    /// usage rule sees them. A group that fails to build is recorded in
    /// [`Assembled::failures`] and later groups still get their turn.
    pub fn assemble(
        &self,
        settings: GroupSettings,
        listener: Option<Arc<dyn BlobCreatedListener>>,
    ) -> anyhow::Result<Assembled> {
        let registry = BlobStoreRegistry::new(settings, Arc::new(SoftQuotaService));

        for def in self.stores.iter().filter(|s| !s.is_group()) {
            let store: Arc<dyn BlobStore> = Arc::new(def.memory_store(listener.as_ref()));
            registry.register(store)?;
        }

        let (on_leaves, on_groups): (Vec<_>, Vec<_>) = self
            .repositories
            .iter()
            .partition(|r| !self.groups().any(|g| g.name == r.blob_store));
        for repository in on_leaves {
            registry
                .attach_repository(&repository.name, &repository.blob_store)
                .with_context(|| format!("attaching repository '{}'", repository.name))?;
        }

        let mut failures = Vec::new();
        for def in self.groups() {
            match registry.create_group(def.configuration()) {
                Ok(group) => debug!(group = group.name(), "group assembled"),
                Err(e) => {
                    warn!(group = %def.name, error = %e, "group rejected");
                    failures.push((def.name.clone(), e));
                }
            }
        }

        for repository in on_groups {
            if let Err(e) = registry.attach_repository(&repository.name, &repository.blob_store) {
                warn!(repository = %repository.name, error = %e, "repository left unattached");
            }
        }

        Ok(Assembled { registry, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_group::ViolationKind;
    use depot_store::BlobStoreManager;

    const TOPOLOGY: &str = r#"
[settings.round_robin]
skip_on_soft_quota_violation = true

[reconciliation]
retention_days = 7

[[stores]]
name = "fast"
capacity = 1024

[[stores]]
name = "slow"
date_based = true

[[stores]]
name = "archive"
read_only = true

[[stores]]
name = "main"
type = "Group"
members = ["fast", "slow"]
fill_policy = "roundRobin"

[stores.quota]
type = "spaceUsedQuota"
limit_bytes = 4096

[[repositories]]
name = "maven-releases"
blob_store = "main"
"#;

    #[test]
    fn parse_reads_every_section() {
        let topology = Topology::parse(TOPOLOGY).unwrap();
        assert_eq!(topology.stores.len(), 4);
        assert!(topology.settings.round_robin.skip_on_soft_quota_violation);
        assert_eq!(topology.reconciliation.retention_days, Some(7));
        let archive = &topology.stores[2];
        assert_eq!(archive.store_type, MEMORY_TYPE);
        assert!(archive.read_only);
        assert!(archive.available);
        assert_eq!(topology.groups().count(), 1);
    }

    #[test]
    fn group_configuration_carries_members_and_quota() {
        let topology = Topology::parse(TOPOLOGY).unwrap();
        let config = topology.stores[3].configuration();
        assert!(config.is_group());
        let group = GroupConfig::from_configuration(&config).unwrap();
        assert_eq!(group.members, vec!["fast", "slow"]);
        assert_eq!(group.fill_policy, "roundRobin");
        assert_eq!(
            config.attribute(QUOTA_SECTION, QUOTA_LIMIT_KEY),
            Some(&Value::from(4096u64))
        );
    }

    #[test]
    fn unsupported_store_type_is_rejected() {
        let err = Topology::parse("[[stores]]\nname = \"s3\"\ntype = \"S3\"\n").unwrap_err();
        assert!(err.to_string().contains("unsupported type 'S3'"));
    }

    #[test]
    fn assemble_builds_groups_and_attaches_repositories() {
        let topology = Topology::parse(TOPOLOGY).unwrap();
        let assembled = topology.assemble(topology.settings, None).unwrap();
        assert!(assembled.failures.is_empty());
        let registry = &assembled.registry;
        let group = registry.group("main").unwrap();
        assert_eq!(group.member_names(), vec!["fast", "slow"]);
        assert_eq!(registry.parent("fast").as_deref(), Some("main"));
        assert!(!registry.get("archive").unwrap().is_writable());
    }

    #[test]
    fn rejected_group_is_reported_and_others_still_built() {
        let text = r#"
[[stores]]
name = "a"

[[stores]]
name = "b"

[[stores]]
name = "g1"
type = "Group"
members = ["a"]

[[stores]]
name = "g2"
type = "Group"
members = ["a", "b"]

[[repositories]]
name = "npm"
blob_store = "b"
"#;
        let topology = Topology::parse(text).unwrap();
        let assembled = topology.assemble(GroupSettings::default(), None).unwrap();
        assert!(assembled.registry.group("g1").is_some());
        assert_eq!(assembled.failures.len(), 1);
        let (name, error) = &assembled.failures[0];
        assert_eq!(name, "g2");
        let violations = error.violations().unwrap();
        assert!(violations.contains(ViolationKind::AlreadyGrouped));
        assert!(violations.contains(ViolationKind::RepositoryStorage));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Topology::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("reading topology"));
    }
}

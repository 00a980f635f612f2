//! Structural validation of group configurations.
//!
//! Rules run in a fixed order, like stages of a pipeline. In
//! [`ValidationMode::CollectAll`] every rule runs and all violations are
//! reported together; in [`ValidationMode::FailFast`] validation stops at
//! the first rule that fails.

use std::collections::HashSet;

use tracing::debug;

use depot_store::{BlobStoreManager, BlobStoreQuotaService, BlobStoreUtil};
use depot_types::{BlobStoreConfiguration, GroupConfig};

use crate::config::ValidationMode;
use crate::error::{GroupError, GroupResult, ValidationErrors, Violation, ViolationKind};
use crate::fill_policy::FALLBACK_FILL_POLICY;

/// The configuration under validation, with its group view parsed once.
struct Candidate<'c> {
    config: &'c BlobStoreConfiguration,
    group: GroupConfig,
}

impl Candidate<'_> {
    fn name(&self) -> &str {
        &self.config.name
    }

    /// Listed members other than the group itself.
    fn members(&self) -> impl Iterator<Item = &str> {
        let name = self.name();
        self.group
            .members
            .iter()
            .map(String::as_str)
            .filter(move |m| *m != name)
    }
}

/// Validates group configurations against the live store topology.
pub struct BlobStoreGroupDescriptor<'a> {
    manager: &'a dyn BlobStoreManager,
    util: &'a dyn BlobStoreUtil,
    quota: &'a dyn BlobStoreQuotaService,
    mode: ValidationMode,
}

impl<'a> BlobStoreGroupDescriptor<'a> {
    pub fn new(
        manager: &'a dyn BlobStoreManager,
        util: &'a dyn BlobStoreUtil,
        quota: &'a dyn BlobStoreQuotaService,
    ) -> Self {
        Self {
            manager,
            util,
            quota,
            mode: ValidationMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate `config`, failing with [`GroupError::Validation`] if any
    /// rule is violated.
    pub fn validate_config(&self, config: &BlobStoreConfiguration) -> GroupResult<()> {
        let report = self.check(config)?;
        if report.is_empty() {
            Ok(())
        } else {
            Err(GroupError::Validation(report))
        }
    }

    /// Run the rules and return every violation found.
    ///
    /// Errors only when the configuration is not a readable group.
    pub fn check(&self, config: &BlobStoreConfiguration) -> GroupResult<ValidationErrors> {
        if !config.is_group() {
            return Err(GroupError::NotAGroup(config.name.clone()));
        }
        let candidate = Candidate {
            config,
            group: GroupConfig::from_configuration(config)?,
        };

        type Rule<'d> = fn(&BlobStoreGroupDescriptor<'d>, &Candidate<'_>) -> GroupResult<Vec<Violation>>;
        let rules: [(&str, Rule<'a>); 7] = [
            ("membership", Self::check_membership),
            ("member-type", Self::check_member_types),
            ("conflicting-tasks", Self::check_conflicting_tasks),
            ("parent", Self::check_parents),
            ("repository-usage", Self::check_repository_usage),
            ("member-removal", Self::check_member_removal),
            ("quota", Self::check_quota),
        ];

        let mut report = ValidationErrors::default();
        for (rule, check) in rules {
            let violations = check(self, &candidate)?;
            if violations.is_empty() {
                continue;
            }
            debug!(group = candidate.name(), rule, count = violations.len(), "group rule violated");
            if self.mode == ValidationMode::FailFast {
                report.violations.extend(violations.into_iter().take(1));
                break;
            }
            report.violations.extend(violations);
        }
        Ok(report)
    }

    /// Normalise a group configuration before validation: trim member
    /// names, drop blanks and duplicates, and default the fill policy.
    pub fn sanitize_config(config: &mut BlobStoreConfiguration) -> GroupResult<()> {
        let mut group = GroupConfig::from_configuration(config)?;
        let mut seen = HashSet::new();
        group.members = group
            .members
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        if group.fill_policy.trim().is_empty() {
            group.fill_policy = FALLBACK_FILL_POLICY.to_string();
        } else {
            group.fill_policy = group.fill_policy.trim().to_string();
        }
        group.apply_to(config);
        Ok(())
    }

    /// Returns `true` if `config` is a group listing `name` as a member.
    pub fn config_has_dependency_on(config: &BlobStoreConfiguration, name: &str) -> bool {
        config.is_group()
            && GroupConfig::from_configuration(config)
                .map(|g| g.members.iter().any(|m| m == name))
                .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    fn check_membership(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        let mut out = Vec::new();
        if c.group.members.is_empty() {
            out.push(Violation::new(
                c.name(),
                ViolationKind::EmptyMembers,
                format!("Blob Store '{}' cannot be empty", c.name()),
            ));
        }
        if c.group.members.iter().any(|m| m == c.name()) {
            out.push(Violation::new(
                c.name(),
                ViolationKind::ContainsItself,
                format!("Blob Store '{}' cannot contain itself", c.name()),
            ));
        }
        Ok(out)
    }

    fn check_member_types(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        let mut out = Vec::new();
        for member in c.members() {
            match self.manager.get(member) {
                None => out.push(Violation::new(
                    member,
                    ViolationKind::MissingMember,
                    format!("Blob Store '{member}' does not exist"),
                )),
                Some(store) if store.configuration().is_group() => out.push(Violation::new(
                    member,
                    ViolationKind::NestedGroup,
                    format!(
                        "Blob Store '{member}' is of type 'Group' and is not eligible to be a group member"
                    ),
                )),
                Some(_) => {}
            }
        }
        Ok(out)
    }

    fn check_conflicting_tasks(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        Ok(c.members()
            .filter(|m| self.manager.has_conflicting_tasks(m))
            .map(|m| {
                Violation::new(
                    m,
                    ViolationKind::ConflictingTasks,
                    format!(
                        "Blob Store '{m}' has conflicting tasks running and is not eligible to be a group member"
                    ),
                )
            })
            .collect())
    }

    fn check_parents(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        Ok(c.members()
            .filter_map(|m| {
                let parent = self.manager.parent(m)?;
                (parent != c.name()).then(|| {
                    Violation::new(
                        m,
                        ViolationKind::AlreadyGrouped,
                        format!(
                            "Blob Store '{m}' is already a member of Blob Store Group '{parent}'"
                        ),
                    )
                })
            })
            .collect())
    }

    fn check_repository_usage(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        Ok(c.members()
            .filter_map(|m| {
                let count = self.util.usage_count(m);
                (count > 0).then(|| {
                    Violation::new(
                        m,
                        ViolationKind::RepositoryStorage,
                        format!(
                            "Blob Store '{m}' is set as storage for {count} repositories and is not eligible to be a group member"
                        ),
                    )
                })
            })
            .collect())
    }

    /// Members dropped from an existing group must be empty or read-only.
    fn check_member_removal(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        let Some(previous) = self.manager.get(c.name()) else {
            return Ok(Vec::new());
        };
        if !previous.configuration().is_group() {
            return Ok(Vec::new());
        }
        let previous = GroupConfig::from_configuration(previous.configuration())?;

        let mut out = Vec::new();
        for removed in previous
            .members
            .iter()
            .filter(|m| !c.group.members.contains(m))
        {
            let Some(store) = self.manager.get(removed) else {
                continue;
            };
            if store.is_writable() && !store.is_empty().map_err(GroupError::Store)? {
                out.push(Violation::new(
                    removed.as_str(),
                    ViolationKind::MemberRemoval,
                    format!(
                        "Blob Store '{removed}' cannot be removed from Blob Store Group '{}', use the dedicated member-removal task instead",
                        c.name()
                    ),
                ));
            }
        }
        Ok(out)
    }

    fn check_quota(&self, c: &Candidate<'_>) -> GroupResult<Vec<Violation>> {
        Ok(match self.quota.validate_soft_quota_config(c.config) {
            Ok(()) => Vec::new(),
            Err(e) => vec![Violation::new(c.name(), ViolationKind::Quota, e.to_string())],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill_policy::ROUND_ROBIN;
    use crate::testing::{StubManager, StubQuota, StubUtil};
    use depot_store::{BlobStore, InMemoryBlobStore};
    use depot_types::config::GROUP_TYPE;
    use depot_types::Headers;
    use std::sync::Arc;

    fn plain(name: &str) -> Arc<dyn BlobStore> {
        Arc::new(InMemoryBlobStore::new(name))
    }

    fn group_config(name: &str, members: &[&str]) -> BlobStoreConfiguration {
        GroupConfig::new(members.iter().map(|m| m.to_string()).collect(), ROUND_ROBIN)
            .to_configuration(name)
    }

    fn messages(
        manager: &StubManager,
        util: &StubUtil,
        config: &BlobStoreConfiguration,
    ) -> Vec<String> {
        let quota = StubQuota::violating(&[]);
        let descriptor = BlobStoreGroupDescriptor::new(manager, util, &quota);
        match descriptor.validate_config(config) {
            Ok(()) => Vec::new(),
            Err(GroupError::Validation(errors)) => errors.messages().map(str::to_string).collect(),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // -----------------------------------------------------------------------
    // Individual rules
    // -----------------------------------------------------------------------

    #[test]
    fn empty_members() {
        let manager = StubManager::default();
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &[])),
            ["Blob Store 'g' cannot be empty"]
        );
    }

    #[test]
    fn contains_itself() {
        let manager = StubManager::with_stores([plain("a")]);
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["a", "g"])),
            ["Blob Store 'g' cannot contain itself"]
        );
    }

    #[test]
    fn nested_group_member() {
        let nested = InMemoryBlobStore::with_configuration(BlobStoreConfiguration::new("inner", GROUP_TYPE));
        let manager = StubManager::with_stores([Arc::new(nested) as Arc<dyn BlobStore>]);
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["inner"])),
            ["Blob Store 'inner' is of type 'Group' and is not eligible to be a group member"]
        );
    }

    #[test]
    fn missing_member() {
        let manager = StubManager::default();
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["ghost"])),
            ["Blob Store 'ghost' does not exist"]
        );
    }

    #[test]
    fn conflicting_tasks_member() {
        let mut manager = StubManager::with_stores([plain("a"), plain("b")]);
        manager.conflicting.insert("b".into());
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["a", "b"])),
            ["Blob Store 'b' has conflicting tasks running and is not eligible to be a group member"]
        );
    }

    #[test]
    fn member_of_another_group() {
        let mut manager = StubManager::with_stores([plain("a")]);
        manager.parents.insert("a".into(), "other".into());
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["a"])),
            ["Blob Store 'a' is already a member of Blob Store Group 'other'"]
        );
    }

    #[test]
    fn member_of_same_group_is_fine() {
        let mut manager = StubManager::with_stores([plain("a")]);
        manager.parents.insert("a".into(), "g".into());
        assert!(messages(&manager, &StubUtil::default(), &group_config("g", &["a"])).is_empty());
    }

    #[test]
    fn member_used_by_repositories() {
        let manager = StubManager::with_stores([plain("a")]);
        let util = StubUtil {
            usage: [("a".to_string(), 2)].into(),
        };
        assert_eq!(
            messages(&manager, &util, &group_config("g", &["a"])),
            ["Blob Store 'a' is set as storage for 2 repositories and is not eligible to be a group member"]
        );
    }

    #[test]
    fn removing_non_empty_writable_member() {
        let full = InMemoryBlobStore::new("full");
        full.create(b"x", &Headers::new()).unwrap();
        let frozen = InMemoryBlobStore::new("frozen");
        frozen.create(b"y", &Headers::new()).unwrap();
        frozen.set_writable(false);
        let previous = InMemoryBlobStore::with_configuration(group_config(
            "g",
            &["a", "full", "frozen", "empty"],
        ));
        let manager = StubManager::with_stores([
            plain("a"),
            plain("empty"),
            Arc::new(full) as Arc<dyn BlobStore>,
            Arc::new(frozen) as Arc<dyn BlobStore>,
            Arc::new(previous) as Arc<dyn BlobStore>,
        ]);
        assert_eq!(
            messages(&manager, &StubUtil::default(), &group_config("g", &["a"])),
            ["Blob Store 'full' cannot be removed from Blob Store Group 'g', use the dedicated member-removal task instead"]
        );
    }

    #[test]
    fn quota_configuration_is_delegated() {
        let manager = StubManager::with_stores([plain("a")]);
        let util = StubUtil::default();
        let quota = StubQuota::failing();
        let err = BlobStoreGroupDescriptor::new(&manager, &util, &quota)
            .validate_config(&group_config("g", &["a"]))
            .unwrap_err();
        assert!(err.violations().unwrap().contains(ViolationKind::Quota));
    }

    // -----------------------------------------------------------------------
    // Whole-configuration behavior
    // -----------------------------------------------------------------------

    #[test]
    fn valid_config_checks_conflicting_tasks_once_per_member() {
        let manager = StubManager::with_stores([plain("a"), plain("b"), plain("c")]);
        assert!(messages(&manager, &StubUtil::default(), &group_config("g", &["a", "b", "c"])).is_empty());
        assert_eq!(manager.conflict_checks(), ["a", "b", "c"]);
    }

    #[test]
    fn collects_every_violation_by_default() {
        let mut manager = StubManager::with_stores([plain("a"), plain("b")]);
        manager.conflicting.insert("a".into());
        manager.parents.insert("b".into(), "other".into());
        let found = messages(&manager, &StubUtil::default(), &group_config("g", &["a", "b", "g"]));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn fail_fast_reports_first_violation_only() {
        let mut manager = StubManager::with_stores([plain("a"), plain("b")]);
        manager.conflicting.insert("a".into());
        manager.parents.insert("b".into(), "other".into());
        let util = StubUtil::default();
        let quota = StubQuota::violating(&[]);
        let err = BlobStoreGroupDescriptor::new(&manager, &util, &quota)
            .with_mode(ValidationMode::FailFast)
            .validate_config(&group_config("g", &["a", "b"]))
            .unwrap_err();
        let errors = err.violations().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains(ViolationKind::ConflictingTasks));
    }

    #[test]
    fn non_group_configuration_is_rejected() {
        let manager = StubManager::default();
        let util = StubUtil::default();
        let quota = StubQuota::violating(&[]);
        let err = BlobStoreGroupDescriptor::new(&manager, &util, &quota)
            .validate_config(&BlobStoreConfiguration::new("plain", "Memory"))
            .unwrap_err();
        assert!(matches!(err, GroupError::NotAGroup(_)));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn sanitize_trims_dedupes_and_defaults_policy() {
        let mut config = GroupConfig::new(
            vec![" a ".into(), "".into(), "b".into(), "a".into()],
            "  ",
        )
        .to_configuration("g");
        BlobStoreGroupDescriptor::sanitize_config(&mut config).unwrap();
        let group = GroupConfig::from_configuration(&config).unwrap();
        assert_eq!(group.members, ["a", "b"]);
        assert_eq!(group.fill_policy, FALLBACK_FILL_POLICY);
    }

    #[test]
    fn dependency_lookup() {
        let config = group_config("g", &["a", "b"]);
        assert!(BlobStoreGroupDescriptor::config_has_dependency_on(&config, "a"));
        assert!(!BlobStoreGroupDescriptor::config_has_dependency_on(&config, "c"));
        let plain = BlobStoreConfiguration::new("a", "Memory");
        assert!(!BlobStoreGroupDescriptor::config_has_dependency_on(&plain, "a"));
    }
}

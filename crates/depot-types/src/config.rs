use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Store type name of a blob store group.
pub const GROUP_TYPE: &str = "Group";

/// Attribute section holding group settings.
pub const GROUP_SECTION: &str = "group";

/// Key of the ordered member-name list inside [`GROUP_SECTION`].
pub const MEMBERS_KEY: &str = "members";

/// Key of the fill-policy name inside [`GROUP_SECTION`].
pub const FILL_POLICY_KEY: &str = "fillPolicy";

/// Attribute section holding the soft-quota settings of a store.
pub const QUOTA_SECTION: &str = "blobStoreQuotaConfig";

/// Persisted configuration of a blob store.
///
/// Attributes are grouped in named sections, each a string-keyed JSON map,
/// so that store kinds can carry arbitrary settings without a schema change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobStoreConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub store_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, Value>>,
}

impl BlobStoreConfiguration {
    pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_type: store_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns `true` if this configuration describes a group.
    pub fn is_group(&self) -> bool {
        self.store_type == GROUP_TYPE
    }

    /// Look up a single attribute.
    pub fn attribute(&self, section: &str, key: &str) -> Option<&Value> {
        self.attributes.get(section).and_then(|s| s.get(key))
    }

    /// Set a single attribute, creating the section if needed.
    pub fn set_attribute(&mut self, section: &str, key: &str, value: Value) {
        self.attributes
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// A whole attribute section, if present.
    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, Value>> {
        self.attributes.get(section)
    }
}

/// Typed view of the `group` attribute section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Member store names, in declared order.
    pub members: Vec<String>,
    /// Name of the fill policy used to place new writes.
    pub fill_policy: String,
}

impl GroupConfig {
    pub fn new(members: Vec<String>, fill_policy: impl Into<String>) -> Self {
        Self {
            members,
            fill_policy: fill_policy.into(),
        }
    }

    /// Read the group section of `config`.
    ///
    /// A missing member list reads as empty and a missing fill policy as
    /// the empty string; validation reports both later with better context.
    pub fn from_configuration(config: &BlobStoreConfiguration) -> Result<Self, TypeError> {
        let members = match config.attribute(GROUP_SECTION, MEMBERS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        TypeError::InvalidAttribute {
                            section: GROUP_SECTION.into(),
                            key: MEMBERS_KEY.into(),
                            reason: format!("member name is not a string: {item}"),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::String(csv)) => csv
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(other) => {
                return Err(TypeError::InvalidAttribute {
                    section: GROUP_SECTION.into(),
                    key: MEMBERS_KEY.into(),
                    reason: format!("expected a list, got {other}"),
                })
            }
        };

        let fill_policy = match config.attribute(GROUP_SECTION, FILL_POLICY_KEY) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(TypeError::InvalidAttribute {
                    section: GROUP_SECTION.into(),
                    key: FILL_POLICY_KEY.into(),
                    reason: format!("expected a string, got {other}"),
                })
            }
        };

        Ok(Self {
            members,
            fill_policy,
        })
    }

    /// Write this view back into the group section of `config`.
    pub fn apply_to(&self, config: &mut BlobStoreConfiguration) {
        config.set_attribute(
            GROUP_SECTION,
            MEMBERS_KEY,
            Value::Array(self.members.iter().cloned().map(Value::String).collect()),
        );
        config.set_attribute(
            GROUP_SECTION,
            FILL_POLICY_KEY,
            Value::String(self.fill_policy.clone()),
        );
    }

    /// Build a complete group configuration.
    pub fn to_configuration(&self, name: impl Into<String>) -> BlobStoreConfiguration {
        let mut config = BlobStoreConfiguration::new(name, GROUP_TYPE);
        self.apply_to(&mut config);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_config_roundtrips_through_attributes() {
        let group = GroupConfig::new(vec!["a".into(), "b".into()], "roundRobin");
        let config = group.to_configuration("g");
        assert!(config.is_group());
        assert_eq!(GroupConfig::from_configuration(&config).unwrap(), group);
    }

    #[test]
    fn missing_group_section_reads_as_empty() {
        let config = BlobStoreConfiguration::new("g", GROUP_TYPE);
        let group = GroupConfig::from_configuration(&config).unwrap();
        assert!(group.members.is_empty());
        assert!(group.fill_policy.is_empty());
    }

    #[test]
    fn comma_separated_members_are_accepted() {
        let mut config = BlobStoreConfiguration::new("g", GROUP_TYPE);
        config.set_attribute(GROUP_SECTION, MEMBERS_KEY, json!("a, b,,c"));
        let group = GroupConfig::from_configuration(&config).unwrap();
        assert_eq!(group.members, vec!["a", "b", "c"]);
    }

    #[test]
    fn non_string_member_is_rejected() {
        let mut config = BlobStoreConfiguration::new("g", GROUP_TYPE);
        config.set_attribute(GROUP_SECTION, MEMBERS_KEY, json!(["a", 3]));
        assert!(matches!(
            GroupConfig::from_configuration(&config),
            Err(TypeError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn serde_uses_type_key() {
        let config = BlobStoreConfiguration::new("s", "File");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "File");
    }
}

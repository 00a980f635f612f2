use std::fmt;

use depot_store::StoreError;
use depot_types::TypeError;

/// Which group-configuration rule a [`Violation`] broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    EmptyMembers,
    ContainsItself,
    MissingMember,
    NestedGroup,
    ConflictingTasks,
    AlreadyGrouped,
    RepositoryStorage,
    MemberRemoval,
    Quota,
}

/// One violated rule, naming the offending store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// The store the message is about (a member, or the group itself).
    pub store: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(store: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Every rule violation found while validating one configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.message.as_str())
    }

    /// Returns `true` if any violation is of `kind`.
    pub fn contains(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&violation.message)?;
        }
        Ok(())
    }
}

/// Errors from group construction, validation and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    /// The configuration broke one or more group rules.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// A member store named in the configuration is not registered.
    #[error("Blob Store '{member}' listed in group '{group}' does not exist")]
    MissingMember { group: String, member: String },

    /// The configuration is not of group type.
    #[error("Blob Store '{0}' is not a group")]
    NotAGroup(String),

    /// A store with this name is already registered.
    #[error("Blob Store '{0}' already exists")]
    AlreadyExists(String),

    /// The store is still referenced and cannot be removed.
    #[error("Blob Store '{name}' is in use by {usage}")]
    InUse { name: String, usage: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration attributes could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] TypeError),
}

impl GroupError {
    /// The validation report, if this is a validation failure.
    pub fn violations(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Result alias for group operations.
pub type GroupResult<T> = Result<T, GroupError>;

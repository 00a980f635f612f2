use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Prefix marking a temporary blob. Temporary blobs are never reconciled.
pub const TEMPORARY_BLOB_ID_PREFIX: &str = "tmp$";

/// `strftime` pattern of the date-based layout directory of a blob.
pub const DATE_PATH_FORMAT: &str = "%Y/%m/%d/%H/%M";

/// Opaque identifier of a blob within a store.
///
/// A `BlobId` may carry a blob-created reference. Blobs with a reference are
/// stored under the date-based layout (`yyyy/MM/dd/HH/mm/<id>`); blobs
/// without one use the legacy volume/chapter layout. Identity, ordering and
/// hashing only consider the unique string.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlobId {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blob_created_ref: Option<NaiveDateTime>,
}

impl BlobId {
    /// Wrap an existing unique string (legacy layout).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            blob_created_ref: None,
        }
    }

    /// Wrap an existing unique string created at `created` (date-based layout).
    pub fn with_created_ref(id: impl Into<String>, created: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            blob_created_ref: Some(created),
        }
    }

    /// Generate a fresh legacy-layout identifier.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::now_v7().to_string())
    }

    /// Generate a fresh date-based identifier created at `created`.
    pub fn generate_date_based(created: NaiveDateTime) -> Self {
        Self::with_created_ref(uuid::Uuid::now_v7().to_string(), created)
    }

    /// Generate a fresh temporary identifier (prefixed with `tmp$`).
    pub fn generate_temporary() -> Self {
        Self::new(format!(
            "{TEMPORARY_BLOB_ID_PREFIX}{}",
            uuid::Uuid::now_v7()
        ))
    }

    /// The unique string of this identifier.
    pub fn as_unique_string(&self) -> &str {
        &self.id
    }

    /// Returns `true` if this identifier names a temporary blob.
    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMPORARY_BLOB_ID_PREFIX)
    }

    /// The creation reference, if the blob uses the date-based layout.
    pub fn blob_created_ref(&self) -> Option<NaiveDateTime> {
        self.blob_created_ref
    }

    /// Returns `true` if the blob is stored under the date-based layout.
    pub fn is_date_based(&self) -> bool {
        self.blob_created_ref.is_some()
    }

    /// Directory of the blob under the date-based layout, e.g. `2021/04/13/09/05`.
    pub fn date_path(&self) -> Option<String> {
        self.blob_created_ref
            .map(|created| created.format(DATE_PATH_FORMAT).to_string())
    }
}

impl PartialEq for BlobId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BlobId {}

impl Hash for BlobId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for BlobId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.blob_created_ref {
            Some(created) => write!(f, "BlobId({}@{})", self.id, created),
            None => write!(f, "BlobId({})", self.id),
        }
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for BlobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BlobId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

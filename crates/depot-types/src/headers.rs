//! Well-known blob headers.
//!
//! Headers travel with every write. Stores persist them next to the blob
//! content for disaster recovery; the coordination layer only reads a few
//! of them (temporary marker, blob name).

use std::collections::BTreeMap;

/// Ordered header map attached to a blob.
pub type Headers = BTreeMap<String, String>;

/// Logical name of the blob (usually the repository path).
pub const BLOB_NAME_HEADER: &str = "BlobStore.blob-name";

/// Principal that created the blob.
pub const CREATED_BY_HEADER: &str = "BlobStore.created-by";

/// Address of the principal that created the blob.
pub const CREATED_BY_IP_HEADER: &str = "BlobStore.created-by-ip";

/// Informational content type.
pub const CONTENT_TYPE_HEADER: &str = "BlobStore.content-type";

/// Presence marks a temporary blob, which receives a `tmp$` identifier.
pub const TEMPORARY_BLOB_HEADER: &str = "BlobStore.temporary-blob";

/// `"true"` requests a direct-path blob addressed by its blob name.
pub const DIRECT_PATH_BLOB_HEADER: &str = "BlobStore.direct-path";

/// Returns `true` if the headers mark a temporary blob.
pub fn is_temporary(headers: &Headers) -> bool {
    headers.contains_key(TEMPORARY_BLOB_HEADER)
}

/// Returns `true` if the headers request a direct-path blob.
pub fn is_direct_path(headers: &Headers) -> bool {
    headers
        .get(DIRECT_PATH_BLOB_HEADER)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Build a header map from string pairs.
pub fn headers<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Headers {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

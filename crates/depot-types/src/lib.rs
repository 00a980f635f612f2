//! Foundation types for depot.
//!
//! This crate provides the identifiers, value types, and configuration
//! shapes shared by every other depot crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`BlobId`] -- Opaque blob identifier, optionally carrying a creation
//!   reference that places the blob under the date-based layout
//! - [`Blob`] -- Immutable content plus headers and metrics
//! - [`Headers`] -- Ordered string map attached to every blob write
//! - [`ContentHash`] -- Hex content digest supplied with file-based creates
//! - [`BlobStoreConfiguration`] -- Name, type, and nested attribute map of a store
//! - [`GroupConfig`] -- Typed view of a group's member list and fill policy
//! - [`QuotaResult`] -- Advisory quota verdict for a single store

pub mod blob;
pub mod blob_id;
pub mod config;
pub mod error;
pub mod headers;
pub mod quota;

pub use blob::{Blob, BlobMetrics, ContentHash};
pub use blob_id::{BlobId, DATE_PATH_FORMAT, TEMPORARY_BLOB_ID_PREFIX};
pub use config::{BlobStoreConfiguration, GroupConfig, GROUP_TYPE};
pub use error::TypeError;
pub use headers::Headers;
pub use quota::QuotaResult;

use std::sync::Arc;

use depot_store::BlobStore;
use depot_types::Headers;

/// Sends every write to the first available, writable member in declared
/// order. Stateless.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteToFirstMemberFillPolicy;

impl WriteToFirstMemberFillPolicy {
    pub fn choose_from(
        &self,
        members: &[Arc<dyn BlobStore>],
        _headers: &Headers,
    ) -> Option<Arc<dyn BlobStore>> {
        members
            .iter()
            .find(|m| m.is_storage_available() && m.is_writable())
            .cloned()
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Advisory verdict of a soft-quota check on one store.
///
/// Quota services return `None` when a store has no quota configured;
/// callers treat that the same as a non-violating result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResult {
    pub violation: bool,
    pub blob_store_name: String,
    pub message: String,
}

impl QuotaResult {
    pub fn ok(blob_store_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation: false,
            blob_store_name: blob_store_name.into(),
            message: message.into(),
        }
    }

    pub fn violation(blob_store_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation: true,
            blob_store_name: blob_store_name.into(),
            message: message.into(),
        }
    }

    pub fn is_violation(&self) -> bool {
        self.violation
    }
}

impl fmt::Display for QuotaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.violation { "violation" } else { "ok" };
        write!(f, "{} [{verdict}]: {}", self.blob_store_name, self.message)
    }
}

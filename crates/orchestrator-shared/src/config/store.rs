//! Request Store configuration (spec §4.3, §6 request-store connection string).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection string for the production document-store backend.
    /// Empty string selects the in-memory reference implementation, which
    /// is also what every test in this workspace runs against.
    pub connection_string: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn uses_in_memory(&self) -> bool {
        self.connection_string.is_empty()
    }
}

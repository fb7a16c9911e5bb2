//! `[registry]` section configuration.
//!
//! ```toml
//! [registry]
//! max_modules = 4096          # 0 = unbounded
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of modules kept in the registry.
    pub max_modules: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_modules: 4096 }
    }
}

impl RegistryConfig {
    /// Capacity bound, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        (self.max_modules > 0).then_some(self.max_modules)
    }
}

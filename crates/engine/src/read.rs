//! Read path: `get()`.
//!
//! A lookup checks the active memtable first (freshest data), then falls
//! through to the levels in ascending order (L0, which may hold
//! overlapping segments and is checked newest-first, then each keyed level
//! in turn). The first hit wins; there is no tombstone to shadow it with,
//! since deletion is out of scope.

use crate::{Engine, EngineError};

impl Engine {
    /// Looks up `key`, returning its current value if present.
    pub fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        {
            let state = self.state.lock().expect("write state lock poisoned");
            if let Some(value) = state.memtable.get(key) {
                return Ok(Some(value.to_string()));
            }
        }
        Ok(self.levels.get(key)?)
    }
}

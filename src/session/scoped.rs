//! Scoped state table.
//!
//! Each entry pairs the params a method is called with when monitoring
//! starts and the params that restore the default once it ends.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// ScopedState
// ============================================================================

/// Activation and restoration params of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedState {
    /// Params applied when monitoring starts.
    pub params: Value,
    /// Params applied when monitoring ends.
    pub default_params: Value,
}

// ============================================================================
// ScopedStateTable
// ============================================================================

/// Scoped state entries in registration order.
#[derive(Debug, Default)]
pub(crate) struct ScopedStateTable {
    entries: Vec<(String, ScopedState)>,
}

impl ScopedStateTable {
    /// Records a method's scoped state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScopedStateConflict`] if `method` is already
    /// registered with different params.
    pub(crate) fn insert(&mut self, method: &str, state: ScopedState) -> Result<()> {
        match self.entries.iter().find(|(m, _)| m == method) {
            Some((_, existing)) if *existing == state => Ok(()),
            Some(_) => Err(Error::scoped_state_conflict(method)),
            None => {
                self.entries.push((method.to_string(), state));
                Ok(())
            }
        }
    }

    /// Returns `(method, params)` pairs applied at start.
    pub(crate) fn activations(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(m, s)| (m.clone(), s.params.clone()))
            .collect()
    }

    /// Returns `(method, default_params)` pairs applied at the end.
    pub(crate) fn restorations(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(m, s)| (m.clone(), s.default_params.clone()))
            .collect()
    }

    /// Returns the entry of `method`.
    pub(crate) fn get(&self, method: &str) -> Option<&ScopedState> {
        self.entries.iter().find(|(m, _)| m == method).map(|(_, s)| s)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn throttling(latency: u32) -> ScopedState {
        ScopedState {
            params: json!({"offline": false, "latency": latency}),
            default_params: json!({"offline": false, "latency": 0}),
        }
    }

    #[test]
    fn test_identical_registration_is_accepted() {
        let mut table = ScopedStateTable::default();
        table
            .insert("Network.emulateNetworkConditions", throttling(100))
            .expect("first");
        table
            .insert("Network.emulateNetworkConditions", throttling(100))
            .expect("same again");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_conflicting_registration_fails() {
        let mut table = ScopedStateTable::default();
        table
            .insert("Network.emulateNetworkConditions", throttling(100))
            .expect("first");

        let err = table
            .insert("Network.emulateNetworkConditions", throttling(200))
            .expect_err("conflict");
        assert!(matches!(err, Error::ScopedStateConflict { .. }));
        assert_eq!(
            table.get("Network.emulateNetworkConditions"),
            Some(&throttling(100))
        );
    }

    #[test]
    fn test_activations_and_restorations_keep_order() {
        let mut table = ScopedStateTable::default();
        table
            .insert("Page.setTouchEmulationEnabled", ScopedState {
                params: json!({"enabled": true}),
                default_params: json!({"enabled": false}),
            })
            .expect("insert");
        table
            .insert("Network.emulateNetworkConditions", throttling(40))
            .expect("insert");

        let activations = table.activations();
        assert_eq!(activations[0].0, "Page.setTouchEmulationEnabled");
        assert_eq!(activations[0].1, json!({"enabled": true}));

        let restorations = table.restorations();
        assert_eq!(restorations[1].1, json!({"offline": false, "latency": 0}));

        table.clear();
        assert_eq!(table.len(), 0);
    }
}

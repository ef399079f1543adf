//! Module state store: an arena of per-module scalar state.
//!
//! Modules are inserted once at load time and live for the lifetime of the
//! engine. They are kept in insertion order in a `Vec`, with a
//! `BTreeMap<ModuleId, usize>` index for lookups, so iteration order is the
//! load order on every run.
//!
//! The store does not enforce who writes which field; by convention the
//! integrator owns `excitation`/`tension` and the policy engine owns
//! `resilience`/`damping`/`integrity`.

use std::collections::BTreeMap;

use cascade_types::{ModuleId, ModuleState};
use rust_decimal::Decimal;

use crate::error::NetworkError;

/// Arena of module states addressed by [`ModuleId`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModuleStore {
    /// Module states in load order.
    modules: Vec<ModuleState>,
    /// Module id -> position in `modules`.
    index: BTreeMap<ModuleId, usize>,
}

impl ModuleStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            modules: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Add a module to the store.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::DuplicateModule`] if the id is already present.
    pub fn insert(&mut self, state: ModuleState) -> Result<(), NetworkError> {
        if self.index.contains_key(&state.id) {
            return Err(NetworkError::DuplicateModule(state.id));
        }
        let position = self.modules.len();
        self.index.insert(state.id.clone(), position);
        self.modules.push(state);
        Ok(())
    }

    /// Get a module's state.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn get(&self, id: &ModuleId) -> Result<&ModuleState, NetworkError> {
        self.index
            .get(id)
            .and_then(|&pos| self.modules.get(pos))
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &ModuleId) -> Result<&mut ModuleState, NetworkError> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))?;
        self.modules
            .get_mut(pos)
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))
    }

    /// Whether a module with this id exists.
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.index.contains_key(id)
    }

    /// Set a module's excitation.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn set_excitation(&mut self, id: &ModuleId, value: f64) -> Result<(), NetworkError> {
        self.get_mut(id)?.excitation = value;
        Ok(())
    }

    /// Add `delta` to a module's excitation and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn add_excitation(&mut self, id: &ModuleId, delta: f64) -> Result<f64, NetworkError> {
        let module = self.get_mut(id)?;
        module.excitation += delta;
        Ok(module.excitation)
    }

    /// Set a module's tension.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn set_tension(&mut self, id: &ModuleId, value: f64) -> Result<(), NetworkError> {
        self.get_mut(id)?.tension = value;
        Ok(())
    }

    /// Set a module's resilience, floored at zero.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn set_resilience(&mut self, id: &ModuleId, value: f64) -> Result<(), NetworkError> {
        self.get_mut(id)?.resilience = value.max(0.0);
        Ok(())
    }

    /// Set a module's runtime damping gain.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn set_damping(&mut self, id: &ModuleId, value: f64) -> Result<(), NetworkError> {
        self.get_mut(id)?.damping = value;
        Ok(())
    }

    /// Replace a module's integrity budget.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown id.
    pub fn set_integrity(&mut self, id: &ModuleId, value: Decimal) -> Result<(), NetworkError> {
        self.get_mut(id)?.integrity = Some(value);
        Ok(())
    }

    /// Number of modules in the store.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module ids in load order.
    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|m| m.id.clone()).collect()
    }

    /// Iterate over module states in load order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleState> {
        self.modules.iter()
    }

    /// All module states in load order.
    pub fn states(&self) -> &[ModuleState] {
        &self.modules
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{Coefficients, TensionKind};
    use rust_decimal_macros::dec;

    use super::*;

    fn module(name: &str) -> ModuleState {
        ModuleState::new(
            ModuleId::from(name),
            TensionKind::Instantaneous,
            0.1,
            0.8,
            Coefficients::new(0.0, 3.5, 0.8),
        )
    }

    fn store() -> ModuleStore {
        let mut store = ModuleStore::new();
        store.insert(module("urban")).unwrap();
        store.insert(module("social")).unwrap();
        store.insert(module("finance")).unwrap();
        store
    }

    #[test]
    fn preserves_load_order() {
        let store = store();
        let names: Vec<String> = store.ids().into_iter().map(ModuleId::into_inner).collect();
        assert_eq!(names, vec!["urban", "social", "finance"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn rejects_duplicates() {
        let mut store = store();
        let result = store.insert(module("social"));
        assert!(matches!(result, Err(NetworkError::DuplicateModule(_))));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let mut store = store();
        let ghost = ModuleId::from("ghost");
        assert!(matches!(store.get(&ghost), Err(NetworkError::ModuleNotFound(_))));
        assert!(store.set_excitation(&ghost, 1.0).is_err());
        assert!(store.set_tension(&ghost, 1.0).is_err());
        assert!(store.set_resilience(&ghost, 1.0).is_err());
    }

    #[test]
    fn setters_update_fields() {
        let mut store = store();
        let id = ModuleId::from("social");
        store.set_excitation(&id, 0.45).unwrap();
        store.set_tension(&id, 1.2).unwrap();
        store.set_resilience(&id, -3.0).unwrap();
        store.set_integrity(&id, dec!(0.5)).unwrap();
        let after = store.add_excitation(&id, 0.05).unwrap();

        let m = store.get(&id).unwrap();
        assert!((after - 0.5).abs() < 1e-12);
        assert!((m.tension - 1.2).abs() < 1e-12);
        assert!(m.resilience.abs() < f64::EPSILON);
        assert_eq!(m.integrity, Some(dec!(0.5)));
    }
}

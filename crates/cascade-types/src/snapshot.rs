//! The immutable per-tick snapshot handed to policy rules and history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::actions::PolicyAction;
use crate::enums::Phase;
use crate::ids::{DomainId, ModuleId};
use crate::structs::{EdgeState, ModuleState};

/// Immutable record of one tick.
///
/// Built once the integrator and phase controllers have run, then evaluated
/// by the policy engine. The policy engine's actions are attached before the
/// snapshot is committed; after that it is never mutated. Module and edge
/// order follow load order, so two runs of the same configuration produce
/// identical snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick number (0 is the state at load time).
    pub tick: u64,
    /// Erosion factor applied to resilience during this tick.
    pub erosion_factor: f64,
    /// Module states in load order.
    pub modules: Vec<ModuleState>,
    /// Edge states in load order, as used for this tick's propagation.
    pub edges: Vec<EdgeState>,
    /// Phase of every control domain after this tick.
    pub phases: BTreeMap<DomainId, Phase>,
    /// Actions taken while processing this tick.
    pub actions: Vec<PolicyAction>,
}

impl Snapshot {
    /// Look up a module's state by id.
    pub fn module(&self, id: &ModuleId) -> Option<&ModuleState> {
        self.modules.iter().find(|m| &m.id == id)
    }

    /// A module's tension, if the module exists.
    pub fn tension(&self, id: &ModuleId) -> Option<f64> {
        self.module(id).map(|m| m.tension)
    }

    /// Look up an edge by its endpoints.
    pub fn edge(&self, source: &ModuleId, target: &ModuleId) -> Option<&EdgeState> {
        self.edges
            .iter()
            .find(|e| &e.source == source && &e.target == target)
    }

    /// The phase of a control domain.
    pub fn phase(&self, domain: &DomainId) -> Option<Phase> {
        self.phases.get(domain).copied()
    }

    /// The largest tension across all modules (0 when there are none).
    pub fn max_tension(&self) -> f64 {
        self.modules
            .iter()
            .map(|m| m.tension)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
            .unwrap_or(0.0)
    }
}

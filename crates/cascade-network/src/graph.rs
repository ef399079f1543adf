//! Coupling graph: weighted directed edges from module to module.
//!
//! The [`CouplingGraph`] holds every [`EdgeState`] declared at load time.
//! The edge set never changes afterwards; only weights, bypass weights and
//! breaker flags do. Edges are stored in declaration order and an outbound
//! adjacency map (`BTreeMap<ModuleId, Vec<usize>>`) indexes them per source,
//! so neighbor iteration is identical on every run.

use std::collections::BTreeMap;

use cascade_types::{EdgeKey, EdgeState, ModuleId};

use crate::error::NetworkError;
use crate::store::ModuleStore;

/// Fixed-topology directed graph of coupling edges.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CouplingGraph {
    /// All edges in declaration order.
    edges: Vec<EdgeState>,
    /// `(source, target)` -> position in `edges`.
    index: BTreeMap<EdgeKey, usize>,
    /// Outbound adjacency: source -> positions of edges departing from it.
    outbound: BTreeMap<ModuleId, Vec<usize>>,
}

impl CouplingGraph {
    /// Create an empty graph.
    pub const fn new() -> Self {
        Self {
            edges: Vec::new(),
            index: BTreeMap::new(),
            outbound: BTreeMap::new(),
        }
    }

    /// Declare an edge. Both endpoints must already exist in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::DanglingEdge`] if an endpoint is unknown, or
    /// [`NetworkError::DuplicateEdge`] if the pair was already declared.
    pub fn add_edge(&mut self, store: &ModuleStore, edge: EdgeState) -> Result<(), NetworkError> {
        for endpoint in [&edge.source, &edge.target] {
            if !store.contains(endpoint) {
                return Err(NetworkError::DanglingEdge {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        let key = edge.key();
        if self.index.contains_key(&key) {
            return Err(NetworkError::DuplicateEdge {
                from: key.source,
                to: key.target,
            });
        }

        let position = self.edges.len();
        self.outbound
            .entry(edge.source.clone())
            .or_default()
            .push(position);
        self.index.insert(key, position);
        self.edges.push(edge);
        Ok(())
    }

    fn position(&self, from: &ModuleId, to: &ModuleId) -> Result<usize, NetworkError> {
        self.index
            .get(&EdgeKey::new(from.clone(), to.clone()))
            .copied()
            .ok_or_else(|| NetworkError::EdgeNotFound {
                from: from.clone(),
                to: to.clone(),
            })
    }

    fn edge_mut(&mut self, from: &ModuleId, to: &ModuleId) -> Result<&mut EdgeState, NetworkError> {
        let pos = self.position(from, to)?;
        self.edges
            .get_mut(pos)
            .ok_or_else(|| NetworkError::EdgeNotFound {
                from: from.clone(),
                to: to.clone(),
            })
    }

    /// Get an edge by its endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EdgeNotFound`] if no such edge was declared.
    pub fn edge(&self, from: &ModuleId, to: &ModuleId) -> Result<&EdgeState, NetworkError> {
        let pos = self.position(from, to)?;
        self.edges.get(pos).ok_or_else(|| NetworkError::EdgeNotFound {
            from: from.clone(),
            to: to.clone(),
        })
    }

    /// Whether an edge with these endpoints exists.
    pub fn contains(&self, from: &ModuleId, to: &ModuleId) -> bool {
        self.position(from, to).is_ok()
    }

    /// Outbound `(target, weight)` pairs of a module, in declaration order.
    ///
    /// Includes breaker-tripped edges; callers that propagate check
    /// [`breaker_state`](Self::breaker_state).
    pub fn neighbors_out(&self, id: &ModuleId) -> Vec<(ModuleId, f64)> {
        self.outbound_edges(id)
            .map(|e| (e.target.clone(), e.weight))
            .collect()
    }

    fn outbound_edges(&self, id: &ModuleId) -> impl Iterator<Item = &EdgeState> {
        self.outbound
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|&pos| self.edges.get(pos))
    }

    /// Set an edge's propagation weight, clamped to `>= 0`. Returns the
    /// previous weight.
    ///
    /// A NaN weight is treated as zero (fully decoupled).
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EdgeNotFound`] if no such edge was declared.
    pub fn set_weight(&mut self, from: &ModuleId, to: &ModuleId, weight: f64) -> Result<f64, NetworkError> {
        let edge = self.edge_mut(from, to)?;
        let previous = edge.weight;
        edge.weight = if weight.is_nan() { 0.0 } else { weight.max(0.0) };
        Ok(previous)
    }

    /// Whether the edge's breaker is tripped.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EdgeNotFound`] if no such edge was declared.
    pub fn breaker_state(&self, from: &ModuleId, to: &ModuleId) -> Result<bool, NetworkError> {
        Ok(self.edge(from, to)?.breaker_active)
    }

    /// Trip or reset an edge's breaker. The weight is left untouched.
    /// Returns the previous breaker state.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EdgeNotFound`] if no such edge was declared.
    pub fn set_breaker(&mut self, from: &ModuleId, to: &ModuleId, active: bool) -> Result<bool, NetworkError> {
        let edge = self.edge_mut(from, to)?;
        let previous = edge.breaker_active;
        edge.breaker_active = active;
        Ok(previous)
    }

    /// Give an edge a bypass weight, which becomes its reference weight
    /// from now on.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::EdgeNotFound`] if no such edge was declared.
    pub fn set_bypass(&mut self, from: &ModuleId, to: &ModuleId, weight: f64) -> Result<(), NetworkError> {
        let edge = self.edge_mut(from, to)?;
        let weight = if weight.is_nan() { 0.0 } else { weight.max(0.0) };
        edge.bypass_weight = Some(weight);
        Ok(())
    }

    /// Number of declared edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All edges in declaration order.
    pub fn edges(&self) -> &[EdgeState] {
        &self.edges
    }
}

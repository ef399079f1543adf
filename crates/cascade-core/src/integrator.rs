//! Integrator: advances every module's tension for one timestep and
//! propagates it into downstream excitation.
//!
//! Order within a step:
//!
//! 1. Resolve the erosion factor from the erosion source's current state.
//! 2. Recompute every module's tension in load order (the erosion source
//!    uses its uneroded resilience), check it is finite, and clamp it.
//! 3. For every edge whose breaker is closed, add
//!    `T_source * weight` to the target's excitation.
//! 4. Check and clamp every excitation.
//! 5. Decay every module's damping gain, faster for modules whose
//!    integrity budget has been spent down.
//!
//! Any non-finite value aborts the step with
//! [`TickError::NumericDivergence`]. The caller owns rollback.

use std::collections::BTreeMap;

use cascade_network::{CouplingGraph, ModuleStore};
use cascade_types::{EdgeKey, ModuleId, ModuleState, TensionKind};
use rust_decimal::prelude::ToPrimitive;

use crate::config::Bounds;
use crate::engine::TickError;
use crate::erosion::ErosionResolver;

/// Per-step inputs that do not change within a tick.
#[derive(Debug, Clone, Copy)]
pub struct StepParams<'a> {
    /// Tick number being computed (for error reports).
    pub tick: u64,
    /// Timestep.
    pub dt: f64,
    /// Tension clamp.
    pub tension: Bounds,
    /// Excitation clamp.
    pub excitation: Bounds,
    /// FIREWALL damping multipliers for modules in a FIREWALL domain;
    /// absent modules use `1.0`.
    pub multipliers: &'a BTreeMap<ModuleId, f64>,
    /// Base per-tick damping decay rate.
    pub damping_decay: f64,
}

/// What a step did, for logging and inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Erosion factor applied this step.
    pub erosion_factor: f64,
    /// Excitation injected along each active edge, in edge order.
    pub injections: Vec<(EdgeKey, f64)>,
}

/// New tension for one module.
///
/// Instantaneous: `beta*E - damping*F*erosion`.
/// Relaxation: `T + (beta*E - multiplier*damping*T) * dt`.
pub fn next_tension(module: &ModuleState, erosion_factor: f64, multiplier: f64, dt: f64) -> f64 {
    let beta = module.coefficients.beta;
    match module.kind {
        TensionKind::Instantaneous => module.instantaneous_tension(erosion_factor),
        TensionKind::Relaxation => {
            let drive = beta.mul_add(
                module.excitation,
                -(multiplier * module.damping * module.tension),
            );
            drive.mul_add(dt, module.tension)
        }
    }
}

/// Damping after one tick of decay:
/// `damping * (1 - rate * (2 - integrity))`.
///
/// Integrity is clamped to `[0, 1]`; a module without a budget counts as
/// fully intact.
pub fn decayed_damping(module: &ModuleState, rate: f64) -> f64 {
    let integrity = module
        .integrity
        .and_then(|i| i.to_f64())
        .map_or(1.0, |i| i.clamp(0.0, 1.0));
    module.damping * rate.mul_add(integrity - 2.0, 1.0)
}

/// Advance `store` by one step over `graph`.
///
/// # Errors
///
/// Returns [`TickError::NumericDivergence`] on NaN/Inf, or
/// [`TickError::NotFound`] if the erosion source or an edge endpoint is
/// missing from the store.
pub fn step(
    store: &mut ModuleStore,
    graph: &CouplingGraph,
    erosion: &ErosionResolver,
    params: &StepParams<'_>,
) -> Result<StepReport, TickError> {
    if let Some(source) = erosion.source() {
        if let Some(t) = erosion.source_tension(store)? {
            check(params.tick, source, "erosion source tension", t)?;
        }
    }
    let erosion_factor = erosion.erosion_factor(store)?;

    let mut tensions = Vec::with_capacity(store.len());
    for module in store.iter() {
        let factor = if erosion.is_source(&module.id) {
            1.0
        } else {
            erosion_factor
        };
        let multiplier = params.multipliers.get(&module.id).copied().unwrap_or(1.0);
        let t = next_tension(module, factor, multiplier, params.dt);
        check(params.tick, &module.id, "tension", t)?;
        tensions.push((module.id.clone(), params.tension.clamp(t)));
    }
    for (id, t) in &tensions {
        store.set_tension(id, *t)?;
    }

    let mut injections = Vec::new();
    for edge in graph.edges().iter().filter(|e| e.is_active()) {
        let delta = store.get(&edge.source)?.tension * edge.weight;
        check(params.tick, &edge.target, "excitation", delta)?;
        store.add_excitation(&edge.target, delta)?;
        injections.push((edge.key(), delta));
    }

    let ids = store.ids();
    for id in &ids {
        let e = store.get(id)?.excitation;
        check(params.tick, id, "excitation", e)?;
        store.set_excitation(id, params.excitation.clamp(e))?;
    }

    if params.damping_decay > 0.0 {
        for id in &ids {
            let damping = decayed_damping(store.get(id)?, params.damping_decay);
            check(params.tick, id, "damping", damping)?;
            store.set_damping(id, damping)?;
        }
    }

    Ok(StepReport {
        erosion_factor,
        injections,
    })
}

/// Fail with `NumericDivergence` unless `value` is finite.
pub(crate) fn check(tick: u64, module: &ModuleId, quantity: &'static str, value: f64) -> Result<(), TickError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TickError::NumericDivergence {
            tick,
            module: module.clone(),
            quantity,
            value,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{Coefficients, EdgeState};

    use super::*;

    fn id(name: &str) -> ModuleId {
        ModuleId::from(name)
    }

    fn params(multipliers: &BTreeMap<ModuleId, f64>) -> StepParams<'_> {
        StepParams {
            tick: 1,
            dt: 0.05,
            tension: Bounds::new(0.0, 5.0),
            excitation: Bounds::new(0.0, 10.0),
            multipliers,
            damping_decay: 0.0,
        }
    }

    fn pair() -> (ModuleStore, CouplingGraph) {
        let mut store = ModuleStore::new();
        store
            .insert(ModuleState::new(
                id("a"),
                TensionKind::Relaxation,
                0.6,
                0.8,
                Coefficients::new(0.0, 3.5, 0.8),
            ))
            .unwrap();
        store
            .insert(ModuleState::new(
                id("b"),
                TensionKind::Instantaneous,
                0.1,
                0.5,
                Coefficients::new(0.0, 1.0, 0.4),
            ))
            .unwrap();
        let mut graph = CouplingGraph::new();
        graph
            .add_edge(&store, EdgeState::new(id("a"), id("b"), 0.05))
            .unwrap();
        (store, graph)
    }

    #[test]
    fn relaxation_follows_euler_step() {
        let (mut store, graph) = pair();
        let none = BTreeMap::new();
        step(&mut store, &graph, &ErosionResolver::disabled(), &params(&none)).unwrap();
        // T = 0 + (3.5 * 0.6 - 0.8 * 0) * 0.05
        let t = store.get(&id("a")).unwrap().tension;
        assert!((t - 0.105).abs() < 1e-12);
    }

    #[test]
    fn instantaneous_uses_eroded_resilience() {
        let m = ModuleState::new(
            id("x"),
            TensionKind::Instantaneous,
            1.0,
            1.0,
            Coefficients::new(0.0, 2.0, 1.0),
        );
        assert!((next_tension(&m, 1.0, 1.0, 0.05) - 1.0).abs() < 1e-12);
        assert!((next_tension(&m, 0.5, 1.0, 0.05) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn firewall_multiplier_damps_relaxation() {
        let mut m = ModuleState::new(
            id("x"),
            TensionKind::Relaxation,
            0.0,
            1.0,
            Coefficients::new(0.0, 1.0, 1.0),
        );
        m.tension = 2.0;
        let normal = next_tension(&m, 1.0, 1.0, 0.1);
        let firewall = next_tension(&m, 1.0, 3.0, 0.1);
        assert!(firewall < normal);
        assert!((firewall - 1.4).abs() < 1e-12);
    }

    #[test]
    fn propagates_new_source_tension() {
        let (mut store, graph) = pair();
        let none = BTreeMap::new();
        let report = step(&mut store, &graph, &ErosionResolver::disabled(), &params(&none)).unwrap();
        let t_a = store.get(&id("a")).unwrap().tension;
        let (_, delta) = report.injections.first().unwrap();
        assert!((delta - t_a * 0.05).abs() < 1e-15);
        let e_b = store.get(&id("b")).unwrap().excitation;
        assert!((e_b - (0.1 + t_a * 0.05)).abs() < 1e-15);
    }

    #[test]
    fn tripped_edge_does_not_propagate() {
        let (mut store, mut graph) = pair();
        graph.set_breaker(&id("a"), &id("b"), true).unwrap();
        let none = BTreeMap::new();
        let report = step(&mut store, &graph, &ErosionResolver::disabled(), &params(&none)).unwrap();
        assert!(report.injections.is_empty());
        assert!((store.get(&id("b")).unwrap().excitation - 0.1).abs() < 1e-15);
    }

    #[test]
    fn tension_is_clamped() {
        let (mut store, graph) = pair();
        store.set_excitation(&id("b"), 9.0).unwrap();
        let none = BTreeMap::new();
        let mut p = params(&none);
        p.tension = Bounds::new(0.0, 1.0);
        step(&mut store, &graph, &ErosionResolver::disabled(), &p).unwrap();
        assert!((store.get(&id("b")).unwrap().tension - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nan_aborts_with_divergence() {
        let (mut store, graph) = pair();
        store.set_excitation(&id("b"), f64::NAN).unwrap();
        let none = BTreeMap::new();
        let result = step(&mut store, &graph, &ErosionResolver::disabled(), &params(&none));
        assert!(matches!(
            result,
            Err(TickError::NumericDivergence { ref module, quantity: "tension", .. })
                if module.as_str() == "b"
        ));
    }

    #[test]
    fn erosion_source_is_not_eroded() {
        let mut store = ModuleStore::new();
        for name in ["viral", "finance"] {
            store
                .insert(ModuleState::new(
                    id(name),
                    TensionKind::Instantaneous,
                    1.0,
                    1.0,
                    Coefficients::new(0.0, 1.5, 1.0),
                ))
                .unwrap();
        }
        let graph = CouplingGraph::new();
        let erosion = ErosionResolver::new(Some(id("viral")), 0.1);
        let none = BTreeMap::new();
        let report = step(&mut store, &graph, &erosion, &params(&none)).unwrap();
        // T_src = 1.5 - 1.0 = 0.5 -> factor 0.5
        assert!((report.erosion_factor - 0.5).abs() < 1e-12);
        assert!((store.get(&id("viral")).unwrap().tension - 0.5).abs() < 1e-12);
        assert!((store.get(&id("finance")).unwrap().tension - 1.0).abs() < 1e-12);
    }

    #[test]
    fn damping_decays_faster_with_spent_integrity() {
        let mut m = ModuleState::new(
            id("x"),
            TensionKind::Relaxation,
            0.0,
            1.0,
            Coefficients::new(0.0, 1.0, 0.8),
        );
        assert!((decayed_damping(&m, 0.01) - 0.8 * 0.99).abs() < 1e-12);
        m.integrity = Some(rust_decimal::Decimal::new(5, 1));
        assert!((decayed_damping(&m, 0.01) - 0.8 * 0.985).abs() < 1e-12);
        assert!((decayed_damping(&m, 0.0) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn step_decays_damping_after_computing_tension() {
        let (mut store, graph) = pair();
        let none = BTreeMap::new();
        let mut p = params(&none);
        p.damping_decay = 0.01;
        step(&mut store, &graph, &ErosionResolver::disabled(), &p).unwrap();
        // b used its undecayed gain: 0.1 - 0.4 * 0.5, clamped to 0
        let b = store.get(&id("b")).unwrap();
        assert!((b.tension - 0.0).abs() < f64::EPSILON);
        assert!((b.damping - 0.4 * 0.99).abs() < 1e-12);
        assert!((store.get(&id("a")).unwrap().damping - 0.8 * 0.99).abs() < 1e-12);
    }
}

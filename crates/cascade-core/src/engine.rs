//! The tick engine: one explicit instance owning the whole network.
//!
//! Each call to [`CascadeEngine::tick`] runs, in order:
//!
//! 1. **Signals** -- add the batch's excitation deltas.
//! 2. **Integrate** -- erosion, tension update, clamp, propagation
//!    ([`integrator::step`]). Modules in a FIREWALL domain (as of the
//!    previous tick) relax with their FIREWALL damping multiplier. Every
//!    module's damping gain then decays a little.
//! 3. **Phase** -- every control domain observes its members' max tension.
//! 4. **Snapshot** -- module states, the edges as used for propagation, and
//!    phases are captured.
//! 5. **Policy** -- rules evaluate that snapshot and mutate the network for
//!    the next tick; their actions are attached to the snapshot.
//!
//! All five steps run on working copies. Only when the whole tick succeeds
//! are the copies committed and the snapshot returned; on error the
//! previous snapshot stays current and nothing changes.
//!
//! [`integrator::step`]: crate::integrator::step

use std::collections::BTreeMap;

use cascade_network::{CouplingGraph, ModuleStore, NetworkError};
use cascade_types::{
    DomainId, EdgeState, InterventionKind, ModuleId, ModuleState, Phase, PolicyAction,
    PolicyEffect, Snapshot,
};
use tracing::{debug, info, warn};

use crate::coefficients::{self, CoefficientProvider};
use crate::config::{Bounds, ConfigError, DomainConfig, InterventionConfig, SimulationConfig};
use crate::erosion::ErosionResolver;
use crate::integrator::{self, StepParams};
use crate::intervention::{self, InterventionOutcome};
use crate::phase::ControlDomain;
use crate::policy::PolicyEngine;
use crate::signal::SignalBatch;

/// Errors that can occur during tick execution or an intervention.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A NaN or infinity appeared mid-tick.
    #[error("numeric divergence at tick {tick}: {module} {quantity} = {value}")]
    NumericDivergence {
        /// Tick being computed.
        tick: u64,
        /// Module where the value appeared.
        module: ModuleId,
        /// Which quantity diverged.
        quantity: &'static str,
        /// The offending value.
        value: f64,
    },

    /// An unknown module or edge was referenced.
    #[error("not found: {source}")]
    NotFound {
        /// The underlying lookup error.
        #[from]
        source: NetworkError,
    },

    /// The timestep is not a positive finite number.
    #[error("invalid timestep {dt}")]
    InvalidTimestep {
        /// The rejected timestep.
        dt: f64,
    },

    /// The tick counter cannot advance further.
    #[error("tick counter overflow")]
    TickOverflow,
}

/// The simulation core.
///
/// Holds the committed module store, coupling graph, control domains, and
/// the snapshot of the last committed tick. Not shared: a driver owns it
/// and calls [`tick`](Self::tick) at whatever cadence it likes.
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    store: ModuleStore,
    graph: CouplingGraph,
    erosion: ErosionResolver,
    domains: Vec<ControlDomain>,
    policy: PolicyEngine,
    tension_bounds: Bounds,
    excitation_bounds: Bounds,
    intervention: InterventionConfig,
    module_multipliers: BTreeMap<ModuleId, f64>,
    tick: u64,
    current: Snapshot,
    pending: Vec<PolicyAction>,
}

impl CascadeEngine {
    /// Build an engine from validated configuration.
    ///
    /// Coefficients come from the module's inline config or `provider`.
    /// Negative gains are accepted, logged, and recorded as
    /// [`PolicyEffect::CoefficientFlagged`] in the tick-0 snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for any invalid value, unresolved
    /// reference, missing coefficients, or duplicate module/edge.
    pub fn from_config(
        config: &SimulationConfig,
        provider: &dyn CoefficientProvider,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut store = ModuleStore::new();
        let mut flagged = Vec::new();
        let mut module_multipliers = BTreeMap::new();
        for module in &config.modules {
            let coefficients = coefficients::resolve(module, provider)?;
            for (name, value) in coefficients.out_of_range() {
                warn!(module = %module.id, coefficient = name, value, "Coefficient out of range");
                flagged.push(PolicyAction::unattributed(PolicyEffect::CoefficientFlagged {
                    module: module.id.clone(),
                    coefficient: name.to_owned(),
                    value,
                }));
            }
            let mut state = ModuleState::new(
                module.id.clone(),
                module.kind,
                module.excitation,
                module.resilience,
                coefficients,
            );
            state.integrity = module.integrity;
            store.insert(state)?;
            if let Some(m) = module.firewall_gamma_multiplier {
                module_multipliers.insert(module.id.clone(), m);
            }
        }

        let mut graph = CouplingGraph::new();
        for edge in &config.edges {
            let mut state = EdgeState::new(edge.source.clone(), edge.target.clone(), edge.base_weight);
            state.breaker_threshold = edge.breaker_threshold;
            graph.add_edge(&store, state)?;
        }

        let domain_configs = if config.domains.is_empty() {
            vec![DomainConfig::global()]
        } else {
            config.domains.clone()
        };
        let mut domains = Vec::with_capacity(domain_configs.len());
        for domain in &domain_configs {
            let members = if domain.modules.is_empty() {
                store.ids()
            } else {
                domain.modules.clone()
            };
            domains.push(ControlDomain::new(
                domain.id.clone(),
                members,
                domain.thresholds(&config.phase)?,
                domain.multiplier(&config.phase),
            ));
        }

        let erosion = ErosionResolver::new(config.erosion.source.clone(), config.erosion.floor);
        let policy = PolicyEngine::from_config(&config.policies, &config.edges, config.clamp.excitation);

        let erosion_factor = erosion.erosion_factor(&store)?;
        let current = Snapshot {
            tick: 0,
            erosion_factor,
            modules: store.states().to_vec(),
            edges: graph.edges().to_vec(),
            phases: phases_of(&domains),
            actions: flagged,
        };

        info!(
            modules = store.len(),
            edges = graph.len(),
            domains = domains.len(),
            rules = policy.rules().len(),
            erosion_source = ?erosion.source().map(ModuleId::as_str),
            "Cascade engine built"
        );

        Ok(Self {
            store,
            graph,
            erosion,
            domains,
            policy,
            tension_bounds: config.clamp.tension,
            excitation_bounds: config.clamp.excitation,
            intervention: config.intervention.clone(),
            module_multipliers,
            tick: 0,
            current,
            pending: Vec::new(),
        })
    }

    /// Advance the simulation by one step of length `dt`.
    ///
    /// `signals` are added to excitation before tension is computed. On
    /// success the new snapshot becomes current and is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] on numeric divergence, an unknown module in
    /// `signals`, an invalid `dt`, or tick overflow. The engine is left
    /// exactly as it was before the call.
    pub fn tick(&mut self, dt: f64, signals: &SignalBatch) -> Result<Snapshot, TickError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(TickError::InvalidTimestep { dt });
        }
        let tick = self.tick.checked_add(1).ok_or(TickError::TickOverflow)?;

        let mut store = self.store.clone();
        let mut graph = self.graph.clone();
        let mut domains = self.domains.clone();

        // 1. Signals
        for (id, delta) in signals.iter() {
            integrator::check(tick, id, "signal", delta)?;
            let e = store.add_excitation(id, delta)?;
            store.set_excitation(id, self.excitation_bounds.clamp(e))?;
        }

        // 2. Integrate
        let multipliers = self.firewall_multipliers(&store);
        let report = integrator::step(
            &mut store,
            &graph,
            &self.erosion,
            &StepParams {
                tick,
                dt,
                tension: self.tension_bounds,
                excitation: self.excitation_bounds,
                multipliers: &multipliers,
                damping_decay: self.intervention.decay_rate,
            },
        )?;

        // 3. Phase
        for domain in &mut domains {
            let (before, after) = domain.observe(&store)?;
            if before != after {
                info!(
                    tick,
                    domain = %domain.id(),
                    from = before.as_str(),
                    to = after.as_str(),
                    "Phase transition"
                );
            }
        }

        // 4. Snapshot
        let mut snapshot = Snapshot {
            tick,
            erosion_factor: report.erosion_factor,
            modules: store.states().to_vec(),
            edges: graph.edges().to_vec(),
            phases: phases_of(&domains),
            actions: Vec::new(),
        };

        // 5. Policy
        let mut actions = self.pending.clone();
        actions.extend(self.policy.apply(&snapshot, &mut store, &mut graph)?);
        for module in store.iter() {
            integrator::check(tick, &module.id, "excitation", module.excitation)?;
            integrator::check(tick, &module.id, "resilience", module.resilience)?;
        }
        snapshot.actions = actions;

        debug!(
            tick,
            erosion_factor = report.erosion_factor,
            max_tension = snapshot.max_tension(),
            injections = report.injections.len(),
            actions = snapshot.actions.len(),
            "Tick complete"
        );

        // Commit
        self.store = store;
        self.graph = graph;
        self.domains = domains;
        self.tick = tick;
        self.pending.clear();
        self.current = snapshot.clone();
        Ok(snapshot)
    }

    /// Apply an operator intervention between ticks.
    ///
    /// Returns `true` if it was applied and `false` if the integrity floor
    /// rejected it (in which case nothing changed).
    ///
    /// # Errors
    ///
    /// Returns [`TickError::NotFound`] for an unknown module.
    pub fn apply_intervention(
        &mut self,
        module: &ModuleId,
        kind: InterventionKind,
    ) -> Result<bool, TickError> {
        Ok(self.intervene(module, kind)?.is_applied())
    }

    /// Like [`apply_intervention`](Self::apply_intervention), returning the
    /// full outcome.
    ///
    /// The outcome is also recorded in the next tick's snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::NotFound`] for an unknown module.
    pub fn intervene(
        &mut self,
        module: &ModuleId,
        kind: InterventionKind,
    ) -> Result<InterventionOutcome, TickError> {
        let outcome = intervention::apply(&mut self.store, module, kind, &self.intervention)?;
        match outcome {
            InterventionOutcome::Applied { integrity } => {
                info!(module = %module, kind = kind.as_str(), integrity = ?integrity, "Intervention applied");
            }
            InterventionOutcome::Rejected {
                integrity,
                cost,
                floor,
            } => {
                warn!(
                    module = %module,
                    kind = kind.as_str(),
                    %integrity,
                    %cost,
                    %floor,
                    "Intervention rejected: integrity floor"
                );
            }
        }
        self.pending
            .push(PolicyAction::unattributed(outcome.effect(module, kind)));
        Ok(outcome)
    }

    /// Damping multipliers for modules in FIREWALL domains.
    ///
    /// A module-level override beats the domain's multiplier; a module in
    /// several FIREWALL domains takes the largest.
    fn firewall_multipliers(&self, store: &ModuleStore) -> BTreeMap<ModuleId, f64> {
        let mut multipliers = BTreeMap::new();
        for domain in self.domains.iter().filter(|d| d.phase().is_firewall()) {
            for member in domain.members() {
                if !store.contains(member) {
                    continue;
                }
                let m = self
                    .module_multipliers
                    .get(member)
                    .copied()
                    .unwrap_or_else(|| domain.gamma_multiplier());
                let entry = multipliers.entry(member.clone()).or_insert(m);
                *entry = entry.max(m);
            }
        }
        multipliers
    }

    /// The last committed snapshot (tick 0 right after construction).
    pub const fn snapshot(&self) -> &Snapshot {
        &self.current
    }

    /// Number of the last committed tick.
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Committed module state.
    pub const fn store(&self) -> &ModuleStore {
        &self.store
    }

    /// Committed coupling graph.
    pub const fn graph(&self) -> &CouplingGraph {
        &self.graph
    }

    /// A module's committed state.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::NotFound`] for an unknown module.
    pub fn module(&self, id: &ModuleId) -> Result<&ModuleState, TickError> {
        Ok(self.store.get(id)?)
    }

    /// Current phase of a control domain.
    pub fn phase(&self, domain: &DomainId) -> Option<Phase> {
        self.domains
            .iter()
            .find(|d| d.id() == domain)
            .map(ControlDomain::phase)
    }

    /// The erosion factor for the committed state.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::NotFound`] if the erosion source is missing.
    pub fn erosion_factor(&self) -> Result<f64, TickError> {
        Ok(self.erosion.erosion_factor(&self.store)?)
    }
}

fn phases_of(domains: &[ControlDomain]) -> BTreeMap<DomainId, Phase> {
    domains
        .iter()
        .map(|d| (d.id().clone(), d.phase()))
        .collect()
}

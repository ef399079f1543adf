//! Adaptive policy engine: ordered `predicate -> action` rules.
//!
//! Each tick the engine evaluates every rule's [`Predicate`] against the
//! same immutable [`Snapshot`], then applies the matching [`Action`]s in
//! declaration order to the working module store and coupling graph. The
//! changes take effect on the *next* tick.
//!
//! Edge weights are never scaled in place. After all rules ran, every
//! edge's weight is recomputed as its reference weight times the product
//! of the load-shed factors that are active this tick, so clearing a
//! load-shed restores the configured weight exactly.

use std::collections::BTreeMap;

use cascade_network::{CouplingGraph, ModuleStore, NetworkError};
use cascade_types::{
    DomainId, EdgeKey, ModuleId, Phase, PolicyAction, PolicyEffect, RuleId, Snapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Bounds, EdgeConfig};

/// A condition over one tick's snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Module tension strictly above a threshold.
    TensionAbove {
        /// Observed module.
        module: ModuleId,
        /// Threshold.
        threshold: f64,
    },
    /// Module tension strictly below a threshold.
    TensionBelow {
        /// Observed module.
        module: ModuleId,
        /// Threshold.
        threshold: f64,
    },
    /// A control domain is in the given phase.
    PhaseIs {
        /// Observed domain.
        domain: DomainId,
        /// Expected phase.
        phase: Phase,
    },
    /// Predictive lookahead: `T_target + T_source * weight * lookahead_ticks`
    /// exceeds the threshold. A tripped or missing edge contributes nothing.
    ProjectedAbove {
        /// Upstream module.
        source: ModuleId,
        /// Downstream module.
        target: ModuleId,
        /// Ticks to project ahead.
        lookahead_ticks: u32,
        /// Threshold.
        threshold: f64,
    },
    /// Every inner predicate holds.
    All {
        /// Inner predicates.
        of: Vec<Self>,
    },
    /// At least one inner predicate holds.
    Any {
        /// Inner predicates.
        of: Vec<Self>,
    },
    /// The inner predicate does not hold.
    Not {
        /// Inner predicate.
        of: Box<Self>,
    },
    /// Always holds.
    #[default]
    Always,
}

impl Predicate {
    /// Evaluate against a snapshot. Unknown modules and domains never match.
    pub fn holds(&self, snapshot: &Snapshot) -> bool {
        match self {
            Self::TensionAbove { module, threshold } => {
                snapshot.tension(module).is_some_and(|t| t > *threshold)
            }
            Self::TensionBelow { module, threshold } => {
                snapshot.tension(module).is_some_and(|t| t < *threshold)
            }
            Self::PhaseIs { domain, phase } => snapshot.phase(domain) == Some(*phase),
            Self::ProjectedAbove {
                source,
                target,
                lookahead_ticks,
                threshold,
            } => projected_tension(snapshot, source, target, *lookahead_ticks)
                .is_some_and(|p| p > *threshold),
            Self::All { of } => of.iter().all(|p| p.holds(snapshot)),
            Self::Any { of } => of.iter().any(|p| p.holds(snapshot)),
            Self::Not { of } => !of.holds(snapshot),
            Self::Always => true,
        }
    }

    /// Append every module this predicate reads.
    pub fn collect_modules<'a>(&'a self, out: &mut Vec<&'a ModuleId>) {
        match self {
            Self::TensionAbove { module, .. } | Self::TensionBelow { module, .. } => {
                out.push(module);
            }
            Self::ProjectedAbove { source, target, .. } => {
                out.push(source);
                out.push(target);
            }
            Self::All { of } | Self::Any { of } => {
                for p in of {
                    p.collect_modules(out);
                }
            }
            Self::Not { of } => of.collect_modules(out),
            Self::PhaseIs { .. } | Self::Always => {}
        }
    }

    /// Append every domain this predicate reads.
    pub fn collect_domains<'a>(&'a self, out: &mut Vec<&'a DomainId>) {
        match self {
            Self::PhaseIs { domain, .. } => out.push(domain),
            Self::All { of } | Self::Any { of } => {
                for p in of {
                    p.collect_domains(out);
                }
            }
            Self::Not { of } => of.collect_domains(out),
            Self::TensionAbove { .. }
            | Self::TensionBelow { .. }
            | Self::ProjectedAbove { .. }
            | Self::Always => {}
        }
    }
}

/// Projected target tension after `lookahead_ticks` of propagation from
/// `source` at the edge's current weight.
pub fn projected_tension(
    snapshot: &Snapshot,
    source: &ModuleId,
    target: &ModuleId,
    lookahead_ticks: u32,
) -> Option<f64> {
    let t_source = snapshot.tension(source)?;
    let t_target = snapshot.tension(target)?;
    let weight = snapshot
        .edge(source, target)
        .filter(|e| e.is_active())
        .map_or(0.0, |e| e.weight);
    Some((t_source * weight).mul_add(f64::from(lookahead_ticks), t_target))
}

/// What a rule does when its predicate holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Scale the edge's reference weight by `factor` while the predicate
    /// holds.
    LoadShed {
        /// Edge source.
        source: ModuleId,
        /// Edge target.
        target: ModuleId,
        /// Weight multiplier (`>= 0`).
        factor: f64,
    },
    /// Suppress propagation along the edge while the target is overloaded.
    ///
    /// Trips when the predicate holds and the target's tension exceeds
    /// `threshold`; resets once the target falls below `reset_below`
    /// (default `threshold`), regardless of the predicate.
    CircuitBreaker {
        /// Edge source.
        source: ModuleId,
        /// Edge target.
        target: ModuleId,
        /// Target tension that trips the breaker.
        threshold: f64,
        /// Target tension below which the breaker resets.
        #[serde(default)]
        reset_below: Option<f64>,
    },
    /// Activate a dormant edge at `weight`. Latched: it stays active after
    /// the predicate clears.
    Bypass {
        /// Edge source.
        source: ModuleId,
        /// Edge target.
        target: ModuleId,
        /// Weight the edge takes on.
        weight: f64,
    },
    /// Degrade another module when `source` overshoots a severity level:
    /// `F_target *= 1 - overshoot * resilience_factor`,
    /// `E_target += overshoot * excitation_factor`.
    CatastrophicFeedback {
        /// Module whose tension is watched.
        source: ModuleId,
        /// Module that is degraded.
        target: ModuleId,
        /// Tension above which feedback starts.
        severity_threshold: f64,
        /// Resilience lost per unit of overshoot.
        #[serde(default = "default_resilience_factor")]
        resilience_factor: f64,
        /// Excitation gained per unit of overshoot.
        #[serde(default = "default_excitation_factor")]
        excitation_factor: f64,
    },
    /// Move `F_from * fraction` of resilience from one module to another.
    Reallocate {
        /// Donor module.
        from: ModuleId,
        /// Receiving module.
        to: ModuleId,
        /// Share of the donor's resilience moved per tick.
        fraction: f64,
    },
    /// Raise a module's resilience to at least `resilience`.
    Reinforce {
        /// Reinforced module.
        module: ModuleId,
        /// Resilience floor.
        resilience: f64,
    },
}

const fn default_resilience_factor() -> f64 {
    0.3
}

const fn default_excitation_factor() -> f64 {
    0.2
}

impl Action {
    /// Modules this action touches or reads.
    pub fn modules(&self) -> Vec<&ModuleId> {
        match self {
            Self::LoadShed { source, target, .. }
            | Self::CircuitBreaker { source, target, .. }
            | Self::Bypass { source, target, .. }
            | Self::CatastrophicFeedback { source, target, .. } => vec![source, target],
            Self::Reallocate { from, to, .. } => vec![from, to],
            Self::Reinforce { module, .. } => vec![module],
        }
    }

    /// The edge this action operates on, if it is an edge action.
    pub const fn edge(&self) -> Option<(&ModuleId, &ModuleId)> {
        match self {
            Self::LoadShed { source, target, .. }
            | Self::CircuitBreaker { source, target, .. }
            | Self::Bypass { source, target, .. } => Some((source, target)),
            Self::CatastrophicFeedback { .. } | Self::Reallocate { .. } | Self::Reinforce { .. } => {
                None
            }
        }
    }
}

/// One configured rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier, recorded on every action it produces.
    pub id: RuleId,
    /// Condition; defaults to always.
    #[serde(default)]
    pub when: Predicate,
    /// Effect.
    pub action: Action,
}

impl PolicyRule {
    /// The implicit breaker rule for an edge that declares a
    /// `breaker_threshold`.
    pub fn edge_breaker(edge: &EdgeConfig, threshold: f64) -> Self {
        Self {
            id: RuleId::new(format!("breaker:{}->{}", edge.source, edge.target)),
            when: Predicate::Always,
            action: Action::CircuitBreaker {
                source: edge.source.clone(),
                target: edge.target.clone(),
                threshold,
                reset_below: None,
            },
        }
    }
}

/// The ordered rule list.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    excitation: Bounds,
}

impl PolicyEngine {
    /// Create an engine. `excitation` clamps excitation raised by
    /// catastrophic feedback.
    pub const fn new(rules: Vec<PolicyRule>, excitation: Bounds) -> Self {
        Self { rules, excitation }
    }

    /// Configured rules followed by implicit edge breakers.
    pub fn from_config(policies: &[PolicyRule], edges: &[EdgeConfig], excitation: Bounds) -> Self {
        let mut rules = policies.to_vec();
        rules.extend(
            edges
                .iter()
                .filter_map(|e| e.breaker_threshold.map(|t| PolicyRule::edge_breaker(e, t))),
        );
        Self::new(rules, excitation)
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Evaluate every rule against `snapshot` and apply the results to the
    /// working `store` and `graph`. Returns the actions taken.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if a rule references an unknown module or
    /// edge. Callers discard the working copies on error.
    pub fn apply(
        &self,
        snapshot: &Snapshot,
        store: &mut ModuleStore,
        graph: &mut CouplingGraph,
    ) -> Result<Vec<PolicyAction>, NetworkError> {
        let verdicts: Vec<bool> = self.rules.iter().map(|r| r.when.holds(snapshot)).collect();

        let mut actions = Vec::new();
        let mut shed: BTreeMap<EdgeKey, (f64, &RuleId)> = BTreeMap::new();

        for (rule, holds) in self.rules.iter().zip(verdicts) {
            let mut record = |effect: PolicyEffect| {
                actions.push(PolicyAction::from_rule(rule.id.clone(), effect));
            };
            match &rule.action {
                Action::LoadShed {
                    source,
                    target,
                    factor,
                } => {
                    if holds {
                        let entry = shed
                            .entry(EdgeKey::new(source.clone(), target.clone()))
                            .or_insert((1.0, &rule.id));
                        entry.0 *= factor;
                    }
                }
                Action::CircuitBreaker {
                    source,
                    target,
                    threshold,
                    reset_below,
                } => {
                    let tension = snapshot
                        .tension(target)
                        .ok_or_else(|| NetworkError::ModuleNotFound(target.clone()))?;
                    let tripped = graph.breaker_state(source, target)?;
                    let edge = EdgeKey::new(source.clone(), target.clone());
                    if !tripped && holds && tension > *threshold {
                        graph.set_breaker(source, target, true)?;
                        info!(rule = %rule.id, edge = %edge, tension, "Circuit breaker tripped");
                        record(PolicyEffect::BreakerTripped { edge, tension });
                    } else if tripped && tension < reset_below.unwrap_or(*threshold) {
                        graph.set_breaker(source, target, false)?;
                        info!(rule = %rule.id, edge = %edge, tension, "Circuit breaker reset");
                        record(PolicyEffect::BreakerReset { edge, tension });
                    }
                }
                Action::Bypass {
                    source,
                    target,
                    weight,
                } => {
                    let edge = graph.edge(source, target)?;
                    if holds && edge.bypass_weight.is_none() && edge.is_dormant() {
                        graph.set_bypass(source, target, *weight)?;
                        let edge = EdgeKey::new(source.clone(), target.clone());
                        info!(rule = %rule.id, edge = %edge, weight, "Bypass activated");
                        record(PolicyEffect::BypassActivated {
                            edge,
                            weight: *weight,
                        });
                    }
                }
                Action::CatastrophicFeedback {
                    source,
                    target,
                    severity_threshold,
                    resilience_factor,
                    excitation_factor,
                } => {
                    let t_source = snapshot
                        .tension(source)
                        .ok_or_else(|| NetworkError::ModuleNotFound(source.clone()))?;
                    if holds && t_source > *severity_threshold {
                        let overshoot = t_source - severity_threshold;
                        let module = store.get(target)?;
                        let resilience = (module.resilience
                            * overshoot.mul_add(-resilience_factor, 1.0))
                        .max(0.0);
                        let excitation = self
                            .excitation
                            .clamp(overshoot.mul_add(*excitation_factor, module.excitation));
                        store.set_resilience(target, resilience)?;
                        store.set_excitation(target, excitation)?;
                        debug!(rule = %rule.id, source = %source, target = %target, overshoot, "Catastrophic feedback");
                        record(PolicyEffect::CatastrophicFeedback {
                            source: source.clone(),
                            target: target.clone(),
                            overshoot,
                            resilience,
                            excitation,
                        });
                    }
                }
                Action::Reallocate { from, to, fraction } => {
                    if holds {
                        let donor = store.get(from)?.resilience;
                        let amount = donor * fraction;
                        if amount > 0.0 {
                            let receiver = store.get(to)?.resilience;
                            store.set_resilience(from, donor - amount)?;
                            store.set_resilience(to, receiver + amount)?;
                            record(PolicyEffect::ResilienceReallocated {
                                from: from.clone(),
                                to: to.clone(),
                                amount,
                            });
                        }
                    }
                }
                Action::Reinforce { module, resilience } => {
                    let current = store.get(module)?.resilience;
                    if holds && current < *resilience {
                        store.set_resilience(module, *resilience)?;
                        record(PolicyEffect::ResilienceReinforced {
                            module: module.clone(),
                            from: current,
                            to: *resilience,
                        });
                    }
                }
            }
        }

        let plan: Vec<(EdgeKey, f64, f64, Option<&RuleId>)> = graph
            .edges()
            .iter()
            .map(|e| {
                let key = e.key();
                let (factor, rule) = shed
                    .get(&key)
                    .map_or((1.0, None), |(f, r)| (*f, Some(*r)));
                (key, e.weight, e.reference_weight() * factor, rule)
            })
            .collect();
        for (edge, before, target_weight, rule) in plan {
            graph.set_weight(&edge.source, &edge.target, target_weight)?;
            let after = graph.edge(&edge.source, &edge.target)?.weight;
            if after.to_bits() != before.to_bits() {
                let effect = PolicyEffect::EdgeWeightChanged {
                    edge,
                    from: before,
                    to: after,
                };
                actions.push(match rule {
                    Some(id) => PolicyAction::from_rule(id.clone(), effect),
                    None => PolicyAction::unattributed(effect),
                });
            }
        }

        Ok(actions)
    }
}

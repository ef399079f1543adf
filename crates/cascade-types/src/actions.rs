//! Records of the actions taken during a tick.
//!
//! Every effective change made by the adaptive policy engine, by an operator
//! intervention, or by the load-time coefficient check is captured as a
//! [`PolicyAction`] and appended to the snapshot of the tick it belongs to.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::InterventionKind;
use crate::ids::{ModuleId, RuleId};
use crate::structs::EdgeKey;

/// A single action taken during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAction {
    /// The rule that produced the action, or `None` for operator
    /// interventions and load-time diagnostics.
    pub rule: Option<RuleId>,
    /// What changed.
    pub effect: PolicyEffect,
}

impl PolicyAction {
    /// An action produced by a policy rule.
    pub const fn from_rule(rule: RuleId, effect: PolicyEffect) -> Self {
        Self {
            rule: Some(rule),
            effect,
        }
    }

    /// An action with no originating rule.
    pub const fn unattributed(effect: PolicyEffect) -> Self {
        Self { rule: None, effect }
    }
}

/// The concrete change an action made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEffect {
    /// An edge's propagation weight changed because load shedding started,
    /// stopped, or a bypass moved its reference weight.
    EdgeWeightChanged {
        /// The edge.
        edge: EdgeKey,
        /// Weight before the change.
        from: f64,
        /// Weight after the change.
        to: f64,
    },
    /// A circuit breaker tripped; the weight is retained but unused.
    BreakerTripped {
        /// The edge.
        edge: EdgeKey,
        /// Target tension that tripped the breaker.
        tension: f64,
    },
    /// A circuit breaker reset.
    BreakerReset {
        /// The edge.
        edge: EdgeKey,
        /// Target tension at reset.
        tension: f64,
    },
    /// A dormant edge was activated.
    BypassActivated {
        /// The edge.
        edge: EdgeKey,
        /// The bypass weight.
        weight: f64,
    },
    /// Catastrophic feedback from one module degraded another.
    CatastrophicFeedback {
        /// Module whose tension exceeded the severity threshold.
        source: ModuleId,
        /// Module that was degraded.
        target: ModuleId,
        /// Tension above the severity threshold.
        overshoot: f64,
        /// Target resilience after degradation.
        resilience: f64,
        /// Target excitation after the panic injection.
        excitation: f64,
    },
    /// Resilience moved from one module to another.
    ResilienceReallocated {
        /// Donor module.
        from: ModuleId,
        /// Receiving module.
        to: ModuleId,
        /// Amount of resilience moved.
        amount: f64,
    },
    /// A module's resilience was raised to a reinforcement level.
    ResilienceReinforced {
        /// The module.
        module: ModuleId,
        /// Resilience before.
        from: f64,
        /// Resilience after.
        to: f64,
    },
    /// An operator intervention was applied.
    InterventionApplied {
        /// The module.
        module: ModuleId,
        /// Intervention kind.
        kind: InterventionKind,
        /// Remaining integrity budget, if the module has one.
        integrity: Option<Decimal>,
    },
    /// An operator intervention was rejected by the integrity floor.
    InterventionRejected {
        /// The module.
        module: ModuleId,
        /// Intervention kind.
        kind: InterventionKind,
        /// Unchanged integrity budget.
        integrity: Decimal,
    },
    /// A calibration coefficient is outside its expected range.
    CoefficientFlagged {
        /// The module.
        module: ModuleId,
        /// Coefficient name.
        coefficient: String,
        /// Offending value.
        value: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_are_internally_tagged() {
        let action = PolicyAction::from_rule(
            RuleId::from("trip"),
            PolicyEffect::BreakerTripped {
                edge: EdgeKey::new("a", "b"),
                tension: 1.5,
            },
        );
        let json = serde_json::to_value(&action).ok();
        let tag = json
            .as_ref()
            .and_then(|v| v.get("effect"))
            .and_then(|e| e.get("type"))
            .and_then(serde_json::Value::as_str);
        assert_eq!(tag, Some("breaker_tripped"));
    }

    #[test]
    fn unattributed_has_no_rule() {
        let action = PolicyAction::unattributed(PolicyEffect::CoefficientFlagged {
            module: ModuleId::from("m"),
            coefficient: "beta".to_owned(),
            value: -1.0,
        });
        assert!(action.rule.is_none());
    }
}

//! Operator interventions: direct, budget-costed resets of module state.
//!
//! An intervention debits the module's integrity budget by a fixed cost.
//! If the debit would leave the budget below the configured floor the
//! intervention is rejected and nothing changes. Modules without a budget
//! are never rejected.

use cascade_network::{ModuleStore, NetworkError};
use cascade_types::{InterventionKind, ModuleId, PolicyEffect};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::InterventionConfig;

/// Result of an intervention request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterventionOutcome {
    /// State was changed.
    Applied {
        /// Remaining integrity, if the module has a budget.
        integrity: Option<Decimal>,
    },
    /// The integrity floor would have been breached; nothing changed.
    Rejected {
        /// Current (unchanged) integrity.
        integrity: Decimal,
        /// Cost that was requested.
        cost: Decimal,
        /// Configured floor.
        floor: Decimal,
    },
}

impl InterventionOutcome {
    /// Whether the intervention was applied.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// The record to attach to the next snapshot.
    pub fn effect(&self, module: &ModuleId, kind: InterventionKind) -> PolicyEffect {
        match *self {
            Self::Applied { integrity } => PolicyEffect::InterventionApplied {
                module: module.clone(),
                kind,
                integrity,
            },
            Self::Rejected { integrity, .. } => PolicyEffect::InterventionRejected {
                module: module.clone(),
                kind,
                integrity,
            },
        }
    }
}

/// Apply an intervention to `store`.
///
/// * `Reset` keeps `tension_retained` of the tension and restores the
///   damping gain to `min(gamma * integrity, damping * damping_restore)`
///   (`gamma` alone caps it for unbudgeted modules). A reset never lowers
///   the current gain.
/// * `Reinforce` raises resilience to at least `reinforce_resilience`.
///
/// # Errors
///
/// Returns [`NetworkError::ModuleNotFound`] for an unknown module.
pub fn apply(
    store: &mut ModuleStore,
    module: &ModuleId,
    kind: InterventionKind,
    settings: &InterventionConfig,
) -> Result<InterventionOutcome, NetworkError> {
    let state = store.get(module)?;

    let remaining = match state.integrity {
        Some(integrity) => match integrity.checked_sub(settings.cost) {
            Some(after) if after >= settings.floor => Some(after),
            _ => {
                return Ok(InterventionOutcome::Rejected {
                    integrity,
                    cost: settings.cost,
                    floor: settings.floor,
                });
            }
        },
        None => None,
    };

    match kind {
        InterventionKind::Reset => {
            let gamma = state.coefficients.gamma;
            let cap = remaining
                .and_then(|i| i.to_f64())
                .map_or(gamma, |i| gamma * i);
            let damping = state
                .damping
                .max((state.damping * settings.damping_restore).min(cap));
            let tension = state.tension * settings.tension_retained;
            store.set_tension(module, tension)?;
            store.set_damping(module, damping)?;
        }
        InterventionKind::Reinforce => {
            let resilience = state.resilience.max(settings.reinforce_resilience);
            store.set_resilience(module, resilience)?;
        }
    }
    if let Some(after) = remaining {
        store.set_integrity(module, after)?;
    }

    Ok(InterventionOutcome::Applied {
        integrity: remaining,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{Coefficients, ModuleState, TensionKind};
    use rust_decimal_macros::dec;

    use super::*;

    fn store(integrity: Option<Decimal>) -> ModuleStore {
        let mut m = ModuleState::new(
            ModuleId::from("social"),
            TensionKind::Relaxation,
            0.6,
            0.8,
            Coefficients::new(0.0, 3.5, 0.8),
        );
        m.tension = 1.5;
        m.damping = 0.4;
        m.integrity = integrity;
        let mut store = ModuleStore::new();
        store.insert(m).unwrap();
        store
    }

    fn id() -> ModuleId {
        ModuleId::from("social")
    }

    #[test]
    fn rejected_below_floor_without_mutation() {
        let mut store = store(Some(dec!(0.16)));
        let settings = InterventionConfig {
            cost: dec!(0.02),
            floor: dec!(0.15),
            ..InterventionConfig::default()
        };
        let before = store.get(&id()).unwrap().clone();
        let outcome = apply(&mut store, &id(), InterventionKind::Reset, &settings).unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(store.get(&id()).unwrap(), &before);
        assert_eq!(store.get(&id()).unwrap().integrity, Some(dec!(0.16)));
    }

    #[test]
    fn reset_debits_and_restores_damping() {
        let mut store = store(Some(dec!(1.0)));
        let settings = InterventionConfig::default();
        let outcome = apply(&mut store, &id(), InterventionKind::Reset, &settings).unwrap();
        assert_eq!(
            outcome,
            InterventionOutcome::Applied {
                integrity: Some(dec!(0.98))
            }
        );
        let m = store.get(&id()).unwrap();
        assert!((m.tension - 0.9).abs() < 1e-12);
        // min(0.8 * 0.98, 0.4 * 1.15)
        assert!((m.damping - 0.46).abs() < 1e-12);
        assert_eq!(m.integrity, Some(dec!(0.98)));
    }

    #[test]
    fn damping_is_capped_by_integrity() {
        let mut store = store(Some(dec!(0.5)));
        store.set_damping(&id(), 0.36).unwrap();
        let settings = InterventionConfig::default();
        apply(&mut store, &id(), InterventionKind::Reset, &settings).unwrap();
        // min(0.8 * 0.48, 0.36 * 1.15)
        assert!((store.get(&id()).unwrap().damping - 0.384).abs() < 1e-12);
    }

    #[test]
    fn reset_never_lowers_damping() {
        let mut store = store(Some(dec!(0.5)));
        store.set_damping(&id(), 0.79).unwrap();
        let settings = InterventionConfig::default();
        let outcome = apply(&mut store, &id(), InterventionKind::Reset, &settings).unwrap();
        assert!(outcome.is_applied());
        // cap = 0.8 * 0.48 = 0.384 lies below the current gain
        let m = store.get(&id()).unwrap();
        assert!((m.damping - 0.79).abs() < 1e-12);
        assert_eq!(m.integrity, Some(dec!(0.48)));
    }

    #[test]
    fn unbudgeted_module_is_never_rejected() {
        let mut store = store(None);
        let settings = InterventionConfig::default();
        for _ in 0..100 {
            let outcome = apply(&mut store, &id(), InterventionKind::Reinforce, &settings).unwrap();
            assert!(outcome.is_applied());
        }
        assert!((store.get(&id()).unwrap().resilience - 1.5).abs() < 1e-12);
    }

    #[test]
    fn exact_floor_is_allowed() {
        let mut store = store(Some(dec!(0.12)));
        let settings = InterventionConfig::default();
        let outcome = apply(&mut store, &id(), InterventionKind::Reinforce, &settings).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(store.get(&id()).unwrap().integrity, Some(dec!(0.10)));
        let outcome = apply(&mut store, &id(), InterventionKind::Reinforce, &settings).unwrap();
        assert!(!outcome.is_applied());
    }

    #[test]
    fn unknown_module_is_not_found() {
        let mut store = store(None);
        let result = apply(
            &mut store,
            &ModuleId::from("ghost"),
            InterventionKind::Reset,
            &InterventionConfig::default(),
        );
        assert!(result.is_err());
    }
}

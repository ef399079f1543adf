//! Core entity structs: calibration coefficients, module state, and edges.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::TensionKind;
use crate::ids::ModuleId;

// ---------------------------------------------------------------------------
// Coefficients
// ---------------------------------------------------------------------------

/// Static per-module calibration triple.
///
/// `beta` scales excitation into tension, `gamma` scales resilience (or the
/// previous tension, for relaxation modules) out of it. `alpha` is carried
/// for calibration bookkeeping and does not enter the update formulas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// Calibration offset.
    #[serde(default)]
    pub alpha: f64,
    /// Excitation gain.
    pub beta: f64,
    /// Damping gain.
    pub gamma: f64,
}

impl Coefficients {
    /// Create a coefficient triple.
    pub const fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Whether every coefficient is a finite number.
    pub const fn is_finite(&self) -> bool {
        self.alpha.is_finite() && self.beta.is_finite() && self.gamma.is_finite()
    }

    /// Coefficients outside their expected range (negative gains).
    ///
    /// Such values are accepted but reported through the observability
    /// hook.
    pub fn out_of_range(&self) -> Vec<(&'static str, f64)> {
        let mut flagged = Vec::new();
        if self.beta < 0.0 {
            flagged.push(("beta", self.beta));
        }
        if self.gamma < 0.0 {
            flagged.push(("gamma", self.gamma));
        }
        flagged
    }
}

// ---------------------------------------------------------------------------
// Module state
// ---------------------------------------------------------------------------

/// Scalar state of a single module.
///
/// `tension` is derived: the integrator recomputes it every tick from
/// `(excitation, resilience, coefficients)`. `damping` starts at
/// `coefficients.gamma` and is the value the formulas actually use, so that
/// interventions can restore it without touching the calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Module identifier.
    pub id: ModuleId,
    /// Tension formula used by this module.
    pub kind: TensionKind,
    /// Excitation `E`.
    pub excitation: f64,
    /// Resilience `F` (non-negative).
    pub resilience: f64,
    /// Derived tension `T`.
    pub tension: f64,
    /// Runtime damping gain, initially `coefficients.gamma`.
    pub damping: f64,
    /// Static calibration triple.
    pub coefficients: Coefficients,
    /// Remaining intervention budget, if this module has one.
    pub integrity: Option<Decimal>,
}

impl ModuleState {
    /// Create a module at rest (zero tension) with damping equal to `gamma`.
    pub fn new(
        id: ModuleId,
        kind: TensionKind,
        excitation: f64,
        resilience: f64,
        coefficients: Coefficients,
    ) -> Self {
        Self {
            id,
            kind,
            excitation,
            resilience: resilience.max(0.0),
            tension: 0.0,
            damping: coefficients.gamma,
            coefficients,
            integrity: None,
        }
    }

    /// Instantaneous tension `beta*E - damping*F*erosion_factor`.
    ///
    /// With `erosion_factor = 1.0` this is the module's uneroded tension,
    /// which is what drives erosion when the module is the erosion source.
    pub fn instantaneous_tension(&self, erosion_factor: f64) -> f64 {
        self.coefficients.beta.mul_add(
            self.excitation,
            -(self.damping * self.resilience * erosion_factor),
        )
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Directed `(source, target)` pair identifying a coupling edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    /// Module whose tension propagates.
    pub source: ModuleId,
    /// Module whose excitation receives it.
    pub target: ModuleId,
}

impl EdgeKey {
    /// Create an edge key.
    pub fn new(source: impl Into<ModuleId>, target: impl Into<ModuleId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl core::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// Runtime state of a coupling edge.
///
/// The set of edges is fixed at load time. Only `weight`, `bypass_weight`,
/// and `breaker_active` change while the simulation runs; decoupling sets
/// `weight` to zero instead of removing the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    /// Source module.
    pub source: ModuleId,
    /// Target module.
    pub target: ModuleId,
    /// Configured weight the edge returns to when no policy scales it.
    pub base_weight: f64,
    /// Weight used for propagation (always `>= 0`).
    pub weight: f64,
    /// Weight assigned by an activated bypass; replaces `base_weight` as the
    /// reference for load shedding once set.
    pub bypass_weight: Option<f64>,
    /// Whether propagation along this edge is suppressed.
    pub breaker_active: bool,
    /// Target tension above which the edge's implicit breaker trips.
    pub breaker_threshold: Option<f64>,
}

impl EdgeState {
    /// Create an edge at its base weight with the breaker closed.
    pub fn new(source: ModuleId, target: ModuleId, base_weight: f64) -> Self {
        let base = base_weight.max(0.0);
        Self {
            source,
            target,
            base_weight: base,
            weight: base,
            bypass_weight: None,
            breaker_active: false,
            breaker_threshold: None,
        }
    }

    /// The weight load shedding scales: the bypass weight if one is active,
    /// otherwise the configured base.
    pub fn reference_weight(&self) -> f64 {
        self.bypass_weight.unwrap_or(self.base_weight)
    }

    /// Whether this edge carries tension this tick.
    pub const fn is_active(&self) -> bool {
        !self.breaker_active
    }

    /// Whether the edge is a dormant (zero base weight) bypass candidate.
    pub fn is_dormant(&self) -> bool {
        self.base_weight <= 0.0
    }

    /// The key identifying this edge.
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantaneous_tension_uses_runtime_damping() {
        let mut m = ModuleState::new(
            ModuleId::from("a"),
            TensionKind::Instantaneous,
            0.6,
            0.8,
            Coefficients::new(0.0, 3.5, 0.8),
        );
        assert!((m.instantaneous_tension(1.0) - (3.5 * 0.6 - 0.8 * 0.8)).abs() < 1e-12);
        m.damping = 0.5;
        assert!((m.instantaneous_tension(0.5) - (3.5 * 0.6 - 0.5 * 0.8 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn negative_gains_are_flagged() {
        let c = Coefficients::new(0.0, -1.0, 0.5);
        let flagged = c.out_of_range();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged.first().map(|f| f.0), Some("beta"));
        assert!(Coefficients::new(0.0, 1.0, 1.0).out_of_range().is_empty());
    }

    #[test]
    fn new_module_damping_starts_at_gamma() {
        let m = ModuleState::new(
            ModuleId::from("a"),
            TensionKind::Relaxation,
            0.6,
            0.8,
            Coefficients::new(0.0, 3.5, 0.8),
        );
        assert!((m.damping - 0.8).abs() < 1e-12);
        assert!(m.tension.abs() < f64::EPSILON);
        assert!(m.integrity.is_none());
    }

    #[test]
    fn negative_base_weight_is_clamped() {
        let e = EdgeState::new(ModuleId::from("a"), ModuleId::from("b"), -0.5);
        assert!(e.base_weight.abs() < f64::EPSILON);
        assert!(e.is_dormant());
        assert!(e.is_active());
    }

    #[test]
    fn reference_weight_prefers_bypass() {
        let mut e = EdgeState::new(ModuleId::from("a"), ModuleId::from("b"), 0.0);
        assert!(e.reference_weight().abs() < f64::EPSILON);
        e.bypass_weight = Some(0.01);
        assert!((e.reference_weight() - 0.01).abs() < 1e-12);
        assert_eq!(e.key().to_string(), "a->b");
    }
}

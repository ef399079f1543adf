//! Hysteretic phase controller and control domains.
//!
//! A [`PhaseController`] classifies one aggregate tension value per tick as
//! NOMINAL, PREDICTIVE, or FIREWALL. Entering FIREWALL happens at
//! `firewall_threshold`, but leaving it requires dropping below the lower
//! `exit_threshold`, and always lands in NOMINAL. A [`ControlDomain`] binds a
//! controller to a set of modules and feeds it their maximum tension.

use cascade_network::{ModuleStore, NetworkError};
use cascade_types::{DomainId, ModuleId, Phase};

use crate::config::ConfigError;

/// Validated `(predictive, firewall, exit)` thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseThresholds {
    predictive: f64,
    firewall: f64,
    exit: f64,
}

impl PhaseThresholds {
    /// Validate and build a threshold set.
    ///
    /// Requires finite values with `exit < firewall` and
    /// `predictive <= firewall`. `context` names the set in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHysteresis`] otherwise.
    pub fn new(
        context: &str,
        predictive: f64,
        firewall: f64,
        exit: f64,
    ) -> Result<Self, ConfigError> {
        let finite = predictive.is_finite() && firewall.is_finite() && exit.is_finite();
        if !finite || exit >= firewall || predictive > firewall {
            return Err(ConfigError::InvalidHysteresis {
                context: context.to_owned(),
                predictive,
                firewall,
                exit,
            });
        }
        Ok(Self {
            predictive,
            firewall,
            exit,
        })
    }

    /// NOMINAL -> PREDICTIVE threshold.
    pub const fn predictive(&self) -> f64 {
        self.predictive
    }

    /// Any -> FIREWALL threshold.
    pub const fn firewall(&self) -> f64 {
        self.firewall
    }

    /// FIREWALL -> NOMINAL threshold.
    pub const fn exit(&self) -> f64 {
        self.exit
    }
}

/// Three-state hysteretic classifier, starting in NOMINAL.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseController {
    thresholds: PhaseThresholds,
    phase: Phase,
}

impl PhaseController {
    /// A controller in NOMINAL.
    pub const fn new(thresholds: PhaseThresholds) -> Self {
        Self {
            thresholds,
            phase: Phase::Nominal,
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The thresholds in use.
    pub const fn thresholds(&self) -> &PhaseThresholds {
        &self.thresholds
    }

    /// Feed one observation and return the resulting phase.
    pub fn observe(&mut self, x: f64) -> Phase {
        self.phase = next_phase(self.phase, x, &self.thresholds);
        self.phase
    }
}

/// The transition function.
///
/// FIREWALL is only left through the exit test, and only to NOMINAL.
fn next_phase(current: Phase, x: f64, t: &PhaseThresholds) -> Phase {
    if x >= t.firewall {
        return Phase::Firewall;
    }
    match current {
        Phase::Firewall if x < t.exit => Phase::Nominal,
        Phase::Firewall => Phase::Firewall,
        Phase::Nominal | Phase::Predictive if x >= t.predictive => Phase::Predictive,
        Phase::Nominal | Phase::Predictive => Phase::Nominal,
    }
}

/// A phase controller over the max tension of a set of modules.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlDomain {
    id: DomainId,
    members: Vec<ModuleId>,
    controller: PhaseController,
    gamma_multiplier: f64,
}

impl ControlDomain {
    /// Create a domain. `members` must be non-empty and resolved.
    pub const fn new(
        id: DomainId,
        members: Vec<ModuleId>,
        thresholds: PhaseThresholds,
        gamma_multiplier: f64,
    ) -> Self {
        Self {
            id,
            members,
            controller: PhaseController::new(thresholds),
            gamma_multiplier,
        }
    }

    /// Domain identifier.
    pub const fn id(&self) -> &DomainId {
        &self.id
    }

    /// Member modules.
    pub fn members(&self) -> &[ModuleId] {
        &self.members
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.controller.phase()
    }

    /// Default FIREWALL damping multiplier for members.
    pub const fn gamma_multiplier(&self) -> f64 {
        self.gamma_multiplier
    }

    /// The aggregate observed value: max tension across members.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown member.
    pub fn aggregate(&self, store: &ModuleStore) -> Result<f64, NetworkError> {
        let mut max = f64::NEG_INFINITY;
        for member in &self.members {
            max = max.max(store.get(member)?.tension);
        }
        Ok(if max.is_finite() { max } else { 0.0 })
    }

    /// Observe the store and update the phase. Returns the previous phase
    /// and the new one.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ModuleNotFound`] for an unknown member.
    pub fn observe(&mut self, store: &ModuleStore) -> Result<(Phase, Phase), NetworkError> {
        let x = self.aggregate(store)?;
        let before = self.controller.phase();
        let after = self.controller.observe(x);
        Ok((before, after))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_types::{Coefficients, ModuleState, TensionKind};

    use super::*;

    fn thresholds() -> PhaseThresholds {
        PhaseThresholds::new("test", 0.4, 1.0, 0.4).unwrap()
    }

    #[test]
    fn rejects_exit_at_or_above_firewall() {
        assert!(PhaseThresholds::new("t", 0.4, 1.0, 1.0).is_err());
        assert!(PhaseThresholds::new("t", 0.4, 1.0, 1.5).is_err());
        assert!(PhaseThresholds::new("t", 1.2, 1.0, 0.4).is_err());
        assert!(PhaseThresholds::new("t", f64::NAN, 1.0, 0.4).is_err());
    }

    #[test]
    fn nominal_to_predictive_and_back() {
        let mut c = PhaseController::new(thresholds());
        assert_eq!(c.observe(0.2), Phase::Nominal);
        assert_eq!(c.observe(0.5), Phase::Predictive);
        assert_eq!(c.observe(0.39), Phase::Nominal);
    }

    #[test]
    fn firewall_holds_inside_the_band() {
        let mut c = PhaseController::new(thresholds());
        assert_eq!(c.observe(1.2), Phase::Firewall);
        assert_eq!(c.observe(0.5), Phase::Firewall);
        assert_eq!(c.observe(0.4), Phase::Firewall);
        assert_eq!(c.observe(0.39), Phase::Nominal);
    }

    #[test]
    fn firewall_never_drops_to_predictive() {
        let thresholds = PhaseThresholds::new("wide", 0.3, 1.0, 0.6).unwrap();
        let mut c = PhaseController::new(thresholds);
        c.observe(1.0);
        // Below exit but above predictive: exits straight to NOMINAL.
        assert_eq!(c.observe(0.5), Phase::Nominal);
        assert_eq!(c.observe(0.5), Phase::Predictive);
    }

    #[test]
    fn any_phase_jumps_to_firewall() {
        let mut c = PhaseController::new(thresholds());
        assert_eq!(c.observe(5.0), Phase::Firewall);
        let mut c = PhaseController::new(thresholds());
        c.observe(0.6);
        assert_eq!(c.observe(1.0), Phase::Firewall);
    }

    #[test]
    fn domain_observes_max_member_tension() {
        let mut store = ModuleStore::new();
        for (name, t) in [("a", 0.2), ("b", 1.1), ("c", 3.0)] {
            let mut m = ModuleState::new(
                ModuleId::from(name),
                TensionKind::Instantaneous,
                0.0,
                0.0,
                Coefficients::new(0.0, 1.0, 1.0),
            );
            m.tension = t;
            store.insert(m).unwrap();
        }
        let mut domain = ControlDomain::new(
            DomainId::from("ab"),
            vec![ModuleId::from("a"), ModuleId::from("b")],
            thresholds(),
            2.5,
        );
        assert!((domain.aggregate(&store).unwrap() - 1.1).abs() < 1e-12);
        let (before, after) = domain.observe(&store).unwrap();
        assert_eq!(before, Phase::Nominal);
        assert_eq!(after, Phase::Firewall);
    }
}

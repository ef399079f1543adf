//! Enumeration types for the Cascade simulator.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Hysteretic classification of aggregate tension in a control domain.
///
/// The ordering reflects severity, so `Phase::Nominal < Phase::Firewall`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Tension below the predictive threshold.
    #[default]
    Nominal,
    /// Tension inside the early-warning band.
    Predictive,
    /// Tension reached the firewall threshold; damping is boosted until
    /// tension drops below the exit threshold.
    Firewall,
}

impl Phase {
    /// Upper-case label used in logs and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "NOMINAL",
            Self::Predictive => "PREDICTIVE",
            Self::Firewall => "FIREWALL",
        }
    }

    /// Whether this phase boosts damping.
    pub const fn is_firewall(self) -> bool {
        matches!(self, Self::Firewall)
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tension formula
// ---------------------------------------------------------------------------

/// Which tension formula a module uses.
///
/// - `Instantaneous`: `T = beta*E - gamma*F_eff`, recomputed from scratch.
/// - `Relaxation`: `T += (beta*E - gamma_eff*gamma*T) * dt`, carrying state
///   across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionKind {
    /// Stateless tension computed from current excitation and resilience.
    #[default]
    Instantaneous,
    /// Stateful first-order relaxation toward `beta*E / (gamma_eff*gamma)`.
    Relaxation,
}

// ---------------------------------------------------------------------------
// Interventions
// ---------------------------------------------------------------------------

/// Operator-invoked intervention kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Cut tension by a fixed fraction and partially restore damping.
    Reset,
    /// Raise resilience to the configured reinforcement level.
    Reinforce,
}

impl InterventionKind {
    /// Lower-case label used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Reinforce => "reinforce",
        }
    }
}

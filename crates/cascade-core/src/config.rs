//! Configuration loading and typed config structures for the Cascade simulator.
//!
//! The canonical configuration lives in `cascade-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, a loader, and [`SimulationConfig::validate`], which rejects
//! every load-time error before an engine is built.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cascade_network::NetworkError;
use cascade_types::{Coefficients, DomainId, ModuleId, TensionKind};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::phase::PhaseThresholds;
use crate::policy::{Action, PolicyRule};

/// Errors that can occur when loading or validating configuration.
///
/// All of them are fatal: an engine is never built from a configuration
/// that fails to load.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration or coefficient file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// Failed to parse a JSON coefficient file.
    #[error("failed to parse coefficients in {}: {source}", .path.display())]
    Json {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying JSON parse error.
        source: serde_json::Error,
    },

    /// No coefficients could be resolved for a module.
    #[error("no coefficients for module {0}")]
    MissingCoefficients(ModuleId),

    /// Something references an id that is not declared.
    #[error("{context} references unknown {id}")]
    DanglingReference {
        /// Where the reference appears (e.g. `edge urban->social`).
        context: String,
        /// The unresolved id.
        id: String,
    },

    /// Phase thresholds do not form a valid hysteresis band.
    #[error(
        "invalid hysteresis for {context}: predictive={predictive}, firewall={firewall}, exit={exit}"
    )]
    InvalidHysteresis {
        /// Which threshold set is invalid (`phase` or a domain id).
        context: String,
        /// Predictive threshold.
        predictive: f64,
        /// Firewall threshold.
        firewall: f64,
        /// Exit threshold.
        exit: f64,
    },

    /// A value is outside its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Building the module store or coupling graph failed.
    #[error("network error: {source}")]
    Network {
        /// The underlying store/graph error.
        #[from]
        source: NetworkError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    fn dangling(context: impl Into<String>, id: impl core::fmt::Display) -> Self {
        Self::DanglingReference {
            context: context.into(),
            id: id.to_string(),
        }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `cascade-config.yaml`. Every section has
/// defaults, so an empty document parses (but describes an empty network).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Timestep, seed, and run bounds.
    #[serde(default)]
    pub simulation: RunConfig,

    /// Global phase thresholds and FIREWALL damping multiplier.
    #[serde(default)]
    pub phase: PhaseConfig,

    /// Control domains; empty means a single `global` domain.
    #[serde(default)]
    pub domains: Vec<DomainConfig>,

    /// Erosion source and floor.
    #[serde(default)]
    pub erosion: ErosionConfig,

    /// Hard clamps for tension and excitation.
    #[serde(default)]
    pub clamp: ClampConfig,

    /// Operator intervention parameters.
    #[serde(default)]
    pub intervention: InterventionConfig,

    /// Module declarations in load order.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Edge declarations in load order.
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,

    /// Ordered adaptive policy rules.
    #[serde(default)]
    pub policies: Vec<PolicyRule>,

    /// Seeded stochastic excitation forcing (exploratory runs only).
    #[serde(default)]
    pub forcing: Option<ForcingConfig>,

    /// Directory of per-module `coefficients.json` files.
    #[serde(default)]
    pub coefficients_dir: Option<PathBuf>,

    /// History recorder and writer settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// A relative `coefficients_dir` is resolved against the directory that
    /// contains the config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        if let (Some(dir), Some(parent)) = (config.coefficients_dir.as_mut(), path.parent()) {
            if dir.is_relative() {
                *dir = parent.join(&*dir);
            }
        }
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Check ranges, hysteresis ordering, and every cross-reference.
    ///
    /// Duplicate module and edge declarations are caught later, when the
    /// store and graph are built.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        self.clamp.tension.validate("clamp.tension")?;
        self.clamp.excitation.validate("clamp.excitation")?;
        self.erosion.validate()?;
        self.intervention.validate()?;

        PhaseThresholds::new(
            "phase",
            self.phase.predictive_threshold,
            self.phase.firewall_threshold,
            self.phase.exit_threshold,
        )?;
        validate_multiplier("phase.firewall_gamma_multiplier", self.phase.firewall_gamma_multiplier)?;

        if self.history.capacity == 0 {
            return Err(ConfigError::invalid("history.capacity", "must be at least 1"));
        }

        let modules: BTreeSet<&ModuleId> = self.modules.iter().map(|m| &m.id).collect();
        for module in &self.modules {
            module.validate()?;
        }

        let mut edges: BTreeMap<(&ModuleId, &ModuleId), &EdgeConfig> = BTreeMap::new();
        for edge in &self.edges {
            let context = format!("edge {}->{}", edge.source, edge.target);
            for endpoint in [&edge.source, &edge.target] {
                if !modules.contains(endpoint) {
                    return Err(ConfigError::dangling(context, endpoint));
                }
            }
            edge.validate(&context)?;
            edges.insert((&edge.source, &edge.target), edge);
        }

        if let Some(ref source) = self.erosion.source {
            if !modules.contains(source) {
                return Err(ConfigError::dangling("erosion.source", source));
            }
        }

        let global = DomainId::from(GLOBAL_DOMAIN);
        let mut domains: BTreeSet<&DomainId> = BTreeSet::new();
        for domain in &self.domains {
            if !domains.insert(&domain.id) {
                return Err(ConfigError::invalid(
                    "domains",
                    format!("duplicate domain id {}", domain.id),
                ));
            }
            for member in &domain.modules {
                if !modules.contains(member) {
                    return Err(ConfigError::dangling(format!("domain {}", domain.id), member));
                }
            }
            domain.thresholds(&self.phase)?;
            validate_multiplier(
                &format!("domains.{}.firewall_gamma_multiplier", domain.id),
                domain.multiplier(&self.phase),
            )?;
        }
        if self.domains.is_empty() {
            domains.insert(&global);
        }

        let mut rule_ids = BTreeSet::new();
        for rule in &self.policies {
            if !rule_ids.insert(&rule.id) {
                return Err(ConfigError::invalid(
                    "policies",
                    format!("duplicate rule id {}", rule.id),
                ));
            }
            validate_rule(rule, &modules, &edges, &domains)?;
        }

        if let Some(ref forcing) = self.forcing {
            forcing.validate(&modules)?;
        }
        Ok(())
    }
}

/// Name of the implicit domain used when none is configured.
pub const GLOBAL_DOMAIN: &str = "global";

fn validate_multiplier(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is not a positive number")))
    }
}

fn validate_rule(
    rule: &PolicyRule,
    modules: &BTreeSet<&ModuleId>,
    edges: &BTreeMap<(&ModuleId, &ModuleId), &EdgeConfig>,
    domains: &BTreeSet<&DomainId>,
) -> Result<(), ConfigError> {
    let context = format!("policy {}", rule.id);

    let mut referenced = Vec::new();
    rule.when.collect_modules(&mut referenced);
    referenced.extend(rule.action.modules());
    if let Some(missing) = referenced.into_iter().find(|m| !modules.contains(m)) {
        return Err(ConfigError::dangling(context, missing));
    }

    let mut referenced_domains = Vec::new();
    rule.when.collect_domains(&mut referenced_domains);
    if let Some(missing) = referenced_domains.into_iter().find(|d| !domains.contains(d)) {
        return Err(ConfigError::dangling(context, missing));
    }

    let edge = match rule.action.edge() {
        Some((source, target)) => Some(
            edges
                .get(&(source, target))
                .ok_or_else(|| ConfigError::dangling(&context, format!("edge {source}->{target}")))?,
        ),
        None => None,
    };

    let field = format!("policies.{}", rule.id);
    match &rule.action {
        Action::LoadShed { factor, .. } => {
            if !(factor.is_finite() && *factor >= 0.0) {
                return Err(ConfigError::invalid(field, "load_shed factor must be >= 0"));
            }
        }
        Action::CircuitBreaker {
            threshold,
            reset_below,
            ..
        } => {
            let reset = reset_below.unwrap_or(*threshold);
            if !threshold.is_finite() || !reset.is_finite() || reset > *threshold {
                return Err(ConfigError::invalid(
                    field,
                    "circuit_breaker needs finite thresholds with reset_below <= threshold",
                ));
            }
        }
        Action::Bypass { weight, .. } => {
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(ConfigError::invalid(field, "bypass weight must be >= 0"));
            }
            if edge.is_some_and(|e| e.base_weight > 0.0) {
                return Err(ConfigError::invalid(
                    field,
                    "bypass edge must be dormant (base_weight 0)",
                ));
            }
        }
        Action::CatastrophicFeedback {
            source,
            target,
            severity_threshold,
            resilience_factor,
            excitation_factor,
        } => {
            if source == target {
                return Err(ConfigError::invalid(
                    field,
                    "catastrophic_feedback must target a different module",
                ));
            }
            if !(severity_threshold.is_finite()
                && resilience_factor.is_finite()
                && excitation_factor.is_finite())
            {
                return Err(ConfigError::invalid(field, "catastrophic_feedback values must be finite"));
            }
        }
        Action::Reallocate { from, to, fraction } => {
            if from == to {
                return Err(ConfigError::invalid(field, "reallocate needs two distinct modules"));
            }
            if !(0.0..=1.0).contains(fraction) {
                return Err(ConfigError::invalid(field, "reallocate fraction must be in [0, 1]"));
            }
        }
        Action::Reinforce { resilience, .. } => {
            if !(resilience.is_finite() && *resilience >= 0.0) {
                return Err(ConfigError::invalid(field, "reinforce resilience must be >= 0"));
            }
        }
    }
    Ok(())
}

/// Timestep, seed, and run bounds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Timestep passed to every tick.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Seed for stochastic forcing when the forcing section has none.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Maximum ticks before the runner stops (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the runner stops (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,

    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            seed: default_seed(),
            max_ticks: 0,
            max_real_time_seconds: 0,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dt.is_finite() && self.dt > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::invalid("simulation.dt", "must be a positive number"))
        }
    }
}

/// Global phase controller settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseConfig {
    /// Tension at which NOMINAL becomes PREDICTIVE.
    #[serde(default = "default_predictive_threshold")]
    pub predictive_threshold: f64,

    /// Tension at which any phase becomes FIREWALL.
    #[serde(default = "default_firewall_threshold")]
    pub firewall_threshold: f64,

    /// Tension below which FIREWALL returns to NOMINAL.
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold: f64,

    /// Damping multiplier applied to relaxation modules while FIREWALL.
    #[serde(default = "default_firewall_gamma_multiplier")]
    pub firewall_gamma_multiplier: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            predictive_threshold: default_predictive_threshold(),
            firewall_threshold: default_firewall_threshold(),
            exit_threshold: default_exit_threshold(),
            firewall_gamma_multiplier: default_firewall_gamma_multiplier(),
        }
    }
}

/// A control domain: one phase controller over the max tension of a set
/// of modules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DomainConfig {
    /// Domain identifier.
    pub id: DomainId,

    /// Member modules; empty means every module.
    #[serde(default)]
    pub modules: Vec<ModuleId>,

    /// Override for the global predictive threshold.
    #[serde(default)]
    pub predictive_threshold: Option<f64>,

    /// Override for the global firewall threshold.
    #[serde(default)]
    pub firewall_threshold: Option<f64>,

    /// Override for the global exit threshold.
    #[serde(default)]
    pub exit_threshold: Option<f64>,

    /// Override for the global FIREWALL damping multiplier.
    #[serde(default)]
    pub firewall_gamma_multiplier: Option<f64>,
}

impl DomainConfig {
    /// A domain over every module using the global settings.
    pub fn global() -> Self {
        Self {
            id: DomainId::from(GLOBAL_DOMAIN),
            modules: Vec::new(),
            predictive_threshold: None,
            firewall_threshold: None,
            exit_threshold: None,
            firewall_gamma_multiplier: None,
        }
    }

    /// Effective thresholds, falling back to the global ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHysteresis`] if the merged thresholds
    /// do not form a valid band.
    pub fn thresholds(&self, global: &PhaseConfig) -> Result<PhaseThresholds, ConfigError> {
        PhaseThresholds::new(
            self.id.as_str(),
            self.predictive_threshold.unwrap_or(global.predictive_threshold),
            self.firewall_threshold.unwrap_or(global.firewall_threshold),
            self.exit_threshold.unwrap_or(global.exit_threshold),
        )
    }

    /// Effective FIREWALL damping multiplier.
    pub fn multiplier(&self, global: &PhaseConfig) -> f64 {
        self.firewall_gamma_multiplier
            .unwrap_or(global.firewall_gamma_multiplier)
    }
}

/// Erosion resolver settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErosionConfig {
    /// Module whose own tension erodes everyone else's resilience.
    #[serde(default)]
    pub source: Option<ModuleId>,

    /// Lowest erosion factor.
    #[serde(default = "default_erosion_floor")]
    pub floor: f64,
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            source: None,
            floor: default_erosion_floor(),
        }
    }
}

impl ErosionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if (0.0..=1.0).contains(&self.floor) {
            Ok(())
        } else {
            Err(ConfigError::invalid("erosion.floor", "must be in [0, 1]"))
        }
    }
}

/// Inclusive `[min, max]` range used for hard clamps.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bounds {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl Bounds {
    /// Create a range.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a finite value into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.min.is_finite() && self.max.is_finite() && self.min <= self.max {
            Ok(())
        } else {
            Err(ConfigError::invalid(field, "needs finite min <= max"))
        }
    }
}

/// Hard clamps applied by the integrator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClampConfig {
    /// Tension range.
    #[serde(default = "default_tension_bounds")]
    pub tension: Bounds,

    /// Excitation range.
    #[serde(default = "default_excitation_bounds")]
    pub excitation: Bounds,
}

impl Default for ClampConfig {
    fn default() -> Self {
        Self {
            tension: default_tension_bounds(),
            excitation: default_excitation_bounds(),
        }
    }
}

/// Operator intervention parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterventionConfig {
    /// Fraction of tension kept by a reset.
    #[serde(default = "default_tension_retained")]
    pub tension_retained: f64,

    /// Factor applied to the runtime damping by a reset.
    #[serde(default = "default_damping_restore")]
    pub damping_restore: f64,

    /// Integrity debited per intervention.
    #[serde(default = "default_intervention_cost")]
    pub cost: Decimal,

    /// Integrity may never drop below this.
    #[serde(default = "default_integrity_floor")]
    pub floor: Decimal,

    /// Resilience a reinforce intervention raises the module to.
    #[serde(default = "default_reinforce_resilience")]
    pub reinforce_resilience: f64,

    /// Base fraction of runtime damping lost per tick. Modules with a
    /// spent-down integrity budget decay up to twice as fast.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            tension_retained: default_tension_retained(),
            damping_restore: default_damping_restore(),
            cost: default_intervention_cost(),
            floor: default_integrity_floor(),
            reinforce_resilience: default_reinforce_resilience(),
            decay_rate: default_decay_rate(),
        }
    }
}

impl InterventionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.tension_retained) {
            return Err(ConfigError::invalid(
                "intervention.tension_retained",
                "must be in [0, 1]",
            ));
        }
        if !(self.damping_restore.is_finite() && self.damping_restore > 0.0) {
            return Err(ConfigError::invalid(
                "intervention.damping_restore",
                "must be a positive number",
            ));
        }
        if self.cost.is_sign_negative() {
            return Err(ConfigError::invalid("intervention.cost", "must be >= 0"));
        }
        if self.floor.is_sign_negative() {
            return Err(ConfigError::invalid("intervention.floor", "must be >= 0"));
        }
        if !(self.reinforce_resilience.is_finite() && self.reinforce_resilience >= 0.0) {
            return Err(ConfigError::invalid(
                "intervention.reinforce_resilience",
                "must be >= 0",
            ));
        }
        if !(0.0..0.5).contains(&self.decay_rate) {
            return Err(ConfigError::invalid(
                "intervention.decay_rate",
                "must be in [0, 0.5)",
            ));
        }
        Ok(())
    }
}

/// A module declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModuleConfig {
    /// Module identifier.
    pub id: ModuleId,

    /// Initial excitation.
    #[serde(default)]
    pub excitation: f64,

    /// Initial resilience.
    #[serde(default)]
    pub resilience: f64,

    /// Tension formula.
    #[serde(default)]
    pub kind: TensionKind,

    /// Intervention budget, if interventions on this module are costed.
    #[serde(default)]
    pub integrity: Option<Decimal>,

    /// Per-module FIREWALL damping multiplier, overriding the domain's.
    #[serde(default)]
    pub firewall_gamma_multiplier: Option<f64>,

    /// Inline coefficients; take precedence over the coefficient provider.
    #[serde(default)]
    pub coefficients: Option<Coefficients>,
}

impl ModuleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let field = |name: &str| format!("modules.{}.{name}", self.id);
        if !self.excitation.is_finite() {
            return Err(ConfigError::invalid(field("excitation"), "must be finite"));
        }
        if !(self.resilience.is_finite() && self.resilience >= 0.0) {
            return Err(ConfigError::invalid(field("resilience"), "must be >= 0"));
        }
        if let Some(m) = self.firewall_gamma_multiplier {
            validate_multiplier(&field("firewall_gamma_multiplier"), m)?;
        }
        if self.integrity.is_some_and(|i| i.is_sign_negative()) {
            return Err(ConfigError::invalid(field("integrity"), "must be >= 0"));
        }
        Ok(())
    }
}

/// An edge declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgeConfig {
    /// Module whose tension propagates.
    pub source: ModuleId,

    /// Module whose excitation receives it.
    pub target: ModuleId,

    /// Configured weight (0 declares a dormant bypass edge).
    #[serde(default)]
    pub base_weight: f64,

    /// Target tension above which the edge's breaker trips.
    #[serde(default)]
    pub breaker_threshold: Option<f64>,
}

impl EdgeConfig {
    fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if !(self.base_weight.is_finite() && self.base_weight >= 0.0) {
            return Err(ConfigError::invalid(context, "base_weight must be >= 0"));
        }
        if self.breaker_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(ConfigError::invalid(context, "breaker_threshold must be finite"));
        }
        Ok(())
    }
}

/// Seeded stochastic excitation forcing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForcingConfig {
    /// Generator seed; falls back to `simulation.seed`.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Largest excitation delta injected per module per tick.
    pub amplitude: f64,

    /// Modules that receive forcing.
    #[serde(default)]
    pub modules: Vec<ModuleId>,
}

impl ForcingConfig {
    fn validate(&self, modules: &BTreeSet<&ModuleId>) -> Result<(), ConfigError> {
        if !(self.amplitude.is_finite() && self.amplitude >= 0.0) {
            return Err(ConfigError::invalid("forcing.amplitude", "must be >= 0"));
        }
        if let Some(missing) = self.modules.iter().find(|m| !modules.contains(m)) {
            return Err(ConfigError::dangling("forcing", missing));
        }
        Ok(())
    }
}

/// History recorder and writer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Entries kept in memory (and channel slots for the writer).
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// JSON-lines file the binary writes snapshots to.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            output: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_dt() -> f64 {
    0.05
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_predictive_threshold() -> f64 {
    0.4
}

const fn default_firewall_threshold() -> f64 {
    1.0
}

const fn default_exit_threshold() -> f64 {
    0.4
}

const fn default_firewall_gamma_multiplier() -> f64 {
    2.5
}

const fn default_erosion_floor() -> f64 {
    0.1
}

const fn default_tension_bounds() -> Bounds {
    Bounds::new(0.0, 5.0)
}

const fn default_excitation_bounds() -> Bounds {
    Bounds::new(0.0, 10.0)
}

const fn default_tension_retained() -> f64 {
    0.6
}

const fn default_damping_restore() -> f64 {
    1.15
}

const fn default_intervention_cost() -> Decimal {
    Decimal::from_parts(2, 0, 0, false, 2)
}

const fn default_integrity_floor() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 1)
}

const fn default_reinforce_resilience() -> f64 {
    1.5
}

const fn default_decay_rate() -> f64 {
    0.0001
}

const fn default_history_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::policy::Predicate;

    const NETWORK: &str = r"
modules:
  - id: urban
    excitation: 0.2
    resilience: 0.8
    coefficients: { beta: 2.0, gamma: 0.5 }
  - id: social
    kind: relaxation
    excitation: 0.1
    resilience: 0.6
    integrity: 1.0
    coefficients: { beta: 3.5, gamma: 0.8 }
  - id: finance
    resilience: 1.0
    coefficients: { alpha: 0.1, beta: 1.0, gamma: 1.0 }
edges:
  - { source: urban, target: social, base_weight: 0.3 }
  - { source: social, target: finance, base_weight: 0.0 }
  - { source: urban, target: finance, base_weight: 0.1, breaker_threshold: 0.9 }
";

    #[test]
    fn default_config_values() {
        let config = SimulationConfig::default();
        assert!((config.simulation.dt - 0.05).abs() < 1e-12);
        assert_eq!(config.simulation.seed, 42);
        assert!((config.phase.firewall_threshold - 1.0).abs() < 1e-12);
        assert!((config.erosion.floor - 0.1).abs() < 1e-12);
        assert_eq!(config.intervention.cost, dec!(0.02));
        assert_eq!(config.intervention.floor, dec!(0.1));
        assert_eq!(config.history.capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = SimulationConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn parse_network_and_policies() {
        let yaml = format!(
            "{NETWORK}
erosion:
  source: urban
  floor: 0.2
domains:
  - id: core
    modules: [social, finance]
    firewall_gamma_multiplier: 3.0
policies:
  - id: shed-social
    when: {{ kind: tension_above, module: social, threshold: 0.8 }}
    action: {{ kind: load_shed, source: urban, target: social, factor: 0.5 }}
  - id: social-bypass
    when:
      kind: all
      of:
        - {{ kind: tension_above, module: social, threshold: 0.8 }}
        - {{ kind: tension_below, module: finance, threshold: 0.4 }}
    action: {{ kind: bypass, source: social, target: finance, weight: 0.01 }}
  - id: panic
    when: {{ kind: phase_is, domain: core, phase: firewall }}
    action: {{ kind: catastrophic_feedback, source: social, target: finance, severity_threshold: 0.9 }}
"
        );
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert_eq!(config.modules.len(), 3);
        assert_eq!(config.edges.len(), 3);
        assert_eq!(config.policies.len(), 3);
        let social = config.modules.get(1).unwrap();
        assert_eq!(social.kind, TensionKind::Relaxation);
        assert_eq!(social.integrity, Some(dec!(1.0)));
        assert!(matches!(
            config.policies.get(1).map(|r| &r.when),
            Some(Predicate::All { of }) if of.len() == 2
        ));
        assert!(matches!(
            config.policies.get(2).map(|r| &r.action),
            Some(Action::CatastrophicFeedback { resilience_factor, .. })
                if (resilience_factor - 0.3).abs() < 1e-12
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_dangling_edge() {
        let yaml = format!("{NETWORK}  - {{ source: urban, target: ghost, base_weight: 0.1 }}\n");
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DanglingReference { ref id, .. }) if id == "ghost"
        ));
    }

    #[test]
    fn rejects_inverted_hysteresis() {
        let yaml = format!("{NETWORK}phase:\n  firewall_threshold: 0.5\n  exit_threshold: 0.5\n");
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHysteresis { .. })
        ));
    }

    #[test]
    fn rejects_inverted_domain_override() {
        let yaml = format!("{NETWORK}domains:\n  - id: core\n    exit_threshold: 1.2\n");
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHysteresis { ref context, .. }) if context == "core"
        ));
    }

    #[test]
    fn rejects_unknown_policy_reference() {
        let yaml = format!(
            "{NETWORK}policies:
  - id: watch-ghost
    when: {{ kind: tension_above, module: ghost, threshold: 0.5 }}
    action: {{ kind: reinforce, module: urban, resilience: 1.5 }}
"
        );
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DanglingReference { .. })
        ));
    }

    #[test]
    fn rejects_bypass_on_live_edge() {
        let yaml = format!(
            "{NETWORK}policies:
  - id: bad-bypass
    action: {{ kind: bypass, source: urban, target: social, weight: 0.5 }}
"
        );
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_unknown_erosion_source() {
        let yaml = format!("{NETWORK}erosion:\n  source: weather\n");
        let config = SimulationConfig::parse(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DanglingReference { ref context, .. }) if context == "erosion.source"
        ));
    }

    #[test]
    fn rejects_non_positive_dt() {
        let config = SimulationConfig::parse("simulation:\n  dt: 0.0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn decay_rate_defaults_and_bounds() {
        let config = SimulationConfig::default();
        assert!((config.intervention.decay_rate - 0.0001).abs() < 1e-15);
        let config = SimulationConfig::parse("intervention:\n  decay_rate: 0.5\n").unwrap();
        assert!(config.validate().is_err());
        let config = SimulationConfig::parse("intervention:\n  decay_rate: -0.01\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("cascade-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
            assert!(config.unwrap().validate().is_ok());
        }
    }
}

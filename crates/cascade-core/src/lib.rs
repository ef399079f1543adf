//! Tick engine and adaptive control for the Cascade simulator.
//!
//! This crate owns the per-tick cycle: signal injection, tension
//! integration with erosion, hysteretic phase control, and the adaptive
//! policy engine that reshapes the coupling graph in response.
//!
//! # Modules
//!
//! - [`config`] -- Loading `cascade-config.yaml` into strongly-typed structs.
//! - [`coefficients`] -- [`CoefficientProvider`] and its static and
//!   directory-backed implementations.
//! - [`erosion`] -- Global resilience erosion driven by one source module.
//! - [`integrator`] -- Tension update and propagation for one timestep.
//! - [`phase`] -- NOMINAL / PREDICTIVE / FIREWALL hysteresis per domain.
//! - [`policy`] -- Declarative rules: load shedding, circuit breakers,
//!   bypasses, lookahead, catastrophic feedback.
//! - [`intervention`] -- Budget-costed operator resets.
//! - [`engine`] -- [`CascadeEngine`], the atomic tick.
//! - [`signal`] -- Per-tick excitation input.
//! - [`history`] -- Snapshot sinks.
//! - [`operator`] -- Shared runtime control state.
//! - [`runner`] -- The real-time loop.
//!
//! [`CoefficientProvider`]: coefficients::CoefficientProvider
//! [`CascadeEngine`]: engine::CascadeEngine

pub mod coefficients;
pub mod config;
pub mod engine;
pub mod erosion;
pub mod history;
pub mod integrator;
pub mod intervention;
pub mod operator;
pub mod phase;
pub mod policy;
pub mod runner;
pub mod signal;

pub use config::{ConfigError, SimulationConfig};
pub use engine::{CascadeEngine, TickError};

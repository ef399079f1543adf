//! Shared type definitions for the Cascade simulator.
//!
//! This crate is the single source of truth for the value types that flow
//! between the network store, the tick engine, and history consumers.
//!
//! # Modules
//!
//! - [`ids`] -- Name-based identifiers for modules, control domains, and rules
//! - [`enums`] -- Phase, tension-formula, and intervention enumerations
//! - [`structs`] -- Module state, coupling edges, and calibration coefficients
//! - [`actions`] -- Policy action records carried by snapshots
//! - [`snapshot`] -- The immutable per-tick [`Snapshot`]
//!
//! [`Snapshot`]: snapshot::Snapshot

pub mod actions;
pub mod enums;
pub mod ids;
pub mod snapshot;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::{PolicyAction, PolicyEffect};
pub use enums::{InterventionKind, Phase, TensionKind};
pub use ids::{DomainId, ModuleId, RuleId};
pub use snapshot::Snapshot;
pub use structs::{Coefficients, EdgeKey, EdgeState, ModuleState};

//! Module state and coupling topology for the Cascade simulator.
//!
//! This crate models the network the tick engine operates on: an arena of
//! module states addressed by stable [`ModuleId`]s, and a directed weighted
//! coupling graph whose edge set is fixed once loading finishes.
//!
//! # Modules
//!
//! - [`error`] -- Error types for store and graph operations.
//! - [`store`] -- [`ModuleStore`], the per-module scalar state arena.
//! - [`graph`] -- [`CouplingGraph`], weighted edges with breaker flags and
//!   deterministic iteration order.
//!
//! [`ModuleId`]: cascade_types::ModuleId

pub mod error;
pub mod graph;
pub mod store;

// Re-export primary types at crate root.
pub use error::NetworkError;
pub use graph::CouplingGraph;
pub use store::ModuleStore;

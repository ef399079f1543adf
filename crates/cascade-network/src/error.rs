//! Error types for the `cascade-network` crate.
//!
//! All fallible operations in this crate return [`NetworkError`]. Lookups of
//! unknown ids fail before any mutation happens.

use cascade_types::ModuleId;

/// Errors that can occur during store and graph operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// A module was not found in the store.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// No edge connects the given modules.
    #[error("edge not found: {from} -> {to}")]
    EdgeNotFound {
        /// Source module.
        from: ModuleId,
        /// Target module.
        to: ModuleId,
    },

    /// A module with the same id was already inserted.
    #[error("duplicate module id: {0}")]
    DuplicateModule(ModuleId),

    /// An edge with the same endpoints was already declared.
    #[error("duplicate edge: {from} -> {to}")]
    DuplicateEdge {
        /// Source module.
        from: ModuleId,
        /// Target module.
        to: ModuleId,
    },

    /// An edge references a module that does not exist.
    #[error("edge {from} -> {to} references unknown module {missing}")]
    DanglingEdge {
        /// Source module.
        from: ModuleId,
        /// Target module.
        to: ModuleId,
        /// The endpoint that is not in the store.
        missing: ModuleId,
    },
}

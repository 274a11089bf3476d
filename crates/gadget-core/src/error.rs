//! Error types for the gadget lifecycle manager.
//!
//! [`ModuleError`] covers everything that can go wrong while resolving and
//! loading a gadget binary; [`GadgetError`] is the crate-level error returned
//! by the manager and the facade, wrapping [`ModuleError`] where a load was
//! involved. All of these are local, recoverable failures: none of them
//! should ever terminate the host process.

use std::path::PathBuf;

use crate::types::GadgetId;

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("no gadget binary resolves for '{name}'")]
    NotFound { name: String },

    #[error("failed to load '{}': {source}", path.display())]
    LoadFailure {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("entry symbol '{symbol}' missing in '{}': {source}", path.display())]
    SymbolMissing {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("module init for '{name}' returned {code}")]
    InitFailure { name: String, code: i32 },
}

#[derive(Debug, thiserror::Error)]
pub enum GadgetError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("module error: {0}")]
    Module(#[from] ModuleError),

    /// The handle does not refer to a live instance in the tree.
    #[error("invalid gadget handle {0}")]
    InvalidHandle(GadgetId),

    #[error("gadget {0} is already being destroyed")]
    AlreadyDestroying(GadgetId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The module's create callback produced no visual root.
    #[error("create callback of '{name}' produced no layout")]
    CreateFailed { name: String },
}

/// Shorthand for Result with the crate error type.
pub type Result<T> = std::result::Result<T, GadgetError>;

//! Recoverable engine errors
//!
//! Contract violations (double attach, re-entrant locking, ...) are not
//! represented here: they panic at the point of detection.

use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("provider '{name}' is not registered with this engine")]
    InvalidProvider { name: String },

    #[error("failed to allocate {what}")]
    AllocationFailed {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("session table is full ({capacity} slots)")]
    SessionTableFull { capacity: usize },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

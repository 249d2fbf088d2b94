//! Error types for journal-core

use thiserror::Error;

use crate::retry::WriteOp;

/// Result type alias using journal-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the journal controller.
///
/// Adapter-level errors (`StoreError`, `AuthError`) are folded into these
/// variants at the controller boundary so presentation code only ever has to
/// render one taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Required service credentials or identifiers are missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Identity handshake failed
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Live query failed; a fresh subscribe is required
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A write still failed after every retry attempt
    #[error("Failed to {operation} entry after {attempts} attempt(s): {cause}")]
    Write {
        operation: WriteOp,
        attempts: u32,
        cause: String,
    },

    /// Caller input rejected before any network attempt
    #[error("Invalid input: {0}")]
    Validation(String),
}

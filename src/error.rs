//! Failures worth telling apart from a generic [`anyhow`] chain.
//!
//! Local I/O and store trouble propagate as plain [`anyhow::Error`]s
//! with context; these are the conditions callers might want to match.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or bogus configuration - an unknown backup name,
    /// no scratch directory for verification, etc.
    #[error("configuration: {0}")]
    Configuration(String),

    /// The operation's preconditions weren't met.
    #[error("precondition: {0}")]
    Precondition(String),

    /// The archive and reality disagree.
    #[error("integrity: {0}")]
    Integrity(String),
}

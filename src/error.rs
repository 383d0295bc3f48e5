//! Error types shared by the parser, the construction heuristics and the
//! transport assignment.

use thiserror::Error;

/// Errors raised while loading or solving an instance.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Malformed, out-of-range or negative input data
    #[error("invalid instance: {0}")]
    InstanceValidation(String),

    /// A zone or task cannot be serviced by any vehicle, even alone
    #[error("cannot service {zone}: {reason}")]
    InfeasibleRoute { zone: String, reason: String },

    /// A guarantee of the instance model was broken (e.g. no transfer station reachable)
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Unreadable solver configuration file
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SolverError {
    pub fn infeasible(zone: impl Into<String>, reason: impl Into<String>) -> Self {
        SolverError::InfeasibleRoute {
            zone: zone.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;

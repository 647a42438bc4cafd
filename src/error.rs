//! Error types shared by every algorithm in the crate.

use thiserror::Error;

/// Failure kinds reported by model construction and parameter estimation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A shape, type or value mismatch found before any computation ran.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A denominator was zero or not finite while estimating parameters.
    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn numeric_degeneracy(msg: impl Into<String>) -> Self {
        Error::NumericDegeneracy(msg.into())
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

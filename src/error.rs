//! Fatal error kinds for the extraction run.
//!
//! Reference and geometry problems are not represented here: the offending
//! entity is dropped with a warning and extraction continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing or corrupt input, or a schema fingerprint mismatch.
    #[error("input error: {0}")]
    Input(String),

    /// The profile produced an invalid configuration or classified
    /// everything away (no edges remain after parsing).
    #[error("profile error: {0}")]
    Profile(String),

    /// No snappable segments survive startpoint filtering; a spatial
    /// index over nothing would make every query fail.
    #[error("no startpoint segments remain; check travel modes in the profile")]
    EmptyIndex,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

//! Crate-level error type.
//!
//! Each module reports its own error enum. [`Error`] wraps them for callers
//! that drive several subsystems and want a single `?` target.

use crate::behavior::CallbackError;
use crate::collection::RuleError;
use crate::config::ConfigError;
use crate::dice::DiceError;
use crate::lifecycle::DispatchError;
use crate::snapshot::SnapshotError;
use crate::spells::ScalingError;

/// Main error type for the rules core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rule collection error
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Lifecycle dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Callback error raised outside a dispatch
    #[error("Callback error: {0}")]
    Callback(#[from] CallbackError),

    /// Spell scaling error
    #[error("Scaling error: {0}")]
    Scaling(#[from] ScalingError),

    /// Dice notation error
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    /// Snapshot error
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the caller should present this as a declined action rather
    /// than a failure.
    pub fn is_declined(&self) -> bool {
        matches!(self, Error::Scaling(error) if error.is_declined())
    }
}

/// Result alias for the rules core.
pub type Result<T> = std::result::Result<T, Error>;

//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How [`RuleCollection`](crate::RuleCollection) picks the authoritative rule
/// when several share a type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypePrecedence {
    /// The most recently added or updated enabled rule wins. When it goes away
    /// the lowest-priority-value survivor takes over.
    #[default]
    MostRecent,
    /// The enabled rule with the lowest priority value always wins; ties go
    /// to the most recently touched.
    HighestPriority,
}

/// Configuration for a rule collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulesConfig {
    /// Tie-break policy for type lookups.
    pub type_precedence: TypePrecedence,
}

impl RulesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the type-lookup tie-break policy.
    pub fn with_type_precedence(mut self, precedence: TypePrecedence) -> Self {
        self.type_precedence = precedence;
        self
    }

    /// Load from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

//! Rules core for tabletop character sheets.
//!
//! This crate provides:
//! - A per-character rule store with priority ordering and type lookups
//! - Serializable predicates that gate rule activation
//! - Lifecycle dispatch that runs rule callbacks at document phases
//! - Spell scaling resolution for upcast casts
//!
//! # Quick Start
//!
//! ```
//! use dnd_rules::{
//!     AddRuleOptions, BehaviorRegistry, LifecycleDispatcher, Phase, PhaseContext,
//!     Predicate, RuleCollection, RuleData,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rules = RuleCollection::new("thorin")
//!     .with_registry(Arc::new(BehaviorRegistry::with_builtins()));
//!
//! rules.add_rule(
//!     RuleData::new("shield-of-faith", "condition")
//!         .with_handler("modifier", json!({"path": "ac", "amount": 2}))
//!         .with_predicate(Predicate::eq("concentrating", true)),
//!     AddRuleOptions::default(),
//! )?;
//!
//! let mut ctx = PhaseContext::new("thorin", json!({"ac": 16, "concentrating": true}));
//! LifecycleDispatcher::new()
//!     .dispatch(&rules, Phase::AfterPrepareData, &mut ctx)
//!     .await?
//!     .ensure_clean()?;
//!
//! assert_eq!(ctx.get("ac"), Some(&json!(18)));
//! # Ok(())
//! # }
//! ```

pub mod behavior;
pub mod collection;
pub mod config;
pub mod dice;
pub mod error;
pub mod lifecycle;
pub mod path;
pub mod predicate;
pub mod rule;
pub mod snapshot;
pub mod spells;
pub mod testing;

// Primary public API
pub use behavior::{
    BehaviorRegistry, CallbackError, FnBehavior, PhaseOutcome, RuleBehavior, StructuralHint,
};
pub use collection::{RuleCollection, RuleError};
pub use config::{RulesConfig, TypePrecedence};
pub use dice::{DiceError, DiceSpec};
pub use error::Error;
pub use lifecycle::{
    DispatchError, DispatchReport, LifecycleDispatcher, Phase, PhaseContext,
};
pub use predicate::Predicate;
pub use rule::{AddRuleOptions, Rule, RuleData, RuleId, RuleKind, RuleUpdate};
pub use snapshot::{RuleSnapshot, SnapshotError};
pub use spells::{
    ChoiceSelection, ScalingChoice, ScalingDelta, ScalingError, ScalingMode, SpellScalingResolver,
    SpellScalingSpec, UpcastResult,
};

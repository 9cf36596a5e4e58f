//! Rule behaviors: the callbacks a rule runs at lifecycle phases.
//!
//! A behavior advertises which phases it handles through [`RuleBehavior::phases`].
//! The dispatcher consults only that capability set, never the concrete type,
//! so new behaviors plug in without touching dispatch.
//!
//! Behaviors cannot be persisted. Raw rule data names a `handler` instead, and a
//! [`BehaviorRegistry`] turns that name plus the rule payload back into a
//! behavior when the rule is added.

use crate::lifecycle::{Phase, PhaseContext};
use crate::path;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a rule callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallbackError {
    pub message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A document change requested by a callback.
///
/// The dispatcher only collects these; the document layer applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StructuralHint {
    #[serde(rename_all = "camelCase")]
    Create { document_type: String, data: Value },
    #[serde(rename_all = "camelCase")]
    Delete { document_type: String, id: String },
}

impl StructuralHint {
    pub fn create(document_type: impl Into<String>, data: Value) -> Self {
        StructuralHint::Create {
            document_type: document_type.into(),
            data,
        }
    }

    pub fn delete(document_type: impl Into<String>, id: impl Into<String>) -> Self {
        StructuralHint::Delete {
            document_type: document_type.into(),
            id: id.into(),
        }
    }
}

/// What a callback hands back to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    pub hints: Vec<StructuralHint>,
}

impl PhaseOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_hint(mut self, hint: StructuralHint) -> Self {
        self.hints.push(hint);
        self
    }
}

/// Lifecycle callbacks attached to a rule.
///
/// Every callback may suspend. The dispatcher awaits each one before moving
/// to the next rule in the phase.
#[async_trait]
pub trait RuleBehavior: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Phases this behavior has a callback for. Other phases are skipped.
    fn phases(&self) -> &[Phase];

    /// Run the callback for `phase`.
    async fn on_phase(
        &self,
        phase: Phase,
        ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError>;

    fn handles(&self, phase: Phase) -> bool {
        self.phases().contains(&phase)
    }
}

type SyncCallback =
    dyn Fn(Phase, &mut PhaseContext) -> Result<PhaseOutcome, CallbackError> + Send + Sync;

/// Adapts a synchronous closure into a [`RuleBehavior`].
pub struct FnBehavior {
    name: String,
    phases: Vec<Phase>,
    callback: Box<SyncCallback>,
}

impl FnBehavior {
    pub fn new<F>(
        name: impl Into<String>,
        phases: impl IntoIterator<Item = Phase>,
        callback: F,
    ) -> Self
    where
        F: Fn(Phase, &mut PhaseContext) -> Result<PhaseOutcome, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            phases: phases.into_iter().collect(),
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for FnBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBehavior")
            .field("name", &self.name)
            .field("phases", &self.phases)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RuleBehavior for FnBehavior {
    fn name(&self) -> &str {
        &self.name
    }

    fn phases(&self) -> &[Phase] {
        &self.phases
    }

    async fn on_phase(
        &self,
        phase: Phase,
        ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError> {
        (self.callback)(phase, ctx)
    }
}

// ============================================================================
// Built-in behaviors
// ============================================================================

/// Adds a flat amount to a numeric field during data preparation.
///
/// Integer fields stay integers when the amount is whole. A missing field
/// counts as zero. A path blocked by a non-object parent fails the callback
/// and leaves the data untouched.
///
/// Payload: `{"path": "attributes.ac.bonus", "amount": 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub path: String,
    pub amount: f64,
}

impl Modifier {
    pub fn new(path: impl Into<String>, amount: f64) -> Self {
        Self {
            path: path.into(),
            amount,
        }
    }

    fn add_to(&self, current: &Number) -> Result<Number, CallbackError> {
        let overflow = || CallbackError::new(format!("{} overflowed", self.path));

        if let (Some(base), Some(step)) = (current.as_i64(), whole(self.amount)) {
            return base.checked_add(step).map(Number::from).ok_or_else(overflow);
        }

        let base = current
            .as_f64()
            .ok_or_else(|| CallbackError::new(format!("{} is not numeric", self.path)))?;
        Number::from_f64(base + self.amount).ok_or_else(overflow)
    }
}

/// `value` as an `i64` when it has no fractional part and fits exactly.
fn whole(value: f64) -> Option<i64> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    (value.fract() == 0.0 && value.abs() <= EXACT).then_some(value as i64)
}

#[async_trait]
impl RuleBehavior for Modifier {
    fn name(&self) -> &str {
        "modifier"
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::AfterPrepareData]
    }

    async fn on_phase(
        &self,
        _phase: Phase,
        ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError> {
        let next = match path::lookup(&ctx.data, &self.path) {
            None | Some(Value::Null) => self.add_to(&Number::from(0))?,
            Some(Value::Number(current)) => self.add_to(current)?,
            Some(_) => {
                return Err(CallbackError::new(format!("{} is not numeric", self.path)));
            }
        };
        if !path::assign(&mut ctx.data, &self.path, Value::Number(next)) {
            return Err(CallbackError::new(format!("{} is not writable", self.path)));
        }
        Ok(PhaseOutcome::none())
    }
}

/// Asks the document layer to create an embedded document when the owner is
/// created, and to delete it again when the owner is deleted.
///
/// Payload: `{"documentType": "Item", "id": "torch", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantDocument {
    pub document_type: String,
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

#[async_trait]
impl RuleBehavior for GrantDocument {
    fn name(&self) -> &str {
        "grantDocument"
    }

    fn phases(&self) -> &[Phase] {
        &[Phase::PreCreate, Phase::PreDelete]
    }

    async fn on_phase(
        &self,
        phase: Phase,
        _ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError> {
        let hint = match phase {
            Phase::PreCreate => {
                let mut data = self.data.clone();
                path::assign(&mut data, "id", Value::String(self.id.clone()));
                StructuralHint::create(self.document_type.clone(), data)
            }
            _ => StructuralHint::delete(self.document_type.clone(), self.id.clone()),
        };
        Ok(PhaseOutcome::none().with_hint(hint))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Builds a behavior from a rule payload.
pub type BehaviorFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn RuleBehavior>, CallbackError> + Send + Sync>;

/// Maps handler names from raw rule data to behavior factories.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    factories: HashMap<String, BehaviorFactory>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `modifier` and `grantDocument` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("modifier", |payload| {
            let modifier: Modifier = serde_json::from_value(payload.clone())
                .map_err(|e| CallbackError::new(format!("bad modifier payload: {e}")))?;
            Ok(Arc::new(modifier) as Arc<dyn RuleBehavior>)
        });
        registry.register("grantDocument", |payload| {
            let grant: GrantDocument = serde_json::from_value(payload.clone())
                .map_err(|e| CallbackError::new(format!("bad grantDocument payload: {e}")))?;
            Ok(Arc::new(grant) as Arc<dyn RuleBehavior>)
        });
        registry
    }

    pub fn register<F>(&mut self, handler: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn RuleBehavior>, CallbackError> + Send + Sync + 'static,
    {
        self.factories.insert(handler.into(), Arc::new(factory));
    }

    pub fn contains(&self, handler: &str) -> bool {
        self.factories.contains_key(handler)
    }

    /// Build the behavior for `handler`. `None` when the handler is unknown.
    pub fn build(
        &self,
        handler: &str,
        payload: &Value,
    ) -> Option<Result<Arc<dyn RuleBehavior>, CallbackError>> {
        self.factories.get(handler).map(|factory| factory(payload))
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<_> = self.factories.keys().collect();
        handlers.sort();
        f.debug_struct("BehaviorRegistry")
            .field("handlers", &handlers)
            .finish()
    }
}

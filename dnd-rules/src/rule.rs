//! The rule model: one prioritized, optionally-predicated unit of behavior.
//!
//! Rules are built from [`RuleData`] and live only inside a
//! [`RuleCollection`](crate::RuleCollection). Their fields are read-only from
//! outside; every change goes through the collection so its indices stay in
//! step.

use crate::behavior::RuleBehavior;
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a rule, unique within its owning collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for data that arrives without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Rule type tag. Known tags get their own variant; anything else is kept
/// verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    Feature,
    Condition,
    Boon,
    Custom(String),
}

impl RuleKind {
    pub fn name(&self) -> &str {
        match self {
            RuleKind::Feature => "feature",
            RuleKind::Condition => "condition",
            RuleKind::Boon => "boon",
            RuleKind::Custom(name) => name,
        }
    }
}

impl From<String> for RuleKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "feature" => RuleKind::Feature,
            "condition" => RuleKind::Condition,
            "boon" => RuleKind::Boon,
            _ => RuleKind::Custom(tag),
        }
    }
}

impl From<&str> for RuleKind {
    fn from(tag: &str) -> Self {
        RuleKind::from(tag.to_string())
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Custom(name) => name,
            known => known.name().to_string(),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A rule owned by a [`RuleCollection`](crate::RuleCollection).
#[derive(Clone)]
pub struct Rule {
    id: RuleId,
    kind: RuleKind,
    label: String,
    priority: i32,
    disabled: bool,
    predicate: Option<Predicate>,
    handler: Option<String>,
    payload: Value,
    behavior: Option<Arc<dyn RuleBehavior>>,
    /// Position in insertion order. Kept across in-place updates.
    pub(crate) seq: u64,
    /// Stamp of the last add or update, for type precedence.
    pub(crate) touched: u64,
}

impl Rule {
    pub(crate) fn from_data(
        id: RuleId,
        data: RuleData,
        behavior: Option<Arc<dyn RuleBehavior>>,
        seq: u64,
        touched: u64,
    ) -> Self {
        Self {
            id,
            kind: data.kind,
            label: data.label,
            priority: data.priority,
            disabled: data.disabled,
            predicate: data.predicate,
            handler: data.handler,
            payload: data.payload,
            behavior,
            seq,
            touched,
        }
    }

    pub(crate) fn apply(&mut self, update: RuleUpdate) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(label) = update.label {
            self.label = label;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(disabled) = update.disabled {
            self.disabled = disabled;
        }
        if let Some(predicate) = update.predicate {
            self.predicate = predicate;
        }
        if let Some(payload) = update.payload {
            self.payload = payload;
        }
        if let Some(behavior) = update.behavior {
            self.behavior = Some(behavior);
        }
    }

    pub fn id(&self) -> &RuleId {
        &self.id
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn handler(&self) -> Option<&str> {
        self.handler.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn behavior(&self) -> Option<&Arc<dyn RuleBehavior>> {
        self.behavior.as_ref()
    }

    /// Whether the rule would run right now for `context`.
    pub fn is_active(&self, context: &Value) -> bool {
        !self.disabled && self.predicate.as_ref().map_or(true, |p| p.evaluate(context))
    }

    /// Back to plain data. The behavior is carried along but never serialized.
    pub fn to_data(&self) -> RuleData {
        RuleData {
            id: Some(self.id.clone()),
            kind: self.kind.clone(),
            label: self.label.clone(),
            priority: self.priority,
            disabled: self.disabled,
            predicate: self.predicate.clone(),
            handler: self.handler.clone(),
            payload: self.payload.clone(),
            behavior: self.behavior.clone(),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("disabled", &self.disabled)
            .field("predicate", &self.predicate)
            .field("handler", &self.handler)
            .field("behavior", &self.behavior.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

// ============================================================================
// Input data
// ============================================================================

/// Plain rule data as produced by character sheets and the schema layer.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip)]
    pub behavior: Option<Arc<dyn RuleBehavior>>,
}

impl RuleData {
    pub fn new(id: impl Into<RuleId>, kind: impl Into<RuleKind>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::anonymous(kind)
        }
    }

    /// Data without an id; the collection generates one.
    pub fn anonymous(kind: impl Into<RuleKind>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            label: String::new(),
            priority: 0,
            disabled: false,
            predicate: None,
            handler: None,
            payload: Value::Null,
            behavior: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>, payload: Value) -> Self {
        self.handler = Some(handler.into());
        self.payload = payload;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn RuleBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }
}

impl fmt::Debug for RuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("disabled", &self.disabled)
            .field("predicate", &self.predicate)
            .field("handler", &self.handler)
            .field("payload", &self.payload)
            .field("behavior", &self.behavior.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

/// Options for [`RuleCollection::add_rule`](crate::RuleCollection::add_rule).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddRuleOptions {
    /// Replace an existing rule with the same id instead of failing.
    pub update: bool,
}

impl AddRuleOptions {
    pub fn update() -> Self {
        Self { update: true }
    }
}

/// Partial change applied by [`RuleCollection::update_rule`](crate::RuleCollection::update_rule).
///
/// `None` leaves a field untouched. `predicate: Some(None)` clears the predicate.
#[derive(Clone, Default)]
pub struct RuleUpdate {
    pub kind: Option<RuleKind>,
    pub label: Option<String>,
    pub priority: Option<i32>,
    pub disabled: Option<bool>,
    pub predicate: Option<Option<Predicate>>,
    pub payload: Option<Value>,
    pub behavior: Option<Arc<dyn RuleBehavior>>,
}

impl RuleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<RuleKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Some(predicate));
        self
    }

    pub fn clear_predicate(mut self) -> Self {
        self.predicate = Some(None);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn behavior(mut self, behavior: Arc<dyn RuleBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }
}

impl fmt::Debug for RuleUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleUpdate")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("disabled", &self.disabled)
            .field("predicate", &self.predicate)
            .field("payload", &self.payload)
            .field("behavior", &self.behavior.is_some())
            .finish()
    }
}

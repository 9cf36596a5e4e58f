//! Serializable boolean expressions that gate rule activation.
//!
//! Predicates are built from a plain JSON tree and evaluated against a JSON
//! context. Construction never fails: shapes that are not recognized become
//! [`PredicateNode::Invalid`], which always evaluates to `false` and keeps its
//! raw form so it can be written back unchanged.
//!
//! ```
//! use dnd_rules::Predicate;
//! use serde_json::json;
//!
//! let p = Predicate::from_raw(json!({"and": [{"eq": ["actor.level", 5]}]}));
//! assert!(p.evaluate(&json!({"actor": {"level": 5}})));
//! assert!(!p.evaluate(&json!({})));
//! ```

use crate::path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Ordering comparisons over numeric context values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl Comparison {
    /// Key used in the raw form.
    pub fn key(&self) -> &'static str {
        match self {
            Comparison::GreaterThan => "gt",
            Comparison::GreaterOrEqual => "gte",
            Comparison::LessThan => "lt",
            Comparison::LessOrEqual => "lte",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "gt" => Some(Comparison::GreaterThan),
            "gte" => Some(Comparison::GreaterOrEqual),
            "lt" => Some(Comparison::LessThan),
            "lte" => Some(Comparison::LessOrEqual),
            _ => None,
        }
    }

    fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparison::GreaterThan => actual > expected,
            Comparison::GreaterOrEqual => actual >= expected,
            Comparison::LessThan => actual < expected,
            Comparison::LessOrEqual => actual <= expected,
        }
    }
}

/// One node of a predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    /// Literal `true` or `false`.
    Constant(bool),
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    Compare {
        path: String,
        op: Comparison,
        value: f64,
        /// Operand exactly as written, so integers stay integers on the way out.
        raw: Value,
    },
    InSet { path: String, values: Vec<Value> },
    And(Vec<PredicateNode>),
    Or(Vec<PredicateNode>),
    Not(Box<PredicateNode>),
    /// Unrecognized shape. Evaluates to `false`.
    Invalid(Value),
}

impl PredicateNode {
    /// Parse a node from its raw form. Never fails.
    pub fn from_raw(raw: &Value) -> Self {
        match raw {
            Value::Bool(b) => PredicateNode::Constant(*b),
            Value::Object(map) if map.len() == 1 => {
                Self::parse_operator(map).unwrap_or_else(|| PredicateNode::Invalid(raw.clone()))
            }
            _ => PredicateNode::Invalid(raw.clone()),
        }
    }

    fn parse_operator(map: &Map<String, Value>) -> Option<Self> {
        let (key, args) = map.iter().next()?;
        match key.as_str() {
            "and" => Some(PredicateNode::And(Self::parse_children(args)?)),
            "or" => Some(PredicateNode::Or(Self::parse_children(args)?)),
            "not" => Some(PredicateNode::Not(Box::new(Self::from_raw(args)))),
            "eq" => {
                let (path, value) = Self::parse_pair(args)?;
                Some(PredicateNode::Equals {
                    path,
                    value: value.clone(),
                })
            }
            "ne" => {
                let (path, value) = Self::parse_pair(args)?;
                Some(PredicateNode::NotEquals {
                    path,
                    value: value.clone(),
                })
            }
            "in" => {
                let (path, values) = Self::parse_pair(args)?;
                Some(PredicateNode::InSet {
                    path,
                    values: values.as_array()?.clone(),
                })
            }
            other => {
                let op = Comparison::from_key(other)?;
                let (path, operand) = Self::parse_pair(args)?;
                Some(PredicateNode::Compare {
                    path,
                    op,
                    value: operand.as_f64()?,
                    raw: operand.clone(),
                })
            }
        }
    }

    fn parse_children(args: &Value) -> Option<Vec<PredicateNode>> {
        Some(args.as_array()?.iter().map(Self::from_raw).collect())
    }

    fn parse_pair(args: &Value) -> Option<(String, &Value)> {
        match args.as_array()?.as_slice() {
            [Value::String(path), operand] => Some((path.clone(), operand)),
            _ => None,
        }
    }

    /// Convert back to the raw form.
    pub fn to_raw(&self) -> Value {
        fn op(key: &str, args: Value) -> Value {
            let mut map = Map::new();
            map.insert(key.to_string(), args);
            Value::Object(map)
        }

        match self {
            PredicateNode::Constant(b) => Value::Bool(*b),
            PredicateNode::Equals { path, value } => {
                op("eq", Value::Array(vec![Value::String(path.clone()), value.clone()]))
            }
            PredicateNode::NotEquals { path, value } => {
                op("ne", Value::Array(vec![Value::String(path.clone()), value.clone()]))
            }
            PredicateNode::Compare { path, op: cmp, raw, .. } => op(
                cmp.key(),
                Value::Array(vec![Value::String(path.clone()), raw.clone()]),
            ),
            PredicateNode::InSet { path, values } => op(
                "in",
                Value::Array(vec![Value::String(path.clone()), Value::Array(values.clone())]),
            ),
            PredicateNode::And(children) => op(
                "and",
                Value::Array(children.iter().map(PredicateNode::to_raw).collect()),
            ),
            PredicateNode::Or(children) => op(
                "or",
                Value::Array(children.iter().map(PredicateNode::to_raw).collect()),
            ),
            PredicateNode::Not(child) => op("not", child.to_raw()),
            PredicateNode::Invalid(raw) => raw.clone(),
        }
    }

    /// Evaluate against a context. Pure and total.
    pub fn evaluate(&self, context: &Value) -> bool {
        match self {
            PredicateNode::Constant(b) => *b,
            PredicateNode::Equals { path, value } => {
                matches_value(path::lookup(context, path), value)
            }
            // A missing path proves nothing, so `ne` fails closed on it.
            PredicateNode::NotEquals { path, value } => path::lookup(context, path)
                .is_some_and(|actual| !matches_value(Some(actual), value)),
            PredicateNode::Compare { path, op, value, .. } => path::lookup(context, path)
                .and_then(Value::as_f64)
                .is_some_and(|actual| op.holds(actual, *value)),
            PredicateNode::InSet { path, values } => {
                let actual = path::lookup(context, path);
                actual.is_some() && values.iter().any(|v| matches_value(actual, v))
            }
            PredicateNode::And(children) => children.iter().all(|c| c.evaluate(context)),
            PredicateNode::Or(children) => children.iter().any(|c| c.evaluate(context)),
            // Negating garbage must not turn it into a pass.
            PredicateNode::Not(child) => !child.has_invalid() && !child.evaluate(context),
            PredicateNode::Invalid(_) => false,
        }
    }

    /// Whether this node or any descendant is unrecognized.
    pub fn has_invalid(&self) -> bool {
        match self {
            PredicateNode::Invalid(_) => true,
            PredicateNode::And(children) | PredicateNode::Or(children) => {
                children.iter().any(PredicateNode::has_invalid)
            }
            PredicateNode::Not(child) => child.has_invalid(),
            _ => false,
        }
    }
}

/// Equality with numeric coercion. A missing value only matches `null`.
fn matches_value(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(actual) => match (actual.as_f64(), expected.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => actual == expected,
        },
    }
}

/// A serializable boolean expression over a JSON context.
///
/// Serialization goes through the raw form, so a predicate stored by the
/// schema layer comes back with identical evaluation behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct Predicate {
    root: PredicateNode,
}

impl Predicate {
    /// Build a predicate from its raw form.
    pub fn from_raw(raw: Value) -> Self {
        Self {
            root: PredicateNode::from_raw(&raw),
        }
    }

    /// A predicate that always passes.
    pub fn always() -> Self {
        Self {
            root: PredicateNode::Constant(true),
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            root: PredicateNode::Equals {
                path: path.into(),
                value: value.into(),
            },
        }
    }

    pub fn one_of(path: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            root: PredicateNode::InSet {
                path: path.into(),
                values: values.into_iter().collect(),
            },
        }
    }

    pub fn at_least(path: impl Into<String>, value: i64) -> Self {
        Self {
            root: PredicateNode::Compare {
                path: path.into(),
                op: Comparison::GreaterOrEqual,
                value: value as f64,
                raw: Value::from(value),
            },
        }
    }

    pub fn at_most(path: impl Into<String>, value: i64) -> Self {
        Self {
            root: PredicateNode::Compare {
                path: path.into(),
                op: Comparison::LessOrEqual,
                value: value as f64,
                raw: Value::from(value),
            },
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        let mut children = match self.root {
            PredicateNode::And(children) => children,
            root => vec![root],
        };
        children.push(other.root);
        Self {
            root: PredicateNode::And(children),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        let mut children = match self.root {
            PredicateNode::Or(children) => children,
            root => vec![root],
        };
        children.push(other.root);
        Self {
            root: PredicateNode::Or(children),
        }
    }

    pub fn negate(self) -> Self {
        Self {
            root: PredicateNode::Not(Box::new(self.root)),
        }
    }

    pub fn root(&self) -> &PredicateNode {
        &self.root
    }

    /// Raw form suitable for persistence.
    pub fn to_raw(&self) -> Value {
        self.root.to_raw()
    }

    /// Evaluate against a context. Never panics; malformed parts fail closed.
    pub fn evaluate(&self, context: &Value) -> bool {
        self.root.evaluate(context)
    }

    /// Whether any part of the expression was unrecognized.
    pub fn is_malformed(&self) -> bool {
        self.root.has_invalid()
    }
}

impl From<Value> for Predicate {
    fn from(raw: Value) -> Self {
        Self::from_raw(raw)
    }
}

impl From<Predicate> for Value {
    fn from(predicate: Predicate) -> Self {
        predicate.to_raw()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

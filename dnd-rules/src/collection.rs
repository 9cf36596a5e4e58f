//! Per-character rule store.
//!
//! A [`RuleCollection`] holds every rule attached to one character. Rules are
//! keyed by id, and a secondary index maps each rule type to the one rule that
//! answers type lookups.
//!
//! # Type precedence
//!
//! With the default [`TypePrecedence::MostRecent`], the most recently added or
//! updated enabled rule of a type is authoritative. If that rule is deleted,
//! disabled or retyped, the index falls back to the enabled rule of that type
//! with the lowest priority value (most recently touched on ties), or is
//! cleared when none remain. Disabled rules never answer type lookups.

use crate::behavior::{BehaviorRegistry, RuleBehavior};
use crate::config::{RulesConfig, TypePrecedence};
use crate::rule::{AddRuleOptions, Rule, RuleData, RuleId, RuleKind, RuleUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from rule collection operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Rule already exists: {0}")]
    DuplicateRule(RuleId),

    #[error("Rule not found: {0}")]
    NotFound(RuleId),
}

/// The ordered, type-indexed rules of one character.
#[derive(Debug, Clone)]
pub struct RuleCollection {
    owner: String,
    config: RulesConfig,
    registry: Option<Arc<BehaviorRegistry>>,
    rules: HashMap<RuleId, Rule>,
    by_type: HashMap<RuleKind, RuleId>,
    next_seq: u64,
    clock: u64,
}

impl RuleCollection {
    /// Create an empty collection for a character.
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_config(owner, RulesConfig::default())
    }

    pub fn with_config(owner: impl Into<String>, config: RulesConfig) -> Self {
        Self {
            owner: owner.into(),
            config,
            registry: None,
            rules: HashMap::new(),
            by_type: HashMap::new(),
            next_seq: 0,
            clock: 0,
        }
    }

    /// Attach a registry used to build behaviors for data that names a handler.
    pub fn with_registry(mut self, registry: Arc<BehaviorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<BehaviorRegistry>> {
        self.registry.as_ref()
    }

    // ------------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------------

    /// Add a rule built from `data`.
    ///
    /// Data without an id gets a generated one. An existing id fails with
    /// [`RuleError::DuplicateRule`] unless `options.update` is set, in which
    /// case the rule is replaced in place and keeps its insertion position.
    pub fn add_rule(
        &mut self,
        mut data: RuleData,
        options: AddRuleOptions,
    ) -> Result<&Rule, RuleError> {
        let id = data.id.take().unwrap_or_else(RuleId::generate);
        let existing = self.rules.get(&id).map(|rule| (rule.seq, rule.kind().clone()));

        if existing.is_some() && !options.update {
            debug!(
                target: "dnd_rules::collection",
                owner = %self.owner,
                rule = %id,
                "Rejected duplicate rule id"
            );
            return Err(RuleError::DuplicateRule(id));
        }

        let behavior = self.resolve_behavior(&id, &mut data);
        self.clock += 1;
        let (seq, previous_kind) = match existing {
            Some((seq, kind)) => (seq, Some(kind)),
            None => {
                self.next_seq += 1;
                (self.next_seq - 1, None)
            }
        };

        let replaced = previous_kind.is_some();
        let rule = Rule::from_data(id.clone(), data, behavior, seq, self.clock);
        self.rules.insert(id.clone(), rule);
        self.reindex_touched(&id, previous_kind);

        debug!(
            target: "dnd_rules::collection",
            owner = %self.owner,
            rule = %id,
            replaced,
            "Stored rule"
        );

        self.rules.get(&id).ok_or(RuleError::NotFound(id))
    }

    /// Merge `update` into an existing rule.
    pub fn update_rule(&mut self, id: &RuleId, update: RuleUpdate) -> Result<&Rule, RuleError> {
        let Some(rule) = self.rules.get_mut(id) else {
            return Err(RuleError::NotFound(id.clone()));
        };

        let previous_kind = rule.kind().clone();
        rule.apply(update);
        self.clock += 1;
        rule.touched = self.clock;

        self.reindex_touched(id, Some(previous_kind));

        debug!(
            target: "dnd_rules::collection",
            owner = %self.owner,
            rule = %id,
            "Updated rule"
        );

        self.rules.get(id).ok_or_else(|| RuleError::NotFound(id.clone()))
    }

    /// Remove a rule. Returns `false` if it was already gone.
    pub fn delete_rule(&mut self, id: &RuleId) -> bool {
        let Some(rule) = self.rules.remove(id) else {
            debug!(
                target: "dnd_rules::collection",
                owner = %self.owner,
                rule = %id,
                "Delete of absent rule ignored"
            );
            return false;
        };

        if self.by_type.get(rule.kind()) == Some(id) {
            self.elect(rule.kind());
        }

        debug!(
            target: "dnd_rules::collection",
            owner = %self.owner,
            rule = %id,
            "Deleted rule"
        );
        true
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn get_rule(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules.contains_key(id)
    }

    pub fn has_rule_of_type(&self, kind: &RuleKind) -> bool {
        self.by_type.contains_key(kind)
    }

    /// The authoritative rule for `kind`, if any.
    pub fn get_rule_of_type(&self, kind: &RuleKind) -> Option<&Rule> {
        self.by_type.get(kind).and_then(|id| self.rules.get(id))
    }

    /// All rules of `kind`, including disabled ones, in dispatch order.
    pub fn rules_of_type<'a>(&'a self, kind: &'a RuleKind) -> impl Iterator<Item = &'a Rule> + 'a {
        self.iter_ordered().filter(move |rule| rule.kind() == kind)
    }

    /// Every rule ordered by priority, then insertion order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Rule> {
        let mut ordered: Vec<&Rule> = self.rules.values().collect();
        ordered.sort_by_key(|rule| (rule.priority(), rule.seq));
        ordered.into_iter()
    }

    /// Rule ids in dispatch order.
    pub fn ids(&self) -> Vec<RuleId> {
        self.iter_ordered().map(|rule| rule.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Type index entries, sorted by type name.
    pub fn type_index(&self) -> Vec<(RuleKind, RuleId)> {
        let mut entries: Vec<_> = self
            .by_type
            .iter()
            .map(|(kind, id)| (kind.clone(), id.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        entries
    }

    // ------------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------------

    /// Point the type index at `id` for `kind`, if that is a valid target.
    pub(crate) fn pin_type(&mut self, kind: &RuleKind, id: &RuleId) -> bool {
        let valid = self
            .rules
            .get(id)
            .is_some_and(|rule| rule.kind() == kind && !rule.is_disabled());
        if valid {
            self.by_type.insert(kind.clone(), id.clone());
        }
        valid
    }

    /// Ids from least to most recently touched.
    pub(crate) fn touch_order(&self) -> Vec<RuleId> {
        let mut rules: Vec<_> = self.rules.values().collect();
        rules.sort_by_key(|rule| rule.touched);
        rules.into_iter().map(|rule| rule.id().clone()).collect()
    }

    /// Re-stamp rules so `order` runs from least to most recently touched.
    /// Unknown ids are ignored. Does not re-elect; callers pin or elect after.
    pub(crate) fn restamp(&mut self, order: &[RuleId]) {
        for id in order {
            if let Some(rule) = self.rules.get_mut(id) {
                self.clock += 1;
                rule.touched = self.clock;
            }
        }
    }

    fn resolve_behavior(&self, id: &RuleId, data: &mut RuleData) -> Option<Arc<dyn RuleBehavior>> {
        if let Some(behavior) = data.behavior.take() {
            return Some(behavior);
        }

        let handler = data.handler.as_deref()?;
        let Some(registry) = &self.registry else {
            warn!(
                target: "dnd_rules::collection",
                owner = %self.owner,
                rule = %id,
                handler,
                "Rule names a handler but no registry is attached"
            );
            return None;
        };

        match registry.build(handler, &data.payload) {
            Some(Ok(behavior)) => Some(behavior),
            Some(Err(error)) => {
                warn!(
                    target: "dnd_rules::collection",
                    owner = %self.owner,
                    rule = %id,
                    handler,
                    error = %error,
                    "Handler rejected payload, rule will have no callbacks"
                );
                None
            }
            None => {
                warn!(
                    target: "dnd_rules::collection",
                    owner = %self.owner,
                    rule = %id,
                    handler,
                    "Unknown rule handler, rule will have no callbacks"
                );
                None
            }
        }
    }

    /// Re-evaluate the type index after `id` was added or updated.
    fn reindex_touched(&mut self, id: &RuleId, previous_kind: Option<RuleKind>) {
        let Some(rule) = self.rules.get(id) else {
            return;
        };
        let kind = rule.kind().clone();
        let enabled = !rule.is_disabled();

        if let Some(previous) = previous_kind.filter(|previous| *previous != kind) {
            if self.by_type.get(&previous) == Some(id) {
                self.elect(&previous);
            }
        }

        match self.config.type_precedence {
            TypePrecedence::MostRecent => {
                if enabled {
                    self.by_type.insert(kind, id.clone());
                } else if self.by_type.get(&kind) == Some(id) {
                    self.elect(&kind);
                }
            }
            TypePrecedence::HighestPriority => self.elect(&kind),
        }
    }

    /// Pick the enabled rule of `kind` with the lowest priority value, most
    /// recently touched on ties. Clears the entry when there is none.
    fn elect(&mut self, kind: &RuleKind) {
        let winner = self
            .rules
            .values()
            .filter(|rule| rule.kind() == kind && !rule.is_disabled())
            .min_by(|a, b| {
                a.priority()
                    .cmp(&b.priority())
                    .then_with(|| b.touched.cmp(&a.touched))
            })
            .map(|rule| rule.id().clone());

        match winner {
            Some(id) => {
                self.by_type.insert(kind.clone(), id);
            }
            None => {
                self.by_type.remove(kind);
            }
        }
    }
}

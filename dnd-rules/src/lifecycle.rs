//! Lifecycle dispatch: running rule callbacks at document lifecycle phases.
//!
//! The document layer calls [`LifecycleDispatcher::dispatch`] at each phase of
//! a character's or item's create/update/delete/prepare/roll flow. Rules run
//! strictly one after another in priority order, each awaited before the next,
//! so a later rule always sees what an earlier one wrote into the context.
//!
//! # Error Handling
//!
//! - Gating phases (`preCreate`, `preUpdate`, `preUpdateActor`) stop at the
//!   first failing callback and return [`DispatchError::Aborted`].
//! - Every other phase keeps going. Failures are collected in
//!   [`DispatchReport::failures`].

use crate::behavior::{CallbackError, StructuralHint};
use crate::collection::RuleCollection;
use crate::path;
use crate::rule::RuleId;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Named points in a document lifecycle where rules may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    PrePrepareData,
    AfterPrepareData,
    PreCreate,
    AfterCreate,
    PreUpdate,
    AfterUpdate,
    PreDelete,
    AfterDelete,
    PreRoll,
    AfterRoll,
    PreUpdateActor,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::PrePrepareData,
        Phase::AfterPrepareData,
        Phase::PreCreate,
        Phase::AfterCreate,
        Phase::PreUpdate,
        Phase::AfterUpdate,
        Phase::PreDelete,
        Phase::AfterDelete,
        Phase::PreRoll,
        Phase::AfterRoll,
        Phase::PreUpdateActor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::PrePrepareData => "prePrepareData",
            Phase::AfterPrepareData => "afterPrepareData",
            Phase::PreCreate => "preCreate",
            Phase::AfterCreate => "afterCreate",
            Phase::PreUpdate => "preUpdate",
            Phase::AfterUpdate => "afterUpdate",
            Phase::PreDelete => "preDelete",
            Phase::AfterDelete => "afterDelete",
            Phase::PreRoll => "preRoll",
            Phase::AfterRoll => "afterRoll",
            Phase::PreUpdateActor => "preUpdateActor",
        }
    }

    /// Phases that guard a persistence write. A failure here must abort.
    pub fn is_gating(&self) -> bool {
        matches!(
            self,
            Phase::PreCreate | Phase::PreUpdate | Phase::PreUpdateActor
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State threaded through one dispatch.
///
/// Predicates are evaluated against `data` at each rule's turn, and callbacks
/// may read and write it. `options` carries per-call extras such as the
/// pending change set of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    pub owner: String,
    pub data: Value,
    pub options: Value,
}

impl PhaseContext {
    pub fn new(owner: impl Into<String>, data: Value) -> Self {
        Self {
            owner: owner.into(),
            data,
            options: Value::Null,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Read a dotted path from the context data.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path::lookup(&self.data, path)
    }

    /// Write a dotted path into the context data.
    pub fn set(&mut self, path: &str, value: Value) -> bool {
        path::assign(&mut self.data, path, value)
    }
}

/// A hint tagged with the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct HintEntry {
    pub rule_id: RuleId,
    pub hint: StructuralHint,
}

/// A callback failure tagged with the rule that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule_id: RuleId,
    pub error: CallbackError,
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule_id, self.error)
    }
}

/// Errors from lifecycle dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{phase} aborted by rule {rule_id}: {source}")]
    Aborted {
        phase: Phase,
        rule_id: RuleId,
        #[source]
        source: CallbackError,
    },

    #[error("{} rule(s) failed during {phase}", .failures.len())]
    RuleFailures {
        phase: Phase,
        failures: Vec<RuleFailure>,
    },
}

/// Result of running one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub phase: Phase,
    /// Rules whose callback ran, in call order.
    pub invoked: Vec<RuleId>,
    /// Rules passed over because their predicate was false.
    pub skipped: Vec<RuleId>,
    /// Structural hints in call order.
    pub hints: Vec<HintEntry>,
    pub failures: Vec<RuleFailure>,
}

impl DispatchReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            invoked: Vec::new(),
            skipped: Vec::new(),
            hints: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Hints without their originating rule ids.
    pub fn structural_hints(&self) -> Vec<StructuralHint> {
        self.hints.iter().map(|entry| entry.hint.clone()).collect()
    }

    /// Turn recorded sibling failures into an error.
    pub fn ensure_clean(self) -> Result<Self, DispatchError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(DispatchError::RuleFailures {
                phase: self.phase,
                failures: self.failures,
            })
        }
    }
}

/// Runs rule callbacks for a phase in priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleDispatcher;

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run every active rule's callback for `phase`.
    ///
    /// `Err` only comes back when a gating phase aborts. Failures in other
    /// phases are recorded in the report and the call still returns `Ok`;
    /// chain [`DispatchReport::ensure_clean`] to turn them into an error.
    pub async fn dispatch(
        &self,
        rules: &RuleCollection,
        phase: Phase,
        ctx: &mut PhaseContext,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::new(phase);

        // Snapshot the candidates so callbacks never hold a borrow of the rule
        // store across an await.
        let candidates: Vec<_> = rules
            .iter_ordered()
            .filter(|rule| !rule.is_disabled())
            .filter_map(|rule| {
                let behavior = rule.behavior()?;
                behavior.handles(phase).then(|| {
                    (
                        rule.id().clone(),
                        rule.predicate().cloned(),
                        behavior.clone(),
                    )
                })
            })
            .collect();

        debug!(
            target: "dnd_rules::lifecycle",
            owner = %rules.owner(),
            phase = %phase,
            candidates = candidates.len(),
            "Dispatching phase"
        );

        for (rule_id, predicate, behavior) in candidates {
            if let Some(predicate) = &predicate {
                if !predicate.evaluate(&ctx.data) {
                    debug!(
                        target: "dnd_rules::lifecycle",
                        rule = %rule_id,
                        phase = %phase,
                        "Predicate false, skipping rule"
                    );
                    report.skipped.push(rule_id);
                    continue;
                }
            }

            report.invoked.push(rule_id.clone());
            match behavior.on_phase(phase, ctx).await {
                Ok(outcome) => {
                    report
                        .hints
                        .extend(outcome.hints.into_iter().map(|hint| HintEntry {
                            rule_id: rule_id.clone(),
                            hint,
                        }));
                }
                Err(source) if phase.is_gating() => {
                    error!(
                        target: "dnd_rules::lifecycle",
                        rule = %rule_id,
                        behavior = behavior.name(),
                        phase = %phase,
                        error = %source,
                        "Gating callback failed, aborting phase"
                    );
                    return Err(DispatchError::Aborted {
                        phase,
                        rule_id,
                        source,
                    });
                }
                Err(error) => {
                    warn!(
                        target: "dnd_rules::lifecycle",
                        rule = %rule_id,
                        behavior = behavior.name(),
                        phase = %phase,
                        error = %error,
                        "Callback failed, continuing with remaining rules"
                    );
                    report.failures.push(RuleFailure { rule_id, error });
                }
            }
        }

        Ok(report)
    }

    /// Dispatch the same phase for several independent characters.
    ///
    /// Each character's rules still run sequentially; different characters
    /// interleave at their suspension points. Results come back in input order.
    pub async fn dispatch_each<'a, I>(
        &self,
        phase: Phase,
        targets: I,
    ) -> Vec<Result<DispatchReport, DispatchError>>
    where
        I: IntoIterator<Item = (&'a RuleCollection, &'a mut PhaseContext)>,
    {
        join_all(
            targets
                .into_iter()
                .map(|(rules, ctx)| self.dispatch(rules, phase, ctx)),
        )
        .await
    }
}

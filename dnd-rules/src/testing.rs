//! Testing utilities for rule dispatch.
//!
//! This module provides tools for integration testing:
//! - `RecordingBehavior` logs every call into a shared log
//! - `FailingBehavior` always fails its callback
//! - `TestHarness` for building a collection and running phases
//! - Assertion helpers for dispatch results

use crate::behavior::{CallbackError, PhaseOutcome, RuleBehavior, StructuralHint};
use crate::collection::RuleCollection;
use crate::lifecycle::{DispatchError, DispatchReport, LifecycleDispatcher, Phase, PhaseContext};
use crate::predicate::Predicate;
use crate::rule::{AddRuleOptions, RuleData, RuleId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub label: String,
    pub phase: Phase,
    /// Context data as the callback saw it on entry.
    pub seen: Value,
}

/// Shared invocation log.
pub type InvocationLog = Arc<Mutex<Vec<Invocation>>>;

pub fn new_log() -> InvocationLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Labels from a log, in call order.
pub async fn labels(log: &InvocationLog) -> Vec<String> {
    log.lock().await.iter().map(|i| i.label.clone()).collect()
}

/// A behavior that records each call and can optionally write to the
/// context, emit a hint, or yield to the scheduler first.
pub struct RecordingBehavior {
    label: String,
    phases: Vec<Phase>,
    log: InvocationLog,
    write: Option<(String, Value)>,
    hint: Option<StructuralHint>,
    yields: usize,
}

impl RecordingBehavior {
    /// Record calls for every phase.
    pub fn new(label: impl Into<String>, log: InvocationLog) -> Self {
        Self {
            label: label.into(),
            phases: Phase::ALL.to_vec(),
            log,
            write: None,
            hint: None,
            yields: 0,
        }
    }

    /// Only handle these phases.
    pub fn on(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }

    /// Write `value` at `path` in the context when called.
    pub fn writes(mut self, path: impl Into<String>, value: Value) -> Self {
        self.write = Some((path.into(), value));
        self
    }

    pub fn emits(mut self, hint: StructuralHint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Suspend `times` times before recording.
    pub fn yielding(mut self, times: usize) -> Self {
        self.yields = times;
        self
    }
}

#[async_trait]
impl RuleBehavior for RecordingBehavior {
    fn name(&self) -> &str {
        &self.label
    }

    fn phases(&self) -> &[Phase] {
        &self.phases
    }

    async fn on_phase(
        &self,
        phase: Phase,
        ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError> {
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }

        self.log.lock().await.push(Invocation {
            label: self.label.clone(),
            phase,
            seen: ctx.data.clone(),
        });

        if let Some((path, value)) = &self.write {
            ctx.set(path, value.clone());
        }

        Ok(match &self.hint {
            Some(hint) => PhaseOutcome::none().with_hint(hint.clone()),
            None => PhaseOutcome::none(),
        })
    }
}

/// A behavior whose callback always fails.
pub struct FailingBehavior {
    message: String,
    phases: Vec<Phase>,
}

impl FailingBehavior {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            phases: Phase::ALL.to_vec(),
        }
    }

    pub fn on(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }
}

#[async_trait]
impl RuleBehavior for FailingBehavior {
    fn name(&self) -> &str {
        "failing"
    }

    fn phases(&self) -> &[Phase] {
        &self.phases
    }

    async fn on_phase(
        &self,
        _phase: Phase,
        _ctx: &mut PhaseContext,
    ) -> Result<PhaseOutcome, CallbackError> {
        Err(CallbackError::new(self.message.clone()))
    }
}

/// Test harness for running dispatch scenarios.
pub struct TestHarness {
    /// The rules under test.
    pub rules: RuleCollection,
    /// Context threaded through every phase.
    pub ctx: PhaseContext,
    /// Log shared by rules added with [`TestHarness::record`].
    pub log: InvocationLog,
    dispatcher: LifecycleDispatcher,
}

impl TestHarness {
    /// Create a harness for a character with empty data.
    pub fn new() -> Self {
        Self::with_data(Value::Object(Default::default()))
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            rules: RuleCollection::new("test-hero"),
            ctx: PhaseContext::new("test-hero", data),
            log: new_log(),
            dispatcher: LifecycleDispatcher::new(),
        }
    }

    /// Add a recording rule with the given id and priority.
    pub fn record(&mut self, id: &str, priority: i32) -> &mut Self {
        let behavior = RecordingBehavior::new(id, self.log.clone());
        self.add(RuleData::new(id, "feature").with_priority(priority), behavior)
    }

    /// Add a recording rule gated by `predicate`.
    pub fn record_when(&mut self, id: &str, priority: i32, predicate: Predicate) -> &mut Self {
        let behavior = RecordingBehavior::new(id, self.log.clone());
        self.add(
            RuleData::new(id, "feature")
                .with_priority(priority)
                .with_predicate(predicate),
            behavior,
        )
    }

    /// Add a rule backed by `behavior`.
    #[track_caller]
    pub fn add(&mut self, data: RuleData, behavior: impl RuleBehavior + 'static) -> &mut Self {
        if let Err(e) = self
            .rules
            .add_rule(data.with_behavior(Arc::new(behavior)), AddRuleOptions::default())
        {
            panic!("Failed to add test rule: {e}");
        }
        self
    }

    /// Run one phase against the harness context.
    pub async fn run(&mut self, phase: Phase) -> Result<DispatchReport, DispatchError> {
        self.dispatcher.dispatch(&self.rules, phase, &mut self.ctx).await
    }

    /// Labels recorded so far, in call order.
    pub async fn calls(&self) -> Vec<String> {
        labels(&self.log).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the rules invoked by a dispatch, in order.
#[track_caller]
pub fn assert_invoked(report: &DispatchReport, expected: &[&str]) {
    let actual: Vec<&str> = report.invoked.iter().map(RuleId::as_str).collect();
    assert_eq!(
        actual, expected,
        "Expected invoked rules {expected:?}, got {actual:?}"
    );
}

/// Assert the rules skipped by a dispatch, in order.
#[track_caller]
pub fn assert_skipped(report: &DispatchReport, expected: &[&str]) {
    let actual: Vec<&str> = report.skipped.iter().map(RuleId::as_str).collect();
    assert_eq!(
        actual, expected,
        "Expected skipped rules {expected:?}, got {actual:?}"
    );
}

/// Assert a dispatch was aborted by the given rule.
#[track_caller]
pub fn assert_aborted_by(result: &Result<DispatchReport, DispatchError>, rule: &str) {
    match result {
        Err(DispatchError::Aborted { rule_id, .. }) => assert_eq!(
            rule_id.as_str(),
            rule,
            "Expected abort by '{rule}', got '{rule_id}'"
        ),
        other => panic!("Expected abort by '{rule}', got {other:?}"),
    }
}

//! Integration tests for the rule collection.
//!
//! These tests drive the collection the way a character sheet does:
//! - Loading rules from raw JSON
//! - Type lookups under both precedence policies
//! - Snapshots that survive a round trip through a file

use dnd_rules::config::{RulesConfig, TypePrecedence};
use dnd_rules::lifecycle::{LifecycleDispatcher, Phase, PhaseContext};
use dnd_rules::snapshot::RuleSnapshot;
use dnd_rules::{
    AddRuleOptions, BehaviorRegistry, RuleCollection, RuleData, RuleError, RuleId, RuleKind,
    RuleUpdate,
};
use serde_json::json;
use std::sync::Arc;

fn sheet_rules() -> Vec<RuleData> {
    serde_json::from_value(json!([
        {
            "id": "dwarven-toughness",
            "type": "feature",
            "priority": 1,
            "handler": "modifier",
            "payload": {"path": "hp.max", "amount": 3}
        },
        {
            "id": "armor-bonus",
            "type": "feature",
            "priority": 0,
            "predicate": {"in": ["armor.kind", ["medium", "heavy"]]},
            "handler": "modifier",
            "payload": {"path": "ac", "amount": 1}
        },
        {
            "id": "inspired",
            "type": "boon",
            "label": "Heroic Inspiration"
        }
    ]))
    .unwrap()
}

fn load(config: RulesConfig) -> RuleCollection {
    let mut rules = RuleCollection::with_config("thorin", config)
        .with_registry(Arc::new(BehaviorRegistry::with_builtins()));
    for data in sheet_rules() {
        rules.add_rule(data, AddRuleOptions::default()).unwrap();
    }
    rules
}

#[test]
fn test_load_from_raw() {
    let rules = load(RulesConfig::default());

    assert_eq!(rules.len(), 3);
    assert_eq!(
        rules.ids(),
        vec![
            RuleId::from("armor-bonus"),
            RuleId::from("inspired"),
            RuleId::from("dwarven-toughness"),
        ]
    );
    assert!(rules.has_rule_of_type(&RuleKind::Boon));
    assert_eq!(
        rules.get_rule_of_type(&RuleKind::Boon).unwrap().label(),
        "Heroic Inspiration"
    );
    // Last feature added wins type lookups.
    assert_eq!(
        rules.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "armor-bonus"
    );
}

#[test]
fn test_precedence_policies_differ() {
    let recent = load(RulesConfig::default());
    let highest = load(RulesConfig::new().with_type_precedence(TypePrecedence::HighestPriority));

    assert_eq!(
        recent.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "armor-bonus"
    );
    // armor-bonus also has the lowest priority value, so both agree here.
    assert_eq!(
        highest.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "armor-bonus"
    );

    let mut recent = recent;
    let mut highest = highest;
    for rules in [&mut recent, &mut highest] {
        rules
            .update_rule(&RuleId::from("dwarven-toughness"), RuleUpdate::new().label("Tough"))
            .unwrap();
    }
    assert_eq!(
        recent.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "dwarven-toughness"
    );
    assert_eq!(
        highest.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "armor-bonus"
    );
}

#[test]
fn test_feat_scenario() {
    // A feat with priority 1, then another with priority 2.
    let feat = RuleKind::from("feat");
    let mut rules = RuleCollection::new("thorin");
    rules
        .add_rule(RuleData::new("A", feat.clone()).with_priority(1), AddRuleOptions::default())
        .unwrap();
    rules
        .add_rule(RuleData::new("B", feat.clone()).with_priority(2), AddRuleOptions::default())
        .unwrap();

    assert_eq!(rules.get_rule_of_type(&feat).unwrap().id().as_str(), "B");
    assert!(rules.delete_rule(&RuleId::from("B")));
    assert_eq!(rules.get_rule_of_type(&feat).unwrap().id().as_str(), "A");
    assert!(rules.delete_rule(&RuleId::from("A")));
    assert!(!rules.has_rule_of_type(&feat));
}

#[test]
fn test_crud_errors() {
    let mut rules = load(RulesConfig::default());

    let err = rules
        .add_rule(RuleData::new("inspired", "boon"), AddRuleOptions::default())
        .unwrap_err();
    assert_eq!(err, RuleError::DuplicateRule(RuleId::from("inspired")));

    let err = rules
        .update_rule(&RuleId::from("missing"), RuleUpdate::new().priority(1))
        .unwrap_err();
    assert_eq!(err, RuleError::NotFound(RuleId::from("missing")));

    assert!(!rules.delete_rule(&RuleId::from("missing")));
    assert_eq!(rules.len(), 3);
}

#[tokio::test]
async fn test_loaded_rules_dispatch() {
    let rules = load(RulesConfig::default());
    let dispatcher = LifecycleDispatcher::new();

    let mut in_plate = PhaseContext::new(
        "thorin",
        json!({"ac": 18, "hp": {"max": 20}, "armor": {"kind": "heavy"}}),
    );
    let report = dispatcher
        .dispatch(&rules, Phase::AfterPrepareData, &mut in_plate)
        .await
        .unwrap();
    assert_eq!(report.invoked.len(), 2);
    assert_eq!(in_plate.get("ac"), Some(&json!(19)));
    assert_eq!(in_plate.get("hp.max"), Some(&json!(23)));

    let mut unarmored = PhaseContext::new("thorin", json!({"ac": 10, "hp": {"max": 20}}));
    let report = dispatcher
        .dispatch(&rules, Phase::AfterPrepareData, &mut unarmored)
        .await
        .unwrap();
    assert_eq!(report.skipped, vec![RuleId::from("armor-bonus")]);
    assert_eq!(unarmored.get("ac"), Some(&json!(10)));
}

#[tokio::test]
async fn test_snapshot_file_round_trip() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("thorin.rules.json");

    let mut rules = load(RulesConfig::default());
    rules
        .update_rule(&RuleId::from("dwarven-toughness"), RuleUpdate::new().disabled(true))
        .unwrap();
    rules.snapshot().save_json(&path).await.unwrap();

    let snapshot = RuleSnapshot::load_json(&path).await.unwrap();
    let restored = RuleCollection::restore(
        "thorin",
        snapshot,
        RulesConfig::default(),
        Some(Arc::new(BehaviorRegistry::with_builtins())),
    )
    .unwrap();

    assert_eq!(restored.ids(), rules.ids());
    assert!(restored
        .get_rule(&RuleId::from("dwarven-toughness"))
        .unwrap()
        .is_disabled());
    assert!(restored
        .get_rule(&RuleId::from("armor-bonus"))
        .unwrap()
        .behavior()
        .is_some());
    assert_eq!(
        restored.get_rule_of_type(&RuleKind::Feature).unwrap().id().as_str(),
        "armor-bonus"
    );
}

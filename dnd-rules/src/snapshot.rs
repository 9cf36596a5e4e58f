//! Versioned plain-data form of a [`RuleCollection`].
//!
//! Behaviors are never serialized. Rules that name a `handler` get their
//! behavior back from the [`BehaviorRegistry`] passed to
//! [`RuleCollection::restore`].

use crate::behavior::BehaviorRegistry;
use crate::collection::{RuleCollection, RuleError};
use crate::config::RulesConfig;
use crate::rule::{AddRuleOptions, RuleData, RuleId, RuleKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot loading.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),
}

/// Raw rules of one character, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub version: u32,
    pub owner: String,
    pub rules: Vec<RuleData>,
    /// Authoritative rule id per type at snapshot time.
    #[serde(default)]
    pub type_index: Vec<TypeIndexEntry>,
    /// Rule ids from least to most recently touched. Fallback elections break
    /// priority ties with this order.
    #[serde(default)]
    pub touch_order: Vec<RuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeIndexEntry {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub rule: RuleId,
}

impl RuleSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and check the format version.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }
        Ok(snapshot)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }
}

impl RuleCollection {
    /// Capture every rule as plain data.
    pub fn snapshot(&self) -> RuleSnapshot {
        let mut ordered: Vec<_> = self.iter_ordered().collect();
        ordered.sort_by_key(|rule| rule.seq);

        RuleSnapshot {
            version: SNAPSHOT_VERSION,
            owner: self.owner().to_string(),
            rules: ordered.into_iter().map(|rule| rule.to_data()).collect(),
            type_index: self
                .type_index()
                .into_iter()
                .map(|(kind, rule)| TypeIndexEntry { kind, rule })
                .collect(),
            touch_order: self.touch_order(),
        }
    }

    /// Rebuild a collection from a snapshot.
    ///
    /// Rules are re-added in their original insertion order, so dispatch order
    /// is preserved, then re-stamped in the recorded touch order so fallback
    /// ties resolve as before. Type index entries that no longer point at a
    /// valid rule are dropped with a warning and the index falls back to its
    /// normal election for that type.
    pub fn restore(
        owner: impl Into<String>,
        snapshot: RuleSnapshot,
        config: RulesConfig,
        registry: Option<Arc<BehaviorRegistry>>,
    ) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        let mut rules = RuleCollection::with_config(owner, config);
        if let Some(registry) = registry {
            rules = rules.with_registry(registry);
        }

        for data in snapshot.rules {
            rules.add_rule(data, AddRuleOptions::default())?;
        }
        rules.restamp(&snapshot.touch_order);

        for entry in &snapshot.type_index {
            if !rules.pin_type(&entry.kind, &entry.rule) {
                warn!(
                    target: "dnd_rules::collection",
                    owner = %rules.owner(),
                    kind = %entry.kind,
                    rule = %entry.rule,
                    "Ignoring stale type index entry"
                );
            }
        }

        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;
    use crate::rule::RuleUpdate;
    use serde_json::json;

    fn sample() -> RuleCollection {
        let mut rules = RuleCollection::new("hero");
        rules
            .add_rule(
                RuleData::new("a", "feat")
                    .with_priority(2)
                    .with_predicate(Predicate::eq("actor.level", 3)),
                AddRuleOptions::default(),
            )
            .unwrap();
        rules
            .add_rule(RuleData::new("b", "feat").with_priority(1), AddRuleOptions::default())
            .unwrap();
        rules
            .add_rule(RuleData::new("c", "boon").with_priority(1), AddRuleOptions::default())
            .unwrap();
        // Make "a" the authoritative feat.
        rules.update_rule(&RuleId::from("a"), RuleUpdate::new().label("Lucky")).unwrap();
        rules
    }

    #[test]
    fn test_snapshot_round_trip_keeps_order_and_index() {
        let rules = sample();
        let text = rules.snapshot().to_json().unwrap();
        let restored = RuleCollection::restore(
            "hero",
            RuleSnapshot::from_json(&text).unwrap(),
            RulesConfig::default(),
            None,
        )
        .unwrap();

        assert_eq!(restored.ids(), rules.ids());
        assert_eq!(
            restored.get_rule_of_type(&RuleKind::from("feat")).unwrap().id().as_str(),
            "a"
        );
        assert_eq!(restored.get_rule(&RuleId::from("a")).unwrap().label(), "Lucky");
        assert!(restored
            .get_rule(&RuleId::from("a"))
            .unwrap()
            .is_active(&json!({"actor": {"level": 3}})));
    }

    #[test]
    fn test_snapshot_lists_insertion_order() {
        let snapshot = sample().snapshot();
        let ids: Vec<_> = snapshot
            .rules
            .iter()
            .filter_map(|data| data.id.as_ref().map(|id| id.to_string()))
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("hero_rules.json");

        let rules = sample();
        rules.snapshot().save_json(&path).await.unwrap();
        let loaded = RuleSnapshot::load_json(&path).await.unwrap();

        assert_eq!(loaded.owner, "hero");
        assert_eq!(loaded.rules.len(), 3);

        let missing = RuleSnapshot::load_json(temp_dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn test_version_mismatch() {
        let mut snapshot = sample().snapshot();
        snapshot.version = 99;
        let text = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(
            RuleSnapshot::from_json(&text),
            Err(SnapshotError::VersionMismatch {
                expected: 1,
                found: 99
            })
        ));
        assert!(matches!(
            RuleCollection::restore("hero", snapshot, RulesConfig::default(), None),
            Err(SnapshotError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_stale_index_entry_falls_back() {
        let mut snapshot = sample().snapshot();
        snapshot.type_index = vec![TypeIndexEntry {
            kind: RuleKind::from("feat"),
            rule: RuleId::from("ghost"),
        }];
        let restored =
            RuleCollection::restore("hero", snapshot, RulesConfig::default(), None).unwrap();
        // Last added feat wins after a plain replay.
        assert_eq!(
            restored.get_rule_of_type(&RuleKind::from("feat")).unwrap().id().as_str(),
            "b"
        );
    }

    /// Two priority 1 feats where the earlier one was touched last, with a
    /// priority 0 feat on top.
    fn tied_feats() -> RuleCollection {
        let mut rules = RuleCollection::new("hero");
        for id in ["x", "y"] {
            rules
                .add_rule(RuleData::new(id, "feat").with_priority(1), AddRuleOptions::default())
                .unwrap();
        }
        rules.update_rule(&RuleId::from("x"), RuleUpdate::new().label("Alert")).unwrap();
        rules
            .add_rule(RuleData::new("z", "feat").with_priority(0), AddRuleOptions::default())
            .unwrap();
        rules
    }

    #[test]
    fn test_restore_keeps_fallback_ties() {
        let feat = RuleKind::from("feat");
        let mut rules = tied_feats();
        let text = rules.snapshot().to_json().unwrap();
        let mut restored = RuleCollection::restore(
            "hero",
            RuleSnapshot::from_json(&text).unwrap(),
            RulesConfig::default(),
            None,
        )
        .unwrap();

        assert!(rules.delete_rule(&RuleId::from("z")));
        assert!(restored.delete_rule(&RuleId::from("z")));
        assert_eq!(rules.get_rule_of_type(&feat).unwrap().id().as_str(), "x");
        assert_eq!(restored.get_rule_of_type(&feat).unwrap().id().as_str(), "x");
    }

    #[test]
    fn test_missing_touch_order_uses_insertion() {
        let mut snapshot = tied_feats().snapshot();
        assert_eq!(
            snapshot.touch_order,
            vec![RuleId::from("y"), RuleId::from("x"), RuleId::from("z")]
        );

        snapshot.touch_order.clear();
        let mut restored =
            RuleCollection::restore("hero", snapshot, RulesConfig::default(), None).unwrap();
        assert!(restored.delete_rule(&RuleId::from("z")));
        // Plain replay leaves "y" as the most recently touched of the tie.
        assert_eq!(
            restored.get_rule_of_type(&RuleKind::from("feat")).unwrap().id().as_str(),
            "y"
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let snapshot = RuleSnapshot {
            version: SNAPSHOT_VERSION,
            owner: "hero".to_string(),
            rules: vec![RuleData::new("a", "feat"), RuleData::new("a", "boon")],
            type_index: Vec::new(),
            touch_order: Vec::new(),
        };
        assert!(matches!(
            RuleCollection::restore("hero", snapshot, RulesConfig::default(), None),
            Err(SnapshotError::Rule(RuleError::DuplicateRule(_)))
        ));
    }

    #[test]
    fn test_restore_rebuilds_behaviors_from_handlers() {
        let mut rules = RuleCollection::new("hero");
        rules
            .add_rule(
                RuleData::new("ac", "feature")
                    .with_handler("modifier", json!({"path": "ac", "amount": 1})),
                AddRuleOptions::default(),
            )
            .unwrap();

        let snapshot = rules.snapshot();
        let without =
            RuleCollection::restore("hero", snapshot.clone(), RulesConfig::default(), None)
                .unwrap();
        assert!(without.get_rule(&RuleId::from("ac")).unwrap().behavior().is_none());

        let with = RuleCollection::restore(
            "hero",
            snapshot,
            RulesConfig::default(),
            Some(Arc::new(BehaviorRegistry::with_builtins())),
        )
        .unwrap();
        assert!(with.get_rule(&RuleId::from("ac")).unwrap().behavior().is_some());
    }
}

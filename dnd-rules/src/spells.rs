//! Spell scaling: what extra mana buys when a spell is upcast.
//!
//! A spell declares a [`SpellScalingSpec`]. At cast time the caller commits
//! some mana, and [`SpellScalingResolver::resolve`] works out how many whole
//! scaling steps that funds and returns the already-scaled deltas to apply.
//!
//! # Scaling Modes
//!
//! - `none`: the spell never scales. Extra mana is accepted and ignored.
//! - `upcast`: every delta in `deltas` is applied, scaled by the step count.
//! - `upcastChoice`: the caster picks one of `choices`. Only that choice's
//!   deltas are applied, scaled the same way.
//!
//! Numeric and dice deltas multiply by the step count. Condition and target
//! effect deltas are applied once when at least one step is funded.

use crate::dice::DiceSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from spell scaling resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalingError {
    #[error("Not enough mana: spell costs {required}, only {spent} committed")]
    InsufficientResource { required: u32, spent: u32 },

    #[error("Invalid scaling choice {index:?}: {available} choice(s) available")]
    InvalidChoice {
        index: Option<usize>,
        available: usize,
    },
}

impl ScalingError {
    /// Whether this should be shown to the player as a declined cast rather
    /// than reported as a broken spell definition.
    ///
    /// Too little mana and a missing choice are player-side. An index that is
    /// out of range means the caller built the prompt wrong.
    pub fn is_declined(&self) -> bool {
        match self {
            ScalingError::InsufficientResource { .. } => true,
            ScalingError::InvalidChoice { index, .. } => index.is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalingMode {
    #[default]
    None,
    Upcast,
    UpcastChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationUnit {
    Rounds,
    Minutes,
    Hours,
    Days,
}

/// One typed modification to a spell's effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ScalingDelta {
    AddFlatDamage { value: i32 },
    AddDice { dice: DiceSpec },
    AddReach { value: i32 },
    AddRange { value: i32 },
    AddTargets { value: i32 },
    AddAreaSize { value: i32 },
    AddDc { value: i32 },
    AddArmor { value: i32 },
    AddDuration { value: i32, unit: DurationUnit },
    AddCondition { condition: String },
    AddTargetEffect { effect: String },
}

impl ScalingDelta {
    /// The `operation` tag.
    pub fn operation(&self) -> &'static str {
        match self {
            ScalingDelta::AddFlatDamage { .. } => "addFlatDamage",
            ScalingDelta::AddDice { .. } => "addDice",
            ScalingDelta::AddReach { .. } => "addReach",
            ScalingDelta::AddRange { .. } => "addRange",
            ScalingDelta::AddTargets { .. } => "addTargets",
            ScalingDelta::AddAreaSize { .. } => "addAreaSize",
            ScalingDelta::AddDc { .. } => "addDc",
            ScalingDelta::AddArmor { .. } => "addArmor",
            ScalingDelta::AddDuration { .. } => "addDuration",
            ScalingDelta::AddCondition { .. } => "addCondition",
            ScalingDelta::AddTargetEffect { .. } => "addTargetEffect",
        }
    }

    /// Whether the payload grows with each step.
    pub fn is_scalable(&self) -> bool {
        !matches!(
            self,
            ScalingDelta::AddCondition { .. } | ScalingDelta::AddTargetEffect { .. }
        )
    }

    /// This delta multiplied by `steps`. Non-scalable deltas come back as is.
    pub fn scaled(&self, steps: u32) -> Self {
        let factor = i32::try_from(steps).unwrap_or(i32::MAX);
        let mul = |value: i32| value.saturating_mul(factor);

        match self {
            ScalingDelta::AddFlatDamage { value } => ScalingDelta::AddFlatDamage {
                value: mul(*value),
            },
            ScalingDelta::AddDice { dice } => ScalingDelta::AddDice {
                dice: dice.times(steps),
            },
            ScalingDelta::AddReach { value } => ScalingDelta::AddReach { value: mul(*value) },
            ScalingDelta::AddRange { value } => ScalingDelta::AddRange { value: mul(*value) },
            ScalingDelta::AddTargets { value } => ScalingDelta::AddTargets { value: mul(*value) },
            ScalingDelta::AddAreaSize { value } => ScalingDelta::AddAreaSize { value: mul(*value) },
            ScalingDelta::AddDc { value } => ScalingDelta::AddDc { value: mul(*value) },
            ScalingDelta::AddArmor { value } => ScalingDelta::AddArmor { value: mul(*value) },
            ScalingDelta::AddDuration { value, unit } => ScalingDelta::AddDuration {
                value: mul(*value),
                unit: *unit,
            },
            ScalingDelta::AddCondition { .. } | ScalingDelta::AddTargetEffect { .. } => {
                self.clone()
            }
        }
    }
}

/// A named, mutually exclusive upcast option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingChoice {
    pub name: String,
    #[serde(default)]
    pub deltas: Vec<ScalingDelta>,
}

impl ScalingChoice {
    pub fn new(name: impl Into<String>, deltas: Vec<ScalingDelta>) -> Self {
        Self {
            name: name.into(),
            deltas,
        }
    }
}

/// How a spell's effect grows with extra mana.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellScalingSpec {
    pub mode: ScalingMode,
    pub deltas: Vec<ScalingDelta>,
    pub choices: Vec<ScalingChoice>,
}

impl SpellScalingSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn upcast(deltas: Vec<ScalingDelta>) -> Self {
        Self {
            mode: ScalingMode::Upcast,
            deltas,
            choices: Vec::new(),
        }
    }

    pub fn upcast_choice(choices: Vec<ScalingChoice>) -> Self {
        Self {
            mode: ScalingMode::UpcastChoice,
            deltas: Vec::new(),
            choices,
        }
    }
}

/// The resolved scaling of one cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcastResult {
    pub is_upcast: bool,
    pub mana_spent: u32,
    pub upcast_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_index: Option<usize>,
    pub applied_deltas: Vec<ScalingDelta>,
}

impl UpcastResult {
    /// The unscaled effect at `mana_spent`.
    pub fn base(mana_spent: u32) -> Self {
        Self {
            is_upcast: false,
            mana_spent,
            upcast_steps: 0,
            choice_index: None,
            applied_deltas: Vec::new(),
        }
    }

    /// Extra damage dice granted by the applied deltas.
    pub fn extra_dice(&self) -> Vec<DiceSpec> {
        self.applied_deltas
            .iter()
            .filter_map(|delta| match delta {
                ScalingDelta::AddDice { dice } => Some(*dice),
                _ => None,
            })
            .collect()
    }

    /// Sum of all flat damage bonuses.
    pub fn flat_damage(&self) -> i32 {
        self.applied_deltas
            .iter()
            .map(|delta| match delta {
                ScalingDelta::AddFlatDamage { value } => *value,
                _ => 0,
            })
            .fold(0, i32::saturating_add)
    }
}

/// The outcome of an upcast choice prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSelection {
    Chosen(usize),
    /// The player closed the prompt without picking.
    Abandoned,
}

/// Resolves spell scaling for a cast.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpellScalingResolver;

impl SpellScalingResolver {
    pub fn new() -> Self {
        Self
    }

    /// Work out the scaling bought by `mana_spent`.
    ///
    /// Mana beyond the last whole step is accepted and not refunded. A zero
    /// `cost_per_step` funds no steps.
    pub fn resolve(
        &self,
        spec: &SpellScalingSpec,
        base_cost: u32,
        cost_per_step: u32,
        mana_spent: u32,
        choice_index: Option<usize>,
    ) -> Result<UpcastResult, ScalingError> {
        if mana_spent < base_cost {
            debug!(
                target: "dnd_rules::spells",
                base_cost,
                mana_spent,
                "Cast declined, not enough mana"
            );
            return Err(ScalingError::InsufficientResource {
                required: base_cost,
                spent: mana_spent,
            });
        }

        let steps = (mana_spent - base_cost)
            .checked_div(cost_per_step)
            .unwrap_or(0);

        let (choice_index, deltas) = match spec.mode {
            ScalingMode::None => return Ok(UpcastResult::base(mana_spent)),
            ScalingMode::Upcast => (None, spec.deltas.as_slice()),
            ScalingMode::UpcastChoice => {
                let available = spec.choices.len();
                let choice = choice_index
                    .and_then(|index| spec.choices.get(index))
                    .ok_or(ScalingError::InvalidChoice {
                        index: choice_index,
                        available,
                    })?;
                (choice_index, choice.deltas.as_slice())
            }
        };

        let applied_deltas = if steps == 0 {
            Vec::new()
        } else {
            deltas.iter().map(|delta| delta.scaled(steps)).collect()
        };

        debug!(
            target: "dnd_rules::spells",
            mode = ?spec.mode,
            mana_spent,
            steps,
            applied = applied_deltas.len(),
            "Resolved spell scaling"
        );

        Ok(UpcastResult {
            is_upcast: steps > 0,
            mana_spent,
            upcast_steps: steps,
            choice_index,
            applied_deltas,
        })
    }

    /// Resolve after an interactive choice prompt.
    ///
    /// An abandoned prompt falls back to the base effect at base cost.
    pub fn resolve_prompt(
        &self,
        spec: &SpellScalingSpec,
        base_cost: u32,
        cost_per_step: u32,
        mana_spent: u32,
        selection: ChoiceSelection,
    ) -> Result<UpcastResult, ScalingError> {
        match selection {
            ChoiceSelection::Chosen(index) => {
                self.resolve(spec, base_cost, cost_per_step, mana_spent, Some(index))
            }
            ChoiceSelection::Abandoned => {
                if mana_spent < base_cost {
                    return Err(ScalingError::InsufficientResource {
                        required: base_cost,
                        spent: mana_spent,
                    });
                }
                debug!(
                    target: "dnd_rules::spells",
                    base_cost,
                    "Upcast prompt abandoned, casting at base"
                );
                Ok(UpcastResult::base(base_cost))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> SpellScalingResolver {
        SpellScalingResolver::new()
    }

    #[test]
    fn test_mode_none_ignores_spend() {
        let spec = SpellScalingSpec {
            mode: ScalingMode::None,
            deltas: vec![ScalingDelta::AddFlatDamage { value: 2 }],
            choices: Vec::new(),
        };
        for spent in [1, 5, 100] {
            let result = resolver().resolve(&spec, 1, 1, spent, None).unwrap();
            assert!(!result.is_upcast);
            assert_eq!(result.upcast_steps, 0);
            assert!(result.applied_deltas.is_empty());
            assert_eq!(result.mana_spent, spent);
        }
    }

    #[test]
    fn test_upcast_flat_damage() {
        let spec = SpellScalingSpec::upcast(vec![ScalingDelta::AddFlatDamage { value: 2 }]);
        let result = resolver().resolve(&spec, 1, 1, 3, None).unwrap();
        assert!(result.is_upcast);
        assert_eq!(result.upcast_steps, 2);
        assert_eq!(result.applied_deltas, vec![ScalingDelta::AddFlatDamage { value: 4 }]);
        assert_eq!(
            serde_json::to_value(&result.applied_deltas).unwrap(),
            json!([{"operation": "addFlatDamage", "value": 4}])
        );
    }

    #[test]
    fn test_remainder_not_refunded() {
        let spec = SpellScalingSpec::upcast(vec![ScalingDelta::AddDice {
            dice: DiceSpec::new(1, 6),
        }]);
        // 2 base + 5 extra at 2 per step: 2 steps, 1 left over.
        let result = resolver().resolve(&spec, 2, 2, 7, None).unwrap();
        assert_eq!(result.upcast_steps, 2);
        assert_eq!(result.mana_spent, 7);
        assert_eq!(result.extra_dice(), vec![DiceSpec::new(2, 6)]);
    }

    #[test]
    fn test_exact_base_cost_is_not_upcast() {
        let spec = SpellScalingSpec::upcast(vec![
            ScalingDelta::AddFlatDamage { value: 3 },
            ScalingDelta::AddCondition {
                condition: "prone".to_string(),
            },
        ]);
        let result = resolver().resolve(&spec, 3, 1, 3, None).unwrap();
        assert!(!result.is_upcast);
        assert!(result.applied_deltas.is_empty());
    }

    #[test]
    fn test_non_scalable_applied_once() {
        let spec = SpellScalingSpec::upcast(vec![
            ScalingDelta::AddCondition {
                condition: "frightened".to_string(),
            },
            ScalingDelta::AddTargetEffect {
                effect: "burning".to_string(),
            },
            ScalingDelta::AddDuration {
                value: 1,
                unit: DurationUnit::Minutes,
            },
        ]);
        let result = resolver().resolve(&spec, 1, 1, 5, None).unwrap();
        assert_eq!(result.upcast_steps, 4);
        assert_eq!(
            result.applied_deltas,
            vec![
                ScalingDelta::AddCondition {
                    condition: "frightened".to_string()
                },
                ScalingDelta::AddTargetEffect {
                    effect: "burning".to_string()
                },
                ScalingDelta::AddDuration {
                    value: 4,
                    unit: DurationUnit::Minutes
                },
            ]
        );
    }

    #[test]
    fn test_insufficient_resource() {
        let spec = SpellScalingSpec::upcast(Vec::new());
        let err = resolver().resolve(&spec, 3, 1, 2, None).unwrap_err();
        assert_eq!(
            err,
            ScalingError::InsufficientResource {
                required: 3,
                spent: 2
            }
        );
        assert!(err.is_declined());
    }

    #[test]
    fn test_zero_cost_per_step() {
        let spec = SpellScalingSpec::upcast(vec![ScalingDelta::AddReach { value: 5 }]);
        let result = resolver().resolve(&spec, 1, 0, 10, None).unwrap();
        assert_eq!(result.upcast_steps, 0);
        assert!(!result.is_upcast);
    }

    fn two_choices() -> SpellScalingSpec {
        SpellScalingSpec::upcast_choice(vec![
            ScalingChoice::new("wider", vec![ScalingDelta::AddAreaSize { value: 5 }]),
            ScalingChoice::new(
                "harder",
                vec![
                    ScalingDelta::AddDc { value: 1 },
                    ScalingDelta::AddCondition {
                        condition: "stunned".to_string(),
                    },
                ],
            ),
        ])
    }

    #[test]
    fn test_choice_out_of_range() {
        let err = resolver().resolve(&two_choices(), 1, 1, 3, Some(5)).unwrap_err();
        assert_eq!(
            err,
            ScalingError::InvalidChoice {
                index: Some(5),
                available: 2
            }
        );
        assert!(!err.is_declined());
    }

    #[test]
    fn test_choice_missing() {
        let err = resolver().resolve(&two_choices(), 1, 1, 3, None).unwrap_err();
        assert!(matches!(err, ScalingError::InvalidChoice { index: None, .. }));
        assert!(err.is_declined());
    }

    #[test]
    fn test_choice_applies_only_selected() {
        let result = resolver().resolve(&two_choices(), 1, 1, 4, Some(1)).unwrap();
        assert_eq!(result.choice_index, Some(1));
        assert_eq!(result.upcast_steps, 3);
        assert_eq!(
            result.applied_deltas,
            vec![
                ScalingDelta::AddDc { value: 3 },
                ScalingDelta::AddCondition {
                    condition: "stunned".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_abandoned_prompt_falls_back_to_base() {
        let result = resolver()
            .resolve_prompt(&two_choices(), 2, 1, 6, ChoiceSelection::Abandoned)
            .unwrap();
        assert_eq!(result, UpcastResult::base(2));

        let chosen = resolver()
            .resolve_prompt(&two_choices(), 2, 1, 6, ChoiceSelection::Chosen(0))
            .unwrap();
        assert_eq!(chosen.applied_deltas, vec![ScalingDelta::AddAreaSize { value: 20 }]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let spec = two_choices();
        let first = resolver().resolve(&spec, 1, 2, 9, Some(0)).unwrap();
        let second = resolver().resolve(&spec, 1, 2, 9, Some(0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_spec_from_raw() {
        let spec: SpellScalingSpec = serde_json::from_value(json!({
            "mode": "upcast",
            "deltas": [
                {"operation": "addDice", "dice": {"count": 1, "faces": 8}},
                {"operation": "addDc", "value": 1},
                {"operation": "addDuration", "value": 10, "unit": "rounds"}
            ]
        }))
        .unwrap();
        assert_eq!(spec.mode, ScalingMode::Upcast);
        assert_eq!(spec.deltas.len(), 3);
        assert_eq!(spec.deltas[1].operation(), "addDc");
        assert!(spec.choices.is_empty());

        let empty: SpellScalingSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, SpellScalingSpec::none());
    }

    #[test]
    fn test_scaled_saturates() {
        let delta = ScalingDelta::AddFlatDamage { value: i32::MAX / 2 };
        assert_eq!(delta.scaled(4), ScalingDelta::AddFlatDamage { value: i32::MAX });
    }

    #[test]
    fn test_flat_damage_sum() {
        let spec = SpellScalingSpec::upcast(vec![
            ScalingDelta::AddFlatDamage { value: 1 },
            ScalingDelta::AddFlatDamage { value: 2 },
        ]);
        let result = resolver().resolve(&spec, 0, 1, 2, None).unwrap();
        assert_eq!(result.flat_damage(), 6);
    }
}

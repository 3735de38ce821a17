//! Class progression: levels, experience, hit-dice history, and feature
//! choices.
//!
//! Per-entity mutable state lives in [`ClassProgression`]; class content is
//! read from the injected [`ContentCatalog`]. Feature choices never block:
//! a feature with options stays pending until the host records a choice,
//! and its effects are withheld (not defaulted) in the meantime.

use crate::content::{ClassDefinition, ClassId, ContentCatalog, LevelFeature};
use crate::dice::roll_dice;
use crate::stats::{AttributeSet, Stat};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Attribute score a prerequisite must meet.
const PREREQUISITE_THRESHOLD: i32 = 13;

/// Errors from progression operations. These never cross the host hook
/// boundary; the engine facade logs and degrades instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("unknown class: {0}")]
    UnknownClass(ClassId),

    #[error("prerequisites not met for class: {0}")]
    PrerequisitesNotMet(ClassId),

    #[error("class {class} has no feature '{feature}'")]
    UnknownFeature { class: ClassId, feature: String },

    #[error("feature '{feature}' of class {class} offers no choices")]
    NotAChoice { class: ClassId, feature: String },

    #[error("choice for feature '{feature}' of class {class} is already resolved")]
    AlreadyResolved { class: ClassId, feature: String },

    #[error("feature '{feature}' has no option '{option}'")]
    UnknownOption { feature: String, option: String },
}

/// One recorded feature-choice resolution. Resolution is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceResolution {
    pub class: ClassId,
    pub level: u32,
    pub feature: String,
    pub option: String,
}

/// Ordered per-class record of individual hit-die rolls, one appended per
/// level gained. History is never pruned when a class is removed, so max
/// HP partially remembers classes no longer held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDiceHistory {
    rolls: BTreeMap<ClassId, Vec<i32>>,
}

impl HitDiceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, class: &ClassId, roll: i32) {
        self.rolls.entry(class.clone()).or_default().push(roll);
    }

    pub fn rolls_for(&self, class: &ClassId) -> &[i32] {
        self.rolls.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of every recorded roll across all classes.
    pub fn total(&self) -> i32 {
        self.rolls.values().flatten().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }
}

/// Report of a single `grant_level` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpReport {
    pub class: ClassId,
    pub previous_level: u32,
    pub new_level: u32,
    /// One hit-die roll per level gained.
    pub hit_dice_rolled: Vec<i32>,
    /// Features whose effects applied immediately.
    pub granted_features: Vec<String>,
    /// Features awaiting a host choice before their effects apply.
    pub pending_features: Vec<String>,
}

/// A feature choice the host still has to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChoice<'a> {
    pub class: ClassId,
    pub feature: &'a LevelFeature,
}

/// Per-entity class record: levels, experience, hit-dice history, and
/// resolved feature choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProgression {
    class_levels: BTreeMap<ClassId, u32>,
    total_xp: u64,
    resolved_choices: Vec<ChoiceResolution>,
    hit_dice: HitDiceHistory,
}

impl ClassProgression {
    pub fn new() -> Self {
        let mut progression = Self {
            class_levels: BTreeMap::new(),
            total_xp: 0,
            resolved_choices: Vec::new(),
            hit_dice: HitDiceHistory::new(),
        };
        progression.ensure_default_class();
        progression
    }

    /// Guarantee the default class exists whenever the class set is empty.
    pub fn ensure_default_class(&mut self) {
        if self.class_levels.is_empty() {
            self.class_levels.insert(ClassId::default_class(), 0);
            debug!("assigned default class at level 0");
        }
    }

    pub fn level(&self, class: &ClassId) -> u32 {
        self.class_levels.get(class).copied().unwrap_or(0)
    }

    pub fn has_class(&self, class: &ClassId) -> bool {
        self.class_levels.contains_key(class)
    }

    /// Total level across every held class.
    pub fn total_level(&self) -> u32 {
        self.class_levels.values().sum()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&ClassId, u32)> {
        self.class_levels.iter().map(|(id, level)| (id, *level))
    }

    pub fn hit_dice(&self) -> &HitDiceHistory {
        &self.hit_dice
    }

    // ------------------------------------------------------------------
    // Experience
    // ------------------------------------------------------------------

    pub fn add_xp(&mut self, amount: u64) {
        self.total_xp += amount;
    }

    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    /// Explicit reset; the only non-monotonic XP operation.
    pub fn reset_xp(&mut self) {
        self.total_xp = 0;
    }

    /// XP needed to gain the next level: fibonacci(total level + 1) x 100.
    /// Super-linear so late levels cost more than linear growth, but well
    /// short of exponential.
    pub fn required_xp_for_next_level(&self) -> u64 {
        fibonacci(self.total_level() as u64 + 1) * 100
    }

    // ------------------------------------------------------------------
    // Leveling
    // ------------------------------------------------------------------

    /// Check prerequisites against stored attribute bases (not totals):
    /// no requirements always passes, otherwise all (or any) required
    /// attributes must be at least 13.
    pub fn can_take_class(attributes: &AttributeSet, class: &ClassDefinition) -> bool {
        if class.required_attributes.is_empty() {
            return true;
        }
        let meets = |attribute: &crate::stats::Attribute| {
            attributes.base(*attribute) >= PREREQUISITE_THRESHOLD
        };
        if class.all_prerequisites_required {
            class.required_attributes.iter().all(meets)
        } else {
            class.required_attributes.iter().any(meets)
        }
    }

    /// Grant `amount` levels in a class: verifies the class exists and (on
    /// first acquisition) its prerequisites, writes the new level, rolls
    /// one hit die per level gained, and reports which features applied
    /// immediately versus which await a choice.
    ///
    /// Gaining a first real class drops the default class; its hit-dice
    /// history (always empty at level 0) is left alone like any other.
    pub fn grant_level<R: Rng>(
        &mut self,
        rng: &mut R,
        catalog: &ContentCatalog,
        attributes: &AttributeSet,
        class_id: &ClassId,
        amount: u32,
    ) -> Result<LevelUpReport, ProgressionError> {
        self.ensure_default_class();

        let class = catalog
            .get(class_id)
            .ok_or_else(|| ProgressionError::UnknownClass(class_id.clone()))?;

        if !self.has_class(class_id) && !Self::can_take_class(attributes, class) {
            return Err(ProgressionError::PrerequisitesNotMet(class_id.clone()));
        }

        let previous_level = self.level(class_id);
        let new_level = previous_level + amount;

        if !self.has_class(class_id) {
            self.class_levels.insert(class_id.clone(), new_level);
            if !class_id.is_default() {
                if self.class_levels.remove(&ClassId::default_class()).is_some() {
                    debug!(class = %class_id, "default class dropped on first real class");
                }
            }
        } else {
            self.class_levels.insert(class_id.clone(), new_level);
        }

        let mut hit_dice_rolled = Vec::new();
        let mut granted_features = Vec::new();
        let mut pending_features = Vec::new();

        for gained_level in (previous_level + 1)..=new_level {
            let roll = roll_dice(rng, 1, class.hit_die.sides());
            self.hit_dice.record(class_id, roll);
            hit_dice_rolled.push(roll);

            for feature in class.features_at(gained_level) {
                if feature.has_choices() {
                    pending_features.push(feature.id.clone());
                } else {
                    granted_features.push(feature.id.clone());
                }
            }
        }

        debug!(
            class = %class_id,
            level = new_level,
            rolled = ?hit_dice_rolled,
            "level granted"
        );

        Ok(LevelUpReport {
            class: class_id.clone(),
            previous_level,
            new_level,
            hit_dice_rolled,
            granted_features,
            pending_features,
        })
    }

    /// Remove a class entirely. The default class returns if the set
    /// empties; hit-dice history for the removed class is retained.
    pub fn remove_class(&mut self, class: &ClassId) {
        if self.class_levels.remove(class).is_some() {
            debug!(class = %class, "class removed");
        }
        self.ensure_default_class();
    }

    // ------------------------------------------------------------------
    // Feature choices
    // ------------------------------------------------------------------

    /// The recorded option for a feature, if any.
    pub fn resolved_option(&self, class: &ClassId, feature: &str) -> Option<&str> {
        self.resolved_choices
            .iter()
            .find(|r| &r.class == class && r.feature == feature)
            .map(|r| r.option.as_str())
    }

    pub fn resolved_choices(&self) -> &[ChoiceResolution] {
        &self.resolved_choices
    }

    /// Every feature with options that has been reached by level but not
    /// yet resolved. Derived, never stored, so save/load cannot
    /// desynchronize the pending set.
    pub fn pending_choices<'a>(&self, catalog: &'a ContentCatalog) -> Vec<PendingChoice<'a>> {
        let mut pending = Vec::new();
        for (class_id, level) in &self.class_levels {
            let Some(class) = catalog.get(class_id) else {
                continue;
            };
            for feature in &class.features {
                if feature.level <= *level
                    && feature.has_choices()
                    && self.resolved_option(class_id, &feature.id).is_none()
                {
                    pending.push(PendingChoice {
                        class: class_id.clone(),
                        feature,
                    });
                }
            }
        }
        pending
    }

    /// Record a feature choice. One-way: a resolved choice cannot be
    /// changed back through this engine.
    pub fn resolve_choice(
        &mut self,
        catalog: &ContentCatalog,
        class_id: &ClassId,
        feature_id: &str,
        option_id: &str,
    ) -> Result<(), ProgressionError> {
        let class = catalog
            .get(class_id)
            .ok_or_else(|| ProgressionError::UnknownClass(class_id.clone()))?;
        let feature = class
            .feature(feature_id)
            .ok_or_else(|| ProgressionError::UnknownFeature {
                class: class_id.clone(),
                feature: feature_id.to_string(),
            })?;
        if !feature.has_choices() {
            return Err(ProgressionError::NotAChoice {
                class: class_id.clone(),
                feature: feature_id.to_string(),
            });
        }
        if self.resolved_option(class_id, feature_id).is_some() {
            return Err(ProgressionError::AlreadyResolved {
                class: class_id.clone(),
                feature: feature_id.to_string(),
            });
        }
        if feature.choice(option_id).is_none() {
            return Err(ProgressionError::UnknownOption {
                feature: feature_id.to_string(),
                option: option_id.to_string(),
            });
        }

        self.resolved_choices.push(ChoiceResolution {
            class: class_id.clone(),
            level: feature.level,
            feature: feature_id.to_string(),
            option: option_id.to_string(),
        });
        debug!(class = %class_id, feature = feature_id, option = option_id, "choice resolved");
        Ok(())
    }

    /// Sum every bonus the entity's granted features contribute to one
    /// stat: unconditional modifiers of reached features plus the chosen
    /// option of each resolved choice. Unresolved choices contribute
    /// nothing. Recomputed on every query; class and feature counts are
    /// small and bounded by content.
    pub fn feature_stat_bonus(&self, catalog: &ContentCatalog, stat: Stat) -> i32 {
        let mut total = 0;
        for (class_id, level) in &self.class_levels {
            let Some(class) = catalog.get(class_id) else {
                warn!(class = %class_id, "class definition missing; skipping its features");
                continue;
            };
            for feature in &class.features {
                if feature.level > *level {
                    continue;
                }
                for modifier in &feature.modifiers {
                    if modifier.stat == stat {
                        total += modifier.value;
                    }
                }
                if let Some(option_id) = self.resolved_option(class_id, &feature.id) {
                    if let Some(choice) = feature.choice(option_id) {
                        for modifier in &choice.modifiers {
                            if modifier.stat == stat {
                                total += modifier.value;
                            }
                        }
                    }
                }
            }
        }
        total
    }
}

impl Default for ClassProgression {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterative fibonacci: fibonacci(0) = 0, fibonacci(1) = 1.
pub fn fibonacci(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ClassDefinition, FeatureChoice};
    use crate::dice::DieType;
    use crate::stats::Attribute;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> ContentCatalog {
        ContentCatalog::builtin()
    }

    fn capable_attributes() -> AttributeSet {
        let mut set = AttributeSet::new();
        for attribute in Attribute::all() {
            set.set_base(Stat::Attribute(attribute), 14);
        }
        set
    }

    #[test]
    fn test_new_progression_holds_default_class() {
        let progression = ClassProgression::new();
        assert_eq!(progression.level(&ClassId::default_class()), 0);
        assert_eq!(progression.total_level(), 0);
    }

    #[test]
    fn test_fibonacci_sequence() {
        let expected = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34];
        for (n, value) in expected.iter().enumerate() {
            assert_eq!(fibonacci(n as u64), *value);
        }
    }

    #[test]
    fn test_required_xp_curve() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        // total level 0 -> 100, 1 -> 100, 2 -> 200, 3 -> 300, 4 -> 500
        let expected = [100u64, 100, 200, 300, 500];
        for required in expected {
            assert_eq!(progression.required_xp_for_next_level(), required);
            progression
                .grant_level(&mut rng, &catalog, &attributes, &ClassId::new("fighter"), 1)
                .unwrap();
        }
    }

    #[test]
    fn test_first_real_class_drops_default() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        progression
            .grant_level(&mut rng, &catalog, &attributes, &ClassId::new("fighter"), 1)
            .unwrap();
        assert!(!progression.has_class(&ClassId::default_class()));
        assert_eq!(progression.level(&ClassId::new("fighter")), 1);
    }

    #[test]
    fn test_removing_last_class_restores_default() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let fighter = ClassId::new("fighter");
        progression
            .grant_level(&mut rng, &catalog, &attributes, &fighter, 2)
            .unwrap();
        progression.remove_class(&fighter);

        assert!(progression.has_class(&ClassId::default_class()));
        assert_eq!(progression.level(&ClassId::default_class()), 0);
    }

    #[test]
    fn test_hit_dice_history_matches_levels_and_survives_removal() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(9);
        let mut progression = ClassProgression::new();

        let fighter = ClassId::new("fighter");
        progression
            .grant_level(&mut rng, &catalog, &attributes, &fighter, 3)
            .unwrap();
        assert_eq!(progression.hit_dice().rolls_for(&fighter).len(), 3);
        for roll in progression.hit_dice().rolls_for(&fighter) {
            assert!((1..=10).contains(roll)); // fighter hit die is a d10
        }

        let total_before = progression.hit_dice().total();
        progression.remove_class(&fighter);
        assert_eq!(progression.hit_dice().total(), total_before);
        assert_eq!(progression.hit_dice().rolls_for(&fighter).len(), 3);
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let result = progression.grant_level(
            &mut rng,
            &catalog,
            &attributes,
            &ClassId::new("no_such_class"),
            1,
        );
        assert_eq!(
            result,
            Err(ProgressionError::UnknownClass(ClassId::new("no_such_class")))
        );
        assert_eq!(progression.total_level(), 0);
    }

    #[test]
    fn test_prerequisites_all_vs_any() {
        let mut any_of = AttributeSet::new();
        any_of.set_base(Stat::Attribute(Attribute::Strength), 13);
        any_of.set_base(Stat::Attribute(Attribute::Dexterity), 8);

        let any_class = ClassDefinition::new("duelist", "Duelist", DieType::D8)
            .with_prerequisites(vec![Attribute::Strength, Attribute::Dexterity], false);
        let all_class = ClassDefinition::new("templar", "Templar", DieType::D10)
            .with_prerequisites(vec![Attribute::Strength, Attribute::Dexterity], true);

        assert!(ClassProgression::can_take_class(&any_of, &any_class));
        assert!(!ClassProgression::can_take_class(&any_of, &all_class));

        let unrestricted = ClassDefinition::new("wanderer", "Wanderer", DieType::D6);
        assert!(ClassProgression::can_take_class(
            &AttributeSet::new(),
            &unrestricted
        ));
    }

    #[test]
    fn test_prerequisites_block_first_acquisition_only() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let weak = AttributeSet::new();
        let fighter = ClassId::new("fighter");
        assert_eq!(
            progression.grant_level(&mut rng, &catalog, &weak, &fighter, 1),
            Err(ProgressionError::PrerequisitesNotMet(fighter.clone()))
        );

        // Qualify, take the class, then lose the attribute: re-levelling
        // an already-held class does not re-check.
        let mut strong = AttributeSet::new();
        strong.set_base(Stat::Attribute(Attribute::Strength), 15);
        progression
            .grant_level(&mut rng, &catalog, &strong, &fighter, 1)
            .unwrap();
        progression
            .grant_level(&mut rng, &catalog, &weak, &fighter, 1)
            .unwrap();
        assert_eq!(progression.level(&fighter), 2);
    }

    #[test]
    fn test_choice_lifecycle() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let fighter = ClassId::new("fighter");
        let report = progression
            .grant_level(&mut rng, &catalog, &attributes, &fighter, 1)
            .unwrap();
        assert_eq!(report.pending_features, vec!["fighting_style".to_string()]);

        // Effects are withheld while the choice is pending.
        assert_eq!(
            progression.feature_stat_bonus(&catalog, Stat::ArmorClass),
            0
        );
        assert_eq!(progression.pending_choices(&catalog).len(), 1);

        progression
            .resolve_choice(&catalog, &fighter, "fighting_style", "defense")
            .unwrap();
        assert_eq!(
            progression.feature_stat_bonus(&catalog, Stat::ArmorClass),
            1
        );
        assert!(progression.pending_choices(&catalog).is_empty());

        // One-way: re-resolving fails and the original choice stands.
        assert_eq!(
            progression.resolve_choice(&catalog, &fighter, "fighting_style", "brute"),
            Err(ProgressionError::AlreadyResolved {
                class: fighter.clone(),
                feature: "fighting_style".to_string(),
            })
        );
        assert_eq!(
            progression.resolved_option(&fighter, "fighting_style"),
            Some("defense")
        );
    }

    #[test]
    fn test_resolve_choice_validates_option() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();
        let fighter = ClassId::new("fighter");
        progression
            .grant_level(&mut rng, &catalog, &attributes, &fighter, 1)
            .unwrap();

        assert_eq!(
            progression.resolve_choice(&catalog, &fighter, "fighting_style", "nonsense"),
            Err(ProgressionError::UnknownOption {
                feature: "fighting_style".to_string(),
                option: "nonsense".to_string(),
            })
        );
    }

    #[test]
    fn test_unconditional_features_apply_immediately() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let scout = ClassId::new("scout");
        let report = progression
            .grant_level(&mut rng, &catalog, &attributes, &scout, 1)
            .unwrap();
        assert_eq!(report.granted_features, vec!["fleet_footed".to_string()]);
        assert_eq!(
            progression.feature_stat_bonus(&catalog, Stat::Attribute(Attribute::Dexterity)),
            1
        );
    }

    #[test]
    fn test_multi_level_grant_rolls_per_level() {
        let catalog = catalog();
        let attributes = capable_attributes();
        let mut rng = StdRng::seed_from_u64(5);
        let mut progression = ClassProgression::new();

        let warden = ClassId::new("warden");
        let report = progression
            .grant_level(&mut rng, &catalog, &attributes, &warden, 3)
            .unwrap();
        assert_eq!(report.new_level, 3);
        assert_eq!(report.hit_dice_rolled.len(), 3);
        // Features from the levels passed through are all reported.
        assert!(report.granted_features.contains(&"thick_hide".to_string()));
        assert!(report.granted_features.contains(&"bulwark".to_string()));
    }

    #[test]
    fn test_feature_choice_builder_round_trip() {
        let choice = FeatureChoice::new("iron_skin", "Iron Skin")
            .with_modifier(Stat::ArmorClass, 2);
        assert_eq!(choice.modifiers.len(), 1);
        assert_eq!(choice.modifiers[0].value, 2);
    }
}

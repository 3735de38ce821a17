//! Combat resolution.
//!
//! Converts an incoming damage event into a dice-based attack: advantage
//! determination, a d20 attack roll against armor class, hit/miss/critical
//! classification, and dice-rolled damage. Abstract damage sources with no
//! declared dice are fitted to an equivalent dice pool so traps and
//! explosions feel native to the dice system.

use crate::dice::{roll_d20, Advantage, D20Roll, DicePool};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weapon property tags the resolver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponProperty {
    /// Attack and damage may use the better of Strength or Dexterity.
    Finesse,
    Light,
    Heavy,
    TwoHanded,
    Reach,
}

/// Host-supplied weapon facts. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    /// Explicit damage dice, when the weapon declares them. Weapons
    /// without dice fall back to abstract-damage conversion.
    pub dice: Option<DicePool>,
    pub properties: Vec<WeaponProperty>,
    pub ranged: bool,
}

impl WeaponProfile {
    pub fn melee() -> Self {
        Self {
            dice: None,
            properties: Vec::new(),
            ranged: false,
        }
    }

    pub fn ranged() -> Self {
        Self {
            dice: None,
            properties: Vec::new(),
            ranged: true,
        }
    }

    pub fn with_dice(mut self, dice: DicePool) -> Self {
        self.dice = Some(dice);
        self
    }

    pub fn with_property(mut self, property: WeaponProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn is_finesse(&self) -> bool {
        self.properties.contains(&WeaponProperty::Finesse)
    }
}

/// Host-supplied spatial facts about one attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSituation {
    /// Attacker is within melee reach of the target.
    pub adjacent: bool,
    pub target_awake: bool,
}

impl AttackSituation {
    /// Advantage for striking an unaware adjacent target; disadvantage for
    /// firing a ranged weapon at melee range. Both at once cancel to a
    /// normal roll.
    pub fn advantage_state(&self, weapon: Option<&WeaponProfile>) -> Advantage {
        let advantage = self.adjacent && !self.target_awake;
        let disadvantage = weapon.map(|w| w.ranged).unwrap_or(false) && self.adjacent;
        Advantage::from_flags(advantage, disadvantage)
    }
}

/// The attacker's already-composed combat numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackerStats {
    pub strength_mod: i32,
    pub dexterity_mod: i32,
    pub proficiency_bonus: i32,
}

impl AttackerStats {
    /// The stat modifier an attack uses: Dexterity forced for ranged
    /// weapons, the better of Strength/Dexterity for Finesse, Strength
    /// otherwise (including unarmed).
    pub fn attack_stat_mod(&self, weapon: Option<&WeaponProfile>) -> i32 {
        match weapon {
            Some(w) if w.ranged => self.dexterity_mod,
            Some(w) if w.is_finesse() => self.strength_mod.max(self.dexterity_mod),
            _ => self.strength_mod,
        }
    }
}

/// Classification of one resolved attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackOutcome {
    Miss,
    Hit,
    CriticalHit,
}

impl AttackOutcome {
    pub fn is_hit(&self) -> bool {
        !matches!(self, AttackOutcome::Miss)
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, AttackOutcome::CriticalHit)
    }
}

/// A completed attack roll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttackRoll {
    pub d20: D20Roll,
    pub total: i32,
    pub target_ac: i32,
    pub outcome: AttackOutcome,
}

/// Classify a rolled d20 against armor class: a natural 20 is always a
/// critical hit; otherwise the modified total must meet or exceed the AC,
/// except that an AC of exactly 0 (unarmored props and other
/// non-combatants) is hit unconditionally.
pub fn determine_outcome(d20: &D20Roll, total: i32, target_ac: i32) -> AttackOutcome {
    if d20.is_natural_20() {
        AttackOutcome::CriticalHit
    } else if target_ac == 0 || total >= target_ac {
        AttackOutcome::Hit
    } else {
        AttackOutcome::Miss
    }
}

/// Roll one attack: advantage from the situation, d20, stat modifier plus
/// proficiency, then hit determination.
pub fn resolve_attack_roll<R: Rng>(
    rng: &mut R,
    stats: &AttackerStats,
    weapon: Option<&WeaponProfile>,
    situation: AttackSituation,
    target_ac: i32,
) -> AttackRoll {
    let advantage = situation.advantage_state(weapon);
    let d20 = roll_d20(rng, advantage);
    let total = d20.kept as i32 + stats.attack_stat_mod(weapon) + stats.proficiency_bonus;
    let outcome = determine_outcome(&d20, total, target_ac);

    debug!(
        kept = d20.kept,
        total,
        target_ac,
        ?advantage,
        ?outcome,
        "attack rolled"
    );

    AttackRoll {
        d20,
        total,
        target_ac,
        outcome,
    }
}

/// Roll a damage pool, doubling the dice (never the modifiers) on a
/// critical hit.
pub fn roll_damage_dice<R: Rng>(rng: &mut R, dice: DicePool, critical: bool) -> i32 {
    let mut damage = dice.roll(rng);
    if critical {
        damage += dice.roll(rng);
    }
    damage
}

/// Convert an abstract damage scalar into rolled dice damage. Scalars of
/// 1 or less skip the dice entirely and deal a single point.
pub fn convert_abstract_damage<R: Rng>(rng: &mut R, original: f32, critical: bool) -> i32 {
    if original <= 1.0 {
        return 1;
    }
    let pool = DicePool::fit_to_damage(original);
    let damage = roll_damage_dice(rng, pool, critical);
    debug!(%pool, original, damage, "abstract damage converted to dice");
    damage
}

/// Compute final damage for a hit: explicit weapon dice when declared,
/// curve-fit conversion otherwise. Entity-sourced attacks add the rounded
/// stat modifier plus proficiency bonus; non-entity sources (traps,
/// explosions) get dice only.
pub fn resolve_damage<R: Rng>(
    rng: &mut R,
    attacker: Option<&AttackerStats>,
    weapon: Option<&WeaponProfile>,
    abstract_damage: f32,
    critical: bool,
) -> i32 {
    let mut damage = match weapon.and_then(|w| w.dice) {
        Some(dice) => roll_damage_dice(rng, dice, critical),
        None => convert_abstract_damage(rng, abstract_damage, critical),
    };

    if let Some(stats) = attacker {
        damage += stats.attack_stat_mod(weapon) + stats.proficiency_bonus;
    }

    damage
}

/// Severity per point of engine damage, so the host's wound model and the
/// hit-point ledger reach incapacitation at the same relative point. The
/// denominator is guarded: a degenerate maximum falls back to a neutral
/// scale of 1.
pub fn severity_scale(downing_threshold: f32, max_hp: i32) -> f32 {
    if max_hp <= 0 {
        return 1.0;
    }
    let scale = downing_threshold / max_hp as f32;
    if scale.is_finite() {
        scale
    } else {
        1.0
    }
}

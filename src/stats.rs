//! Attribute and stat model.
//!
//! Base values live here; derived modifiers are pure functions of the
//! current base and are never stored. Totals (base + feature bonuses +
//! host-supplied modifiers) are composed in the engine facade.

use crate::dice::roll_dice;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The six base character attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Attribute {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Attribute::Strength => "STR",
            Attribute::Dexterity => "DEX",
            Attribute::Constitution => "CON",
            Attribute::Intelligence => "INT",
            Attribute::Wisdom => "WIS",
            Attribute::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Strength => "Strength",
            Attribute::Dexterity => "Dexterity",
            Attribute::Constitution => "Constitution",
            Attribute::Intelligence => "Intelligence",
            Attribute::Wisdom => "Wisdom",
            Attribute::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Attribute; 6] {
        [
            Attribute::Strength,
            Attribute::Dexterity,
            Attribute::Constitution,
            Attribute::Intelligence,
            Attribute::Wisdom,
            Attribute::Charisma,
        ]
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Identifier for any stat the engine can be queried about.
///
/// Attributes and the combat stats are stored per entity; `Modifier` and
/// `TotalLevel` are always derived at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Attribute(Attribute),
    Modifier(Attribute),
    ProficiencyBonus,
    BaseArmorClass,
    ArmorClass,
    TotalLevel,
}

/// Per-entity stored base values.
///
/// Every field distinguishes "never set" from an explicit value so that
/// generation can be first-write-wins, but reads fall back to 0 for unset
/// bases: callers must not conflate the two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    strength: Option<i32>,
    dexterity: Option<i32>,
    constitution: Option<i32>,
    intelligence: Option<i32>,
    wisdom: Option<i32>,
    charisma: Option<i32>,
    proficiency_bonus: Option<i32>,
    base_armor_class: Option<i32>,
    armor_class: Option<i32>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, stat: Stat) -> Option<&Option<i32>> {
        match stat {
            Stat::Attribute(Attribute::Strength) => Some(&self.strength),
            Stat::Attribute(Attribute::Dexterity) => Some(&self.dexterity),
            Stat::Attribute(Attribute::Constitution) => Some(&self.constitution),
            Stat::Attribute(Attribute::Intelligence) => Some(&self.intelligence),
            Stat::Attribute(Attribute::Wisdom) => Some(&self.wisdom),
            Stat::Attribute(Attribute::Charisma) => Some(&self.charisma),
            Stat::ProficiencyBonus => Some(&self.proficiency_bonus),
            Stat::BaseArmorClass => Some(&self.base_armor_class),
            Stat::ArmorClass => Some(&self.armor_class),
            Stat::Modifier(_) | Stat::TotalLevel => None,
        }
    }

    fn slot_mut(&mut self, stat: Stat) -> Option<&mut Option<i32>> {
        match stat {
            Stat::Attribute(Attribute::Strength) => Some(&mut self.strength),
            Stat::Attribute(Attribute::Dexterity) => Some(&mut self.dexterity),
            Stat::Attribute(Attribute::Constitution) => Some(&mut self.constitution),
            Stat::Attribute(Attribute::Intelligence) => Some(&mut self.intelligence),
            Stat::Attribute(Attribute::Wisdom) => Some(&mut self.wisdom),
            Stat::Attribute(Attribute::Charisma) => Some(&mut self.charisma),
            Stat::ProficiencyBonus => Some(&mut self.proficiency_bonus),
            Stat::BaseArmorClass => Some(&mut self.base_armor_class),
            Stat::ArmorClass => Some(&mut self.armor_class),
            Stat::Modifier(_) | Stat::TotalLevel => None,
        }
    }

    /// Stored base for a storable stat; `None` for derived stats or when
    /// nothing was ever written.
    pub fn stored(&self, stat: Stat) -> Option<i32> {
        self.slot(stat).copied().flatten()
    }

    /// Base value of an attribute, defaulting to 0 when unset.
    pub fn base(&self, attribute: Attribute) -> i32 {
        self.stored(Stat::Attribute(attribute)).unwrap_or(0)
    }

    /// Write a base value for a storable stat. Writes to derived stats are
    /// ignored.
    pub fn set_base(&mut self, stat: Stat, value: i32) {
        if let Some(slot) = self.slot_mut(stat) {
            *slot = Some(value);
        }
    }

    /// First-write-wins variant used by generation: a later call is a
    /// no-op when a value already exists.
    pub fn set_base_if_missing(&mut self, stat: Stat, value: i32) {
        if let Some(slot) = self.slot_mut(stat) {
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }

    /// Derived attribute modifier: floor((base - 10) / 2).
    pub fn modifier(&self, attribute: Attribute) -> i32 {
        (self.base(attribute) - 10).div_euclid(2)
    }
}

/// Host-supplied body descriptor for non-player entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyProfile {
    pub body_size: f32,
    pub wildness: f32,
    pub predator: bool,
    pub health_scale: f32,
    pub move_speed: f32,
}

/// Roll the six attributes 3d6 each for a player-controlled entity.
/// Attributes that already have a value are left untouched, so respawns
/// and reloads never re-roll.
pub fn roll_player_attributes<R: Rng>(rng: &mut R, set: &mut AttributeSet) {
    for attribute in Attribute::all() {
        let rolled = roll_dice(rng, 3, 6);
        set.set_base_if_missing(Stat::Attribute(attribute), rolled);
    }
}

/// Derive attributes and combat stats for a non-player entity from its
/// body descriptor. Deterministic, floored to integers, first-write-wins,
/// so differently shaped creatures get differentiated stats without
/// manual authoring.
pub fn derive_body_attributes(set: &mut AttributeSet, body: &BodyProfile) {
    let size = body.body_size;
    let wild = body.wildness;
    let predator_bonus = if body.predator { 2.0 } else { 0.0 };

    let values = [
        (Attribute::Strength, 5.0 + size * 4.0 + predator_bonus),
        (
            Attribute::Dexterity,
            5.0 + size * 2.0 - wild * 3.0 + body.move_speed * 0.5,
        ),
        (
            Attribute::Constitution,
            10.0 + size * 5.0 + body.health_scale * 2.0,
        ),
        (Attribute::Wisdom, 5.0 + wild * 3.0),
        (Attribute::Intelligence, 5.0 + (1.0 - wild) * 4.0),
        (Attribute::Charisma, 5.0 + (1.0 - wild) * 3.0),
    ];
    for (attribute, value) in values {
        set.set_base_if_missing(Stat::Attribute(attribute), value.floor() as i32);
    }

    let armor_predator_bonus = if body.predator { 1.0 } else { 0.0 };
    let base_ac = (10.0 + size * 2.0 + armor_predator_bonus).floor() as i32;
    set.set_base_if_missing(Stat::BaseArmorClass, base_ac);
    set.set_base_if_missing(Stat::ArmorClass, base_ac);
    set.set_base_if_missing(
        Stat::ProficiencyBonus,
        (1.0 + size * 0.2 + (1.0 - wild)).floor() as i32,
    );

    debug!(body_size = size, wildness = wild, "derived body stats");
}

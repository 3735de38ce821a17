//! Class and feature content.
//!
//! Content is read-only at runtime and injected into the engine as a
//! [`ContentCatalog`] at construction, so tests can run against synthetic
//! classes. A built-in catalog covering the default progression tracks is
//! provided for hosts that don't ship their own.

use crate::dice::DieType;
use crate::stats::{Attribute, Stat};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier for a progression class. Classes are data-driven content, so
/// this stays an open identifier rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The fallback class every entity holds when it has no other class.
    pub fn default_class() -> Self {
        Self("commoner".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == "commoner"
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClassId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A flat additive bonus a feature contributes to one stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatModifier {
    pub stat: Stat,
    pub value: i32,
}

impl StatModifier {
    pub fn new(stat: Stat, value: i32) -> Self {
        Self { stat, value }
    }
}

/// One mutually exclusive option of a feature choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureChoice {
    pub id: String,
    pub label: String,
    pub modifiers: Vec<StatModifier>,
}

impl FeatureChoice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, stat: Stat, value: i32) -> Self {
        self.modifiers.push(StatModifier::new(stat, value));
        self
    }
}

/// A feature granted at a specific class level.
///
/// A feature with `choices` is unresolved until the host records one; its
/// effects are withheld until then. Unconditional `modifiers` apply as soon
/// as the feature is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFeature {
    pub level: u32,
    pub id: String,
    pub label: String,
    pub active: bool,
    pub modifiers: Vec<StatModifier>,
    pub choices: Vec<FeatureChoice>,
    /// Opaque ability identifiers unlocked by this feature; not modeled
    /// further by the engine.
    pub abilities: Vec<String>,
}

impl LevelFeature {
    pub fn new(level: u32, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            label: label.into(),
            active: false,
            modifiers: Vec::new(),
            choices: Vec::new(),
            abilities: Vec::new(),
        }
    }

    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn with_modifier(mut self, stat: Stat, value: i32) -> Self {
        self.modifiers.push(StatModifier::new(stat, value));
        self
    }

    pub fn with_choice(mut self, choice: FeatureChoice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_ability(mut self, ability: impl Into<String>) -> Self {
        self.abilities.push(ability.into());
        self
    }

    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    pub fn choice(&self, option_id: &str) -> Option<&FeatureChoice> {
        self.choices.iter().find(|c| c.id == option_id)
    }
}

/// A progression class definition. Read-only content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub id: ClassId,
    pub label: String,
    pub hit_die: DieType,
    pub required_attributes: Vec<Attribute>,
    /// If true every required attribute must meet the threshold; otherwise
    /// any one suffices.
    pub all_prerequisites_required: bool,
    pub features: Vec<LevelFeature>,
}

impl ClassDefinition {
    pub fn new(id: impl Into<ClassId>, label: impl Into<String>, hit_die: DieType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            hit_die,
            required_attributes: Vec::new(),
            all_prerequisites_required: false,
            features: Vec::new(),
        }
    }

    pub fn with_prerequisites(mut self, attributes: Vec<Attribute>, all_required: bool) -> Self {
        self.required_attributes = attributes;
        self.all_prerequisites_required = all_required;
        self
    }

    pub fn with_feature(mut self, feature: LevelFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// Features granted at exactly this level.
    pub fn features_at(&self, level: u32) -> impl Iterator<Item = &LevelFeature> {
        self.features.iter().filter(move |f| f.level == level)
    }

    pub fn feature(&self, feature_id: &str) -> Option<&LevelFeature> {
        self.features.iter().find(|f| f.id == feature_id)
    }
}

/// Immutable registry of class definitions, injected into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCatalog {
    classes: BTreeMap<ClassId, ClassDefinition>,
}

impl ContentCatalog {
    /// Empty catalog containing only the default class.
    pub fn new() -> Self {
        let mut catalog = Self {
            classes: BTreeMap::new(),
        };
        catalog.insert(ClassDefinition::new(
            ClassId::default_class(),
            "Commoner",
            DieType::D4,
        ));
        catalog
    }

    pub fn with_classes(classes: impl IntoIterator<Item = ClassDefinition>) -> Self {
        let mut catalog = Self::new();
        for class in classes {
            catalog.insert(class);
        }
        catalog
    }

    fn insert(&mut self, class: ClassDefinition) {
        self.classes.insert(class.id.clone(), class);
    }

    pub fn get(&self, id: &ClassId) -> Option<&ClassDefinition> {
        self.classes.get(id)
    }

    pub fn contains(&self, id: &ClassId) -> bool {
        self.classes.contains_key(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values()
    }

    /// The built-in class set. Hosts that ship their own content replace
    /// this wholesale at engine construction.
    pub fn builtin() -> ContentCatalog {
        BUILTIN.clone()
    }
}

impl Default for ContentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref BUILTIN: ContentCatalog = ContentCatalog::with_classes([
        ClassDefinition::new("fighter", "Fighter", DieType::D10)
            .with_prerequisites(vec![Attribute::Strength, Attribute::Dexterity], false)
            .with_feature(
                LevelFeature::new(1, "fighting_style", "Fighting Style")
                    .with_choice(
                        FeatureChoice::new("defense", "Defense")
                            .with_modifier(Stat::ArmorClass, 1),
                    )
                    .with_choice(
                        FeatureChoice::new("brute", "Brute")
                            .with_modifier(Stat::Attribute(Attribute::Strength), 1),
                    ),
            )
            .with_feature(
                LevelFeature::new(2, "second_wind", "Second Wind")
                    .active()
                    .with_ability("second_wind"),
            )
            .with_feature(
                LevelFeature::new(4, "hardened", "Hardened")
                    .with_modifier(Stat::Attribute(Attribute::Constitution), 1),
            ),
        ClassDefinition::new("scout", "Scout", DieType::D8)
            .with_prerequisites(vec![Attribute::Dexterity], false)
            .with_feature(
                LevelFeature::new(1, "fleet_footed", "Fleet Footed")
                    .with_modifier(Stat::Attribute(Attribute::Dexterity), 1),
            )
            .with_feature(
                LevelFeature::new(3, "skirmisher", "Skirmisher")
                    .active()
                    .with_ability("skirmish_step"),
            ),
        ClassDefinition::new("mystic", "Mystic", DieType::D6)
            .with_prerequisites(
                vec![Attribute::Intelligence, Attribute::Wisdom],
                true,
            )
            .with_feature(
                LevelFeature::new(1, "attunement", "Attunement")
                    .with_choice(
                        FeatureChoice::new("inward", "Inward Attunement")
                            .with_modifier(Stat::Attribute(Attribute::Wisdom), 1),
                    )
                    .with_choice(
                        FeatureChoice::new("outward", "Outward Attunement")
                            .with_modifier(Stat::Attribute(Attribute::Charisma), 1),
                    ),
            )
            .with_feature(
                LevelFeature::new(2, "warding", "Warding")
                    .with_modifier(Stat::ArmorClass, 1),
            ),
        ClassDefinition::new("warden", "Warden", DieType::D12)
            .with_prerequisites(vec![Attribute::Constitution], false)
            .with_feature(
                LevelFeature::new(1, "thick_hide", "Thick Hide")
                    .with_modifier(Stat::ArmorClass, 1),
            )
            .with_feature(
                LevelFeature::new(2, "bulwark", "Bulwark")
                    .active()
                    .with_ability("bulwark_stance"),
            ),
    ]);
}

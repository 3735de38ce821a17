//! Test support: deterministic RNG and synthetic content.
//!
//! The engine draws all randomness from the caller, so tests pin a seed
//! and replay identical rolls. The sample catalog keeps tests independent
//! of the built-in content.

use crate::content::{ClassDefinition, ContentCatalog, FeatureChoice, LevelFeature};
use crate::dice::DieType;
use crate::stats::{Attribute, AttributeSet, Stat};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A deterministic RNG standing in for the host's shared random stream.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Attribute set with every attribute at 14, clearing any prerequisite.
pub fn capable_attributes() -> AttributeSet {
    let mut set = AttributeSet::new();
    for attribute in Attribute::all() {
        set.set_base(Stat::Attribute(attribute), 14);
    }
    set
}

/// Small synthetic catalog: one martial class with a level-1 choice and
/// one restricted caster class with a passive feature.
pub fn sample_catalog() -> ContentCatalog {
    ContentCatalog::with_classes([
        ClassDefinition::new("soldier", "Soldier", DieType::D10).with_feature(
            LevelFeature::new(1, "drill", "Drill")
                .with_choice(
                    FeatureChoice::new("shield_drill", "Shield Drill")
                        .with_modifier(Stat::ArmorClass, 1),
                )
                .with_choice(
                    FeatureChoice::new("strength_drill", "Strength Drill")
                        .with_modifier(Stat::Attribute(Attribute::Strength), 1),
                ),
        ),
        ClassDefinition::new("sage", "Sage", DieType::D6)
            .with_prerequisites(vec![Attribute::Intelligence], true)
            .with_feature(
                LevelFeature::new(2, "insight", "Insight")
                    .with_modifier(Stat::Attribute(Attribute::Wisdom), 2),
            ),
    ])
}

//! Dice-driven tabletop rules engine.
//!
//! Overlays a host simulation's entities with:
//! - six attribute scores and derived modifiers
//! - class-based progression with per-level features and player choices
//! - hit points built from accumulated hit-dice rolls and constitution
//! - dice-based combat resolution (attack rolls, advantage, criticals)
//!
//! The host drives everything through the [`Engine`] facade and supplies
//! the facts the engine cannot know itself: spatial adjacency, weapon
//! properties, armor class inputs, injury severity, and the shared random
//! stream.
//!
//! # Quick Start
//!
//! ```ignore
//! use dicebound::{ContentCatalog, DamageEvent, Engine, SpawnProfile};
//!
//! let mut engine = Engine::new(ContentCatalog::builtin());
//! let mut rng = rand::thread_rng();
//!
//! let hero = engine.spawn(&mut rng, "Aldera", SpawnProfile::Player);
//! let outcome = engine.grant_level(&mut rng, hero, &"fighter".into(), 1)?;
//! for request in outcome.choice_requests {
//!     engine.resolve_choice(&request.token, &request.options[0].id)?;
//! }
//!
//! let event = DamageEvent::environmental(hero, 20.0, 4.0);
//! if let Some(verdict) = engine.intercept_damage(&mut rng, &event) {
//!     println!("took {} damage", verdict.final_damage);
//! }
//! ```

pub mod combat;
pub mod content;
pub mod dice;
pub mod engine;
pub mod entity;
pub mod hitpoints;
pub mod persist;
pub mod progression;
pub mod stats;
pub mod testing;

// Primary public API
pub use combat::{
    AttackOutcome, AttackRoll, AttackSituation, AttackerStats, WeaponProfile, WeaponProperty,
};
pub use content::{
    ClassDefinition, ClassId, ContentCatalog, FeatureChoice, LevelFeature, StatModifier,
};
pub use dice::{roll_dice, Advantage, D20Roll, DicePool, DieType};
pub use engine::{
    ChoiceRequest, ChoiceToken, DamageEvent, DamageVerdict, Engine, LevelUpOutcome, SpawnProfile,
};
pub use entity::{EntityId, EntitySheet};
pub use hitpoints::{compute_max_hp, DamageOutcome, HitPointLedger, BASE_HIT_POINTS};
pub use persist::{EntityMetadata, EntityState, PersistError, SavedEntity};
pub use progression::{
    fibonacci, ClassProgression, HitDiceHistory, LevelUpReport, ProgressionError,
};
pub use stats::{Attribute, AttributeSet, BodyProfile, Stat};

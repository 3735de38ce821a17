//! QA tests for leveling, feature choices, and hit-point scaling through
//! the engine facade.
//!
//! Run with: `cargo test --test qa_progression`

use dicebound::testing::{sample_catalog, seeded_rng};
use dicebound::{
    Attribute, ClassId, ContentCatalog, Engine, ProgressionError, SpawnProfile, Stat,
};

fn engine_with_player(seed: u64) -> (Engine, dicebound::EntityId, rand::rngs::StdRng) {
    let mut rng = seeded_rng(seed);
    let mut engine = Engine::new(ContentCatalog::builtin());
    let id = engine.spawn(&mut rng, "Subject", SpawnProfile::Player);
    (engine, id, rng)
}

fn qualify_for_everything(engine: &mut Engine, id: dicebound::EntityId) {
    for attribute in Attribute::all() {
        engine.set_stat_base(id, Stat::Attribute(attribute), 14);
    }
}

// =============================================================================
// Leveling and the default class
// =============================================================================

#[test]
fn test_fresh_entity_is_a_level_zero_commoner() {
    let (engine, id, _) = engine_with_player(1);
    let sheet = engine.sheet(id).unwrap();
    assert!(sheet.progression.has_class(&ClassId::default_class()));
    assert_eq!(sheet.progression.total_level(), 0);
    assert_eq!(engine.required_xp_for_next_level(id), Some(100));
}

#[test]
fn test_level_grant_replaces_commoner_and_rolls_hit_dice() {
    let (mut engine, id, mut rng) = engine_with_player(2);
    qualify_for_everything(&mut engine, id);

    let fighter = ClassId::new("fighter");
    let outcome = engine.grant_level(&mut rng, id, &fighter, 1).unwrap();
    assert_eq!(outcome.report.new_level, 1);
    assert_eq!(outcome.report.hit_dice_rolled.len(), 1);

    let sheet = engine.sheet(id).unwrap();
    assert!(!sheet.progression.has_class(&ClassId::default_class()));
    assert_eq!(sheet.progression.hit_dice().rolls_for(&fighter).len(), 1);
}

#[test]
fn test_unknown_class_grant_changes_nothing() {
    let (mut engine, id, mut rng) = engine_with_player(3);
    let bogus = ClassId::new("beekeeper");

    let result = engine.grant_level(&mut rng, id, &bogus, 1);
    assert!(matches!(result, Err(ProgressionError::UnknownClass(_))));

    let sheet = engine.sheet(id).unwrap();
    assert_eq!(sheet.progression.total_level(), 0);
    assert!(sheet.progression.has_class(&ClassId::default_class()));
}

#[test]
fn test_prerequisite_failure_is_a_silent_no_op() {
    let (mut engine, id, mut rng) = engine_with_player(4);
    // Force every attribute below the threshold.
    for attribute in Attribute::all() {
        engine.set_stat_base(id, Stat::Attribute(attribute), 8);
    }

    let result = engine.grant_level(&mut rng, id, &ClassId::new("mystic"), 1);
    assert!(matches!(
        result,
        Err(ProgressionError::PrerequisitesNotMet(_))
    ));
    assert_eq!(engine.sheet(id).unwrap().progression.total_level(), 0);
}

#[test]
fn test_removing_all_classes_restores_commoner() {
    let (mut engine, id, mut rng) = engine_with_player(5);
    qualify_for_everything(&mut engine, id);

    let warden = ClassId::new("warden");
    engine.grant_level(&mut rng, id, &warden, 2).unwrap();
    engine.remove_class(id, &warden);

    let sheet = engine.sheet(id).unwrap();
    assert!(sheet.progression.has_class(&ClassId::default_class()));
    assert_eq!(sheet.progression.level(&ClassId::default_class()), 0);
}

// =============================================================================
// Experience curve
// =============================================================================

#[test]
fn test_xp_requirement_follows_fibonacci_curve() {
    let (mut engine, id, mut rng) = engine_with_player(6);
    qualify_for_everything(&mut engine, id);

    let fighter = ClassId::new("fighter");
    let expected = [100u64, 100, 200, 300, 500, 800];
    for required in expected {
        assert_eq!(engine.required_xp_for_next_level(id), Some(required));
        engine.grant_level(&mut rng, id, &fighter, 1).unwrap();
    }
}

#[test]
fn test_xp_accumulates_monotonically() {
    let (mut engine, id, _) = engine_with_player(7);
    engine.add_xp(id, 40);
    engine.add_xp(id, 0);
    engine.add_xp(id, 60);
    assert_eq!(engine.total_xp(id), Some(100));
}

// =============================================================================
// Feature choices
// =============================================================================

#[test]
fn test_choice_flow_through_the_engine() {
    let mut rng = seeded_rng(8);
    let mut engine = Engine::new(sample_catalog());
    let id = engine.spawn(&mut rng, "Recruit", SpawnProfile::Player);
    qualify_for_everything(&mut engine, id);

    engine.set_stat_base(id, Stat::ArmorClass, 10);

    let soldier = ClassId::new("soldier");
    let outcome = engine.grant_level(&mut rng, id, &soldier, 1).unwrap();
    assert_eq!(outcome.choice_requests.len(), 1);

    let request = &outcome.choice_requests[0];
    assert_eq!(request.feature_id, "drill");
    assert_eq!(request.options.len(), 2);

    // Withheld until resolved.
    assert_eq!(engine.stat_total(id, Stat::ArmorClass, 0), Some(10));
    assert_eq!(engine.pending_choices(id).len(), 1);

    engine
        .resolve_choice(&request.token, "shield_drill")
        .unwrap();
    assert_eq!(engine.stat_total(id, Stat::ArmorClass, 0), Some(11));
    assert!(engine.pending_choices(id).is_empty());

    // One-way: the second answer is rejected.
    let result = engine.resolve_choice(&request.token, "strength_drill");
    assert!(matches!(
        result,
        Err(ProgressionError::AlreadyResolved { .. })
    ));
}

#[test]
fn test_leveling_past_a_pending_choice_never_blocks() {
    let mut rng = seeded_rng(9);
    let mut engine = Engine::new(sample_catalog());
    let id = engine.spawn(&mut rng, "Recruit", SpawnProfile::Player);
    qualify_for_everything(&mut engine, id);

    let soldier = ClassId::new("soldier");
    engine.grant_level(&mut rng, id, &soldier, 1).unwrap();
    // The level-1 drill choice is still pending; further levels succeed.
    engine.grant_level(&mut rng, id, &soldier, 3).unwrap();

    let sheet = engine.sheet(id).unwrap();
    assert_eq!(sheet.progression.level(&soldier), 4);
    assert_eq!(engine.pending_choices(id).len(), 1);
}

// =============================================================================
// Hit points
// =============================================================================

#[test]
fn test_max_hp_formula_from_known_inputs() {
    let (mut engine, id, mut rng) = engine_with_player(10);
    qualify_for_everything(&mut engine, id); // constitution 14 -> +2

    let fighter = ClassId::new("fighter");
    engine.grant_level(&mut rng, id, &fighter, 3).unwrap();

    let sheet = engine.sheet(id).unwrap();
    let dice_total = sheet.progression.hit_dice().total();
    // base 10 + hit dice + CON mod (+2) x (3 levels + 1)
    assert_eq!(engine.max_hp(id), Some(10 + dice_total + 2 * 4));
}

#[test]
fn test_max_hp_never_below_one() {
    let (mut engine, id, _) = engine_with_player(11);
    engine.set_stat_base(id, Stat::Attribute(Attribute::Constitution), 1); // -5
    engine.refresh_max_hp(id);
    assert!(engine.max_hp(id).unwrap() >= 1);
    let current = engine.current_hp(id).unwrap();
    assert!(current >= 0 && current <= engine.max_hp(id).unwrap());
}

#[test]
fn test_level_up_rescales_current_hp_proportionally() {
    let (mut engine, id, mut rng) = engine_with_player(12);
    qualify_for_everything(&mut engine, id);

    // Wound to exactly half.
    let max_before = engine.max_hp(id).unwrap();
    let half = max_before / 2;
    let event = dicebound::DamageEvent::environmental(id, 1.0, 1.0);
    while engine.current_hp(id).unwrap() > half {
        engine.intercept_damage(&mut rng, &event);
    }
    let fraction_before = engine.current_hp(id).unwrap() as f32 / max_before as f32;

    engine
        .grant_level(&mut rng, id, &ClassId::new("warden"), 2)
        .unwrap();

    let max_after = engine.max_hp(id).unwrap();
    let fraction_after = engine.current_hp(id).unwrap() as f32 / max_after as f32;
    assert!(max_after > max_before);
    // Within rounding of one hit point.
    assert!((fraction_before - fraction_after).abs() <= 1.0 / max_after as f32);
}

#[test]
fn test_class_removal_keeps_hit_dice_in_max_hp() {
    let (mut engine, id, mut rng) = engine_with_player(13);
    qualify_for_everything(&mut engine, id);

    let warden = ClassId::new("warden");
    engine.grant_level(&mut rng, id, &warden, 3).unwrap();
    let dice_total = engine
        .sheet(id)
        .unwrap()
        .progression
        .hit_dice()
        .total();

    engine.remove_class(id, &warden);

    // History survives: only the constitution level scaling moved.
    let sheet = engine.sheet(id).unwrap();
    assert_eq!(sheet.progression.hit_dice().total(), dice_total);
    let con_mod = engine.modifier(id, Attribute::Constitution).unwrap();
    assert_eq!(
        engine.max_hp(id),
        Some((10 + dice_total + con_mod).max(1)) // total level back to 0
    );
}

// =============================================================================
// Healing reconciliation
// =============================================================================

#[test]
fn test_healing_ticks_restore_whole_points() {
    let (mut engine, id, mut rng) = engine_with_player(14);

    // Wound the entity first.
    let event = dicebound::DamageEvent::environmental(id, 30.0, 2.0);
    engine.intercept_damage(&mut rng, &event).unwrap();
    let wounded = engine.current_hp(id).unwrap();
    let missing = (engine.max_hp(id).unwrap() - wounded) as f32;
    assert!(missing > 0.0);

    // Heal the host severity away in small ticks; HP follows in whole
    // points and both reach full together.
    let mut severity_remaining = missing * 0.3;
    let mut guard = 0;
    while severity_remaining > 0.0 && guard < 10_000 {
        let tick = severity_remaining.min(0.05);
        engine.reconcile_healing(id, tick, severity_remaining);
        severity_remaining -= tick;
        guard += 1;
    }
    assert_eq!(engine.current_hp(id), engine.max_hp(id));
}

//! The host-facing engine facade.
//!
//! The host simulation drives everything through this type: spawn
//! lifecycle, the damage-interception hook, stat queries, leveling, choice
//! resolution, and healing reconciliation. Hook methods never panic or
//! propagate errors into the host tick; missing entities or content degrade
//! to logged no-ops and safe defaults.

use crate::combat::{
    resolve_attack_roll, resolve_damage, severity_scale, AttackOutcome, AttackRoll,
    AttackSituation, AttackerStats, WeaponProfile,
};
use crate::content::{ClassId, ContentCatalog, FeatureChoice};
use crate::entity::{EntityId, EntitySheet};
use crate::hitpoints::{compute_max_hp, HitPointLedger};
use crate::persist::EntityState;
use crate::progression::{LevelUpReport, ProgressionError};
use crate::stats::{
    derive_body_attributes, roll_player_attributes, Attribute, BodyProfile, Stat,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How a freshly spawned entity's stats are generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SpawnProfile {
    /// Player-controlled: each attribute rolled 3d6 once.
    Player,
    /// Non-player: attributes derived from the host's body descriptor.
    Body(BodyProfile),
}

/// Opaque continuation handle for one pending feature choice.
///
/// Tokens identify the choice by entity, class, and feature, so they stay
/// valid across save/load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceToken {
    entity: EntityId,
    class: ClassId,
    feature: String,
}

/// A feature choice surfaced to the host for later resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceRequest {
    pub token: ChoiceToken,
    pub class: ClassId,
    pub feature_id: String,
    pub feature_label: String,
    pub options: Vec<FeatureChoice>,
}

/// Result of a level grant: the progression report plus any choices the
/// host still has to make. Leveling never blocks on those choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpOutcome {
    pub report: LevelUpReport,
    pub choice_requests: Vec<ChoiceRequest>,
}

/// A damage event intercepted from the host, carrying the host facts the
/// resolver cannot know itself.
#[derive(Debug, Clone)]
pub struct DamageEvent {
    pub target: EntityId,
    /// The host's proposed abstract damage.
    pub amount: f32,
    /// The attacking entity, when the damage comes from one.
    pub instigator: Option<EntityId>,
    pub weapon: Option<WeaponProfile>,
    pub situation: AttackSituation,
    /// True when a projectile carried this damage; a miss consumes it.
    pub projectile: bool,
    /// The host's severity threshold at which the target goes down.
    pub downing_threshold: f32,
}

impl DamageEvent {
    /// A bare, non-attack damage event (traps, explosions, falling).
    pub fn environmental(target: EntityId, amount: f32, downing_threshold: f32) -> Self {
        Self {
            target,
            amount,
            instigator: None,
            weapon: None,
            situation: AttackSituation {
                adjacent: false,
                target_awake: true,
            },
            projectile: false,
            downing_threshold,
        }
    }
}

/// The engine's reply to an intercepted damage event. The host materializes
/// the wound using `severity`; the engine has already decremented its own
/// ledger.
#[derive(Debug, Clone)]
pub struct DamageVerdict {
    pub outcome: AttackOutcome,
    /// The attack roll, for entity-sourced attacks.
    pub attack: Option<AttackRoll>,
    /// Final dice-based damage applied to the ledger.
    pub final_damage: i32,
    /// Proportionally scaled severity for the host's injury model.
    pub severity: f32,
    /// True when this event brought the target to 0 HP.
    pub downed: bool,
    /// True when a projectile was spent without landing (a missed
    /// projectile attack).
    pub projectile_consumed: bool,
}

impl DamageVerdict {
    fn miss(attack: Option<AttackRoll>, projectile: bool) -> Self {
        Self {
            outcome: AttackOutcome::Miss,
            attack,
            final_damage: 0,
            severity: 0.0,
            downed: false,
            projectile_consumed: projectile,
        }
    }
}

/// The rules engine. Owns every entity's components and the injected
/// read-only content catalog. Single-threaded and synchronous: every
/// operation is a bounded computation inside the host's own update loop.
#[derive(Debug)]
pub struct Engine {
    catalog: ContentCatalog,
    entities: HashMap<EntityId, EntitySheet>,
    dev_mode: bool,
}

impl Engine {
    pub fn new(catalog: ContentCatalog) -> Self {
        Self {
            catalog,
            entities: HashMap::new(),
            dev_mode: false,
        }
    }

    /// Enable the developer-only administrative surface.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn sheet(&self, entity: EntityId) -> Option<&EntitySheet> {
        self.entities.get(&entity)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Fresh spawn: generate attributes once and start at full health.
    pub fn spawn<R: Rng>(
        &mut self,
        rng: &mut R,
        name: impl Into<String>,
        profile: SpawnProfile,
    ) -> EntityId {
        let id = EntityId::new();
        let mut sheet = EntitySheet::new(id, name);

        match profile {
            SpawnProfile::Player => {
                roll_player_attributes(rng, &mut sheet.attributes);
                sheet.attributes.set_base_if_missing(Stat::BaseArmorClass, 10);
                let unarmored = 10 + sheet.attributes.modifier(Attribute::Dexterity);
                sheet
                    .attributes
                    .set_base_if_missing(Stat::ArmorClass, unarmored);
            }
            SpawnProfile::Body(body) => {
                derive_body_attributes(&mut sheet.attributes, &body);
            }
        }

        let max = sheet_max_hp(&self.catalog, &sheet);
        sheet.hit_points = HitPointLedger::new(max);

        debug!(entity = %id, name = %sheet.name, max_hp = max, "entity spawned");
        self.entities.insert(id, sheet);
        id
    }

    /// Restore an entity from persisted fields, recomputing only derived
    /// values. Nothing is re-rolled and current HP is preserved exactly.
    pub fn import_entity(&mut self, state: EntityState) -> EntityId {
        let mut sheet = EntitySheet::new(state.id, state.name);
        sheet.attributes = state.attributes;
        sheet.progression = state.progression;
        sheet.progression.ensure_default_class();
        let max = sheet_max_hp(&self.catalog, &sheet);
        sheet.hit_points =
            HitPointLedger::from_saved(state.current_hp, state.healing_budget, max);
        let id = sheet.id;
        debug!(entity = %id, "entity restored from saved state");
        self.entities.insert(id, sheet);
        id
    }

    /// Snapshot an entity's persisted fields: attribute bases, the class
    /// record, current HP, and the healing accumulator. Derived values are
    /// deliberately absent.
    pub fn export_entity(&self, entity: EntityId) -> Option<EntityState> {
        let sheet = self.entities.get(&entity)?;
        Some(EntityState {
            id: sheet.id,
            name: sheet.name.clone(),
            attributes: sheet.attributes.clone(),
            progression: sheet.progression.clone(),
            current_hp: sheet.hit_points.current(),
            healing_budget: sheet.hit_points.healing_budget(),
        })
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> Option<EntitySheet> {
        self.entities.remove(&entity)
    }

    // ------------------------------------------------------------------
    // Stat queries
    // ------------------------------------------------------------------

    /// Total value of a stat: the engine's own base (or derived value)
    /// plus class-feature bonuses plus whatever dynamic modifiers the host
    /// contributes (equipment, status effects). Never cached.
    pub fn stat_total(&self, entity: EntityId, stat: Stat, external: i32) -> Option<i32> {
        let sheet = self.entities.get(&entity)?;
        Some(sheet_stat_total(&self.catalog, sheet, stat, external))
    }

    /// Derived attribute modifier including feature bonuses.
    pub fn modifier(&self, entity: EntityId, attribute: Attribute) -> Option<i32> {
        self.stat_total(entity, Stat::Modifier(attribute), 0)
    }

    /// Stored base value of a stat; 0 when unset. Callers must not
    /// conflate "unset" with a genuinely rolled zero.
    pub fn stat_base(&self, entity: EntityId, stat: Stat) -> Option<i32> {
        let sheet = self.entities.get(&entity)?;
        Some(sheet.attributes.stored(stat).unwrap_or(0))
    }

    /// Write a base value for a storable stat. Constitution changes move
    /// max HP, so the ledger is refreshed (and current HP rescaled) along
    /// with every write.
    pub fn set_stat_base(&mut self, entity: EntityId, stat: Stat, value: i32) {
        if let Some(sheet) = self.entities.get_mut(&entity) {
            sheet.attributes.set_base(stat, value);
            let max = sheet_max_hp(&self.catalog, sheet);
            sheet.hit_points.refresh_max(max);
        }
    }

    /// Target armor class; 0 when the entity is unknown or has no armor
    /// class at all, which the resolver treats as an unconditional hit.
    pub fn armor_class(&self, entity: EntityId) -> i32 {
        self.stat_total(entity, Stat::ArmorClass, 0).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Hit points
    // ------------------------------------------------------------------

    /// Maximum HP, recomputed from hit-dice history, constitution, and
    /// total level on every call.
    pub fn max_hp(&self, entity: EntityId) -> Option<i32> {
        let sheet = self.entities.get(&entity)?;
        Some(sheet_max_hp(&self.catalog, sheet))
    }

    pub fn current_hp(&self, entity: EntityId) -> Option<i32> {
        Some(self.entities.get(&entity)?.hit_points.current())
    }

    /// Incapacitation query the host layers on top of its own logic.
    /// Unknown entities are not incapacitated.
    pub fn is_incapacitated(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .map(|s| s.hit_points.is_downed())
            .unwrap_or(false)
    }

    /// Recompute max HP and rescale current HP proportionally. Called
    /// internally after every mutation that can move the maximum.
    pub fn refresh_max_hp(&mut self, entity: EntityId) {
        let Some(sheet) = self.entities.get_mut(&entity) else {
            return;
        };
        let max = sheet_max_hp(&self.catalog, sheet);
        sheet.hit_points.refresh_max(max);
    }

    /// Per-tick healing reconciliation hook. Returns whole HP restored.
    pub fn reconcile_healing(
        &mut self,
        entity: EntityId,
        healed_severity: f32,
        missing_severity: f32,
    ) -> i32 {
        let Some(sheet) = self.entities.get_mut(&entity) else {
            warn!(entity = %entity, "healing reconciliation for unknown entity");
            return 0;
        };
        sheet
            .hit_points
            .reconcile_healing(healed_severity, missing_severity)
    }

    // ------------------------------------------------------------------
    // Progression
    // ------------------------------------------------------------------

    /// Grant levels in a class. Unknown classes and unmet prerequisites
    /// are reported (and logged) without any state change.
    pub fn grant_level<R: Rng>(
        &mut self,
        rng: &mut R,
        entity: EntityId,
        class: &ClassId,
        amount: u32,
    ) -> Result<LevelUpOutcome, ProgressionError> {
        let Some(sheet) = self.entities.get_mut(&entity) else {
            warn!(entity = %entity, "level grant for unknown entity");
            return Err(ProgressionError::UnknownClass(class.clone()));
        };

        let report = match sheet.progression.grant_level(
            rng,
            &self.catalog,
            &sheet.attributes,
            class,
            amount,
        ) {
            Ok(report) => report,
            Err(error) => {
                warn!(entity = %sheet.name, class = %class, %error, "level grant skipped");
                return Err(error);
            }
        };

        let max = sheet_max_hp(&self.catalog, sheet);
        sheet.hit_points.refresh_max(max);

        let choice_requests = report
            .pending_features
            .iter()
            .filter_map(|feature_id| {
                let definition = self.catalog.get(class)?;
                let feature = definition.feature(feature_id)?;
                Some(ChoiceRequest {
                    token: ChoiceToken {
                        entity,
                        class: class.clone(),
                        feature: feature_id.clone(),
                    },
                    class: class.clone(),
                    feature_id: feature_id.clone(),
                    feature_label: feature.label.clone(),
                    options: feature.choices.clone(),
                })
            })
            .collect();

        Ok(LevelUpOutcome {
            report,
            choice_requests,
        })
    }

    /// Developer-only level grant, gated behind the dev-mode flag; not
    /// reachable in normal play.
    pub fn debug_grant_level<R: Rng>(
        &mut self,
        rng: &mut R,
        entity: EntityId,
        class: &ClassId,
        amount: u32,
    ) -> Option<LevelUpOutcome> {
        if !self.dev_mode {
            warn!("debug level grant rejected: dev mode is off");
            return None;
        }
        self.grant_level(rng, entity, class, amount).ok()
    }

    /// Record the host's answer to a pending feature choice. One-way.
    pub fn resolve_choice(
        &mut self,
        token: &ChoiceToken,
        option_id: &str,
    ) -> Result<(), ProgressionError> {
        let Some(sheet) = self.entities.get_mut(&token.entity) else {
            warn!(entity = %token.entity, "choice resolution for unknown entity");
            return Err(ProgressionError::UnknownClass(token.class.clone()));
        };

        sheet
            .progression
            .resolve_choice(&self.catalog, &token.class, &token.feature, option_id)?;

        // A resolved choice can move constitution or level bonuses.
        let max = sheet_max_hp(&self.catalog, sheet);
        sheet.hit_points.refresh_max(max);
        Ok(())
    }

    /// Every unresolved feature choice for an entity.
    pub fn pending_choices(&self, entity: EntityId) -> Vec<ChoiceRequest> {
        let Some(sheet) = self.entities.get(&entity) else {
            return Vec::new();
        };
        sheet
            .progression
            .pending_choices(&self.catalog)
            .into_iter()
            .map(|pending| ChoiceRequest {
                token: ChoiceToken {
                    entity,
                    class: pending.class.clone(),
                    feature: pending.feature.id.clone(),
                },
                class: pending.class,
                feature_id: pending.feature.id.clone(),
                feature_label: pending.feature.label.clone(),
                options: pending.feature.choices.clone(),
            })
            .collect()
    }

    pub fn add_xp(&mut self, entity: EntityId, amount: u64) {
        if let Some(sheet) = self.entities.get_mut(&entity) {
            sheet.progression.add_xp(amount);
        }
    }

    pub fn total_xp(&self, entity: EntityId) -> Option<u64> {
        Some(self.entities.get(&entity)?.progression.total_xp())
    }

    pub fn required_xp_for_next_level(&self, entity: EntityId) -> Option<u64> {
        Some(
            self.entities
                .get(&entity)?
                .progression
                .required_xp_for_next_level(),
        )
    }

    /// Remove a class; the default class returns if the set empties, and
    /// max HP is refreshed (history is retained, so only the constitution
    /// scaling moves).
    pub fn remove_class(&mut self, entity: EntityId, class: &ClassId) {
        let Some(sheet) = self.entities.get_mut(&entity) else {
            return;
        };
        sheet.progression.remove_class(class);
        let max = sheet_max_hp(&self.catalog, sheet);
        sheet.hit_points.refresh_max(max);
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// The damage-interception hook. Returns `None` when the target is
    /// unknown to the engine; the host then applies its own unmodified
    /// path. Otherwise the abstract damage is converted into a dice-based
    /// result, the ledger is decremented, and the verdict carries the
    /// scaled severity for the host's injury model.
    pub fn intercept_damage<R: Rng>(
        &mut self,
        rng: &mut R,
        event: &DamageEvent,
    ) -> Option<DamageVerdict> {
        if !self.entities.contains_key(&event.target) {
            warn!(target = %event.target, "damage event for unknown target");
            return None;
        }

        let attacker_stats = event.instigator.and_then(|id| self.attacker_stats(id));
        if event.instigator.is_some() && attacker_stats.is_none() {
            // Instigator named but unknown: resolve defensively as a miss.
            warn!(target = %event.target, "damage event with unknown instigator");
            return Some(DamageVerdict::miss(None, event.projectile));
        }

        let target_ac = self.armor_class(event.target);
        let max_hp = self.max_hp(event.target).unwrap_or(1);

        let (attack, outcome) = match attacker_stats {
            Some(stats) => {
                let roll = resolve_attack_roll(
                    rng,
                    &stats,
                    event.weapon.as_ref(),
                    event.situation,
                    target_ac,
                );
                (Some(roll), roll.outcome)
            }
            // Non-entity sources (traps, explosions) make no attack roll.
            None => (None, AttackOutcome::Hit),
        };

        if !outcome.is_hit() {
            debug!(target = %event.target, "attack missed");
            return Some(DamageVerdict::miss(attack, event.projectile));
        }

        let final_damage = resolve_damage(
            rng,
            attacker_stats.as_ref(),
            event.weapon.as_ref(),
            event.amount,
            outcome.is_critical(),
        );

        let sheet = self.entities.get_mut(&event.target)?;
        let damage_outcome = sheet.hit_points.apply_damage(final_damage);
        let severity =
            final_damage as f32 * severity_scale(event.downing_threshold, max_hp);

        debug!(
            target = %sheet.name,
            final_damage,
            severity,
            critical = outcome.is_critical(),
            "damage resolved"
        );

        Some(DamageVerdict {
            outcome,
            attack,
            final_damage,
            severity,
            downed: damage_outcome.dropped_to_zero,
            projectile_consumed: false,
        })
    }

    /// Compose the attacker-side combat numbers from stat totals.
    fn attacker_stats(&self, entity: EntityId) -> Option<AttackerStats> {
        let sheet = self.entities.get(&entity)?;
        Some(AttackerStats {
            strength_mod: sheet_stat_total(
                &self.catalog,
                sheet,
                Stat::Modifier(Attribute::Strength),
                0,
            ),
            dexterity_mod: sheet_stat_total(
                &self.catalog,
                sheet,
                Stat::Modifier(Attribute::Dexterity),
                0,
            ),
            proficiency_bonus: sheet_stat_total(&self.catalog, sheet, Stat::ProficiencyBonus, 0),
        })
    }
}

/// Total stat value for one sheet: stored base or derived value, plus
/// feature bonuses targeting that stat, plus host-supplied modifiers.
fn sheet_stat_total(
    catalog: &ContentCatalog,
    sheet: &EntitySheet,
    stat: Stat,
    external: i32,
) -> i32 {
    let own = match stat {
        Stat::Attribute(attribute) => sheet.attributes.base(attribute),
        // The modifier derives from the stored base alone; bonuses aimed
        // at the modifier stat itself still stack on top.
        Stat::Modifier(attribute) => sheet.attributes.modifier(attribute),
        Stat::ProficiencyBonus => sheet
            .attributes
            .stored(Stat::ProficiencyBonus)
            .unwrap_or_else(|| 1 + sheet.progression.total_level() as i32 / 4),
        Stat::BaseArmorClass | Stat::ArmorClass => sheet.attributes.stored(stat).unwrap_or(0),
        Stat::TotalLevel => sheet.progression.total_level() as i32,
    };
    own + sheet.progression.feature_stat_bonus(catalog, stat) + external
}

/// Recompute max HP for one sheet from its recomputation inputs.
fn sheet_max_hp(catalog: &ContentCatalog, sheet: &EntitySheet) -> i32 {
    let constitution_mod = sheet_stat_total(
        catalog,
        sheet,
        Stat::Modifier(Attribute::Constitution),
        0,
    );
    let total_level = sheet_stat_total(catalog, sheet, Stat::TotalLevel, 0).max(0) as u32;
    compute_max_hp(
        sheet.progression.hit_dice().total(),
        constitution_mod,
        total_level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Attribute;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn player_engine() -> (Engine, EntityId, StdRng) {
        let mut rng = StdRng::seed_from_u64(99);
        let mut engine = Engine::new(ContentCatalog::builtin());
        let id = engine.spawn(&mut rng, "Tester", SpawnProfile::Player);
        (engine, id, rng)
    }

    #[test]
    fn test_spawn_starts_at_full_health() {
        let (engine, id, _) = player_engine();
        assert_eq!(engine.current_hp(id), engine.max_hp(id));
        assert!(engine.max_hp(id).unwrap() >= 1);
        assert!(!engine.is_incapacitated(id));
    }

    #[test]
    fn test_spawned_player_has_rolled_attributes() {
        let (engine, id, _) = player_engine();
        let sheet = engine.sheet(id).unwrap();
        for attribute in Attribute::all() {
            assert!((3..=18).contains(&sheet.attributes.base(attribute)));
        }
    }

    #[test]
    fn test_stat_total_composes_external_modifiers() {
        let (engine, id, _) = player_engine();
        let bare = engine
            .stat_total(id, Stat::Attribute(Attribute::Strength), 0)
            .unwrap();
        let buffed = engine
            .stat_total(id, Stat::Attribute(Attribute::Strength), 4)
            .unwrap();
        assert_eq!(buffed, bare + 4);
    }

    #[test]
    fn test_unknown_entity_queries_are_safe() {
        let (mut engine, _, mut rng) = player_engine();
        let ghost = EntityId::new();
        assert_eq!(engine.max_hp(ghost), None);
        assert!(!engine.is_incapacitated(ghost));
        assert_eq!(engine.armor_class(ghost), 0);
        assert_eq!(engine.reconcile_healing(ghost, 1.0, 1.0), 0);
        let event = DamageEvent::environmental(ghost, 10.0, 2.0);
        assert!(engine.intercept_damage(&mut rng, &event).is_none());
    }

    #[test]
    fn test_debug_grant_requires_dev_mode() {
        let (mut engine, id, mut rng) = player_engine();
        let fighter = ClassId::new("warden");
        assert!(engine
            .debug_grant_level(&mut rng, id, &fighter, 1)
            .is_none());
        assert_eq!(engine.sheet(id).unwrap().progression.total_level(), 0);
    }

    #[test]
    fn test_debug_grant_in_dev_mode() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut engine = Engine::new(ContentCatalog::builtin()).with_dev_mode(true);
        let id = engine.spawn(&mut rng, "Dev", SpawnProfile::Player);
        engine.set_stat_base(id, Stat::Attribute(Attribute::Intelligence), 14);
        engine.set_stat_base(id, Stat::Attribute(Attribute::Wisdom), 14);

        let outcome = engine
            .debug_grant_level(&mut rng, id, &ClassId::new("mystic"), 1)
            .expect("dev-mode grant succeeds");
        assert_eq!(outcome.report.new_level, 1);
        assert_eq!(engine.sheet(id).unwrap().progression.total_level(), 1);
    }

    #[test]
    fn test_environmental_damage_needs_no_attack_roll() {
        let (mut engine, id, mut rng) = player_engine();
        let before = engine.current_hp(id).unwrap();
        let event = DamageEvent::environmental(id, 20.0, 4.0);
        let verdict = engine.intercept_damage(&mut rng, &event).unwrap();

        assert_eq!(verdict.outcome, AttackOutcome::Hit);
        assert!(verdict.attack.is_none());
        // Damage 20 fits 3d4; no stat bonus for non-entity sources.
        assert!((3..=12).contains(&verdict.final_damage));
        assert_eq!(
            engine.current_hp(id).unwrap(),
            (before - verdict.final_damage).max(0)
        );
    }

    #[test]
    fn test_severity_scales_with_downing_threshold() {
        let (mut engine, id, mut rng) = player_engine();
        let max = engine.max_hp(id).unwrap();
        let event = DamageEvent::environmental(id, 20.0, 4.0);
        let verdict = engine.intercept_damage(&mut rng, &event).unwrap();
        let expected = verdict.final_damage as f32 * (4.0 / max as f32);
        assert!((verdict.severity - expected).abs() < 1e-5);
    }
}

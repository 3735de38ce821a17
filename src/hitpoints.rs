//! Hit-point ledger.
//!
//! Maximum HP is never cached across ticks: the engine recomputes it on
//! demand from hit-dice history, constitution, and total level, then hands
//! it to the ledger, which rescales current HP proportionally whenever the
//! maximum moves. Healing arrives as fractional host-severity deltas and is
//! banked until it converts into whole hit points.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Base HP every entity has before hit dice and constitution scaling.
pub const BASE_HIT_POINTS: i32 = 10;

/// Maximum HP from its recomputation inputs: base + every recorded
/// hit-die roll + constitution modifier scaled by (total level + 1),
/// floored at 1 so constitution can lower HP but never zero it.
pub fn compute_max_hp(hit_dice_total: i32, constitution_modifier: i32, total_level: u32) -> i32 {
    let total =
        BASE_HIT_POINTS + hit_dice_total + constitution_modifier * (total_level as i32 + 1);
    total.max(1)
}

/// Result of applying damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    /// HP actually removed after clamping.
    pub damage_taken: i32,
    /// True when this damage brought the entity to 0 HP.
    pub dropped_to_zero: bool,
}

/// Per-entity current-HP tracking.
///
/// Only `current` and the healing accumulator are persistent state; the
/// maximum is a derived value re-supplied after every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitPointLedger {
    current: i32,
    /// Most recent recomputed maximum; the rescaling baseline.
    max: i32,
    /// Banked host-severity healing not yet worth a whole hit point.
    healing_budget: f32,
}

impl HitPointLedger {
    /// Fresh ledger at full health.
    pub fn new(max: i32) -> Self {
        let max = max.max(1);
        Self {
            current: max,
            max,
            healing_budget: 0.0,
        }
    }

    /// Rebuild from persisted fields. The caller must follow up with
    /// [`HitPointLedger::refresh_max`] once derived values are available.
    pub fn from_saved(current: i32, healing_budget: f32, max: i32) -> Self {
        let max = max.max(1);
        Self {
            current: current.clamp(0, max),
            max,
            healing_budget,
        }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn missing(&self) -> i32 {
        self.max - self.current
    }

    pub fn is_downed(&self) -> bool {
        self.current <= 0
    }

    pub fn healing_budget(&self) -> f32 {
        self.healing_budget
    }

    /// Accept a freshly recomputed maximum. When it differs from the
    /// previous one, current HP is rescaled to preserve the entity's
    /// health fraction: round(old_current / old_max x new_max).
    pub fn refresh_max(&mut self, new_max: i32) {
        let new_max = new_max.max(1);
        if new_max == self.max {
            return;
        }
        if self.max > 0 {
            let fraction = self.current as f32 / self.max as f32;
            self.current = (fraction * new_max as f32).round() as i32;
        }
        self.max = new_max;
        self.current = self.current.clamp(0, self.max);
        debug!(current = self.current, max = self.max, "max HP refreshed");
    }

    /// Remove hit points, clamped into [0, max]. Reaching 0 signals a
    /// downed condition; it does not destroy the entity.
    pub fn apply_damage(&mut self, amount: i32) -> DamageOutcome {
        let before = self.current;
        self.current = (self.current - amount).clamp(0, self.max);
        let outcome = DamageOutcome {
            damage_taken: before - self.current,
            dropped_to_zero: before > 0 && self.current == 0,
        };
        if outcome.dropped_to_zero {
            debug!("entity reached 0 HP and may be downed");
        }
        outcome
    }

    /// Restore whole hit points directly, clamped to the maximum.
    pub fn restore(&mut self, amount: i32) -> i32 {
        let before = self.current;
        self.current = (self.current + amount).clamp(0, self.max);
        self.current - before
    }

    /// Fold one host healing tick into the ledger.
    ///
    /// `healed_severity` is how much injury severity the host healed this
    /// tick; `missing_severity` is its total outstanding severity. The
    /// conversion rate is missing severity per missing hit point, so both
    /// health representations reach "full" together: each time the banked
    /// severity covers one hit point's worth, exactly one whole HP is
    /// restored. Returns the number of hit points restored.
    pub fn reconcile_healing(&mut self, healed_severity: f32, missing_severity: f32) -> i32 {
        let missing_hp = self.missing();
        if missing_hp <= 0 {
            self.healing_budget = 0.0;
            return 0;
        }

        let mut damage_scale = missing_severity / missing_hp as f32;
        if !damage_scale.is_finite() || damage_scale <= 0.0 {
            damage_scale = 1.0;
        }

        self.healing_budget += healed_severity;

        let mut restored = 0;
        while self.healing_budget >= damage_scale && self.current < self.max {
            self.current += 1;
            self.healing_budget -= damage_scale;
            restored += 1;
        }
        if self.missing() == 0 {
            self.healing_budget = 0.0;
        }
        restored
    }
}

//! Dice rolling primitives.
//!
//! Every roll draws from a caller-supplied RNG, so determinism and replay
//! follow the host simulation's shared random stream; the engine keeps no
//! private RNG state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Build an advantage state from the two situational flags.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }
}

/// Standard die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// All die types, smallest first. Iteration order matters to the
    /// damage fit below: earlier entries win ties.
    pub fn all() -> [DieType; 7] {
        [
            DieType::D4,
            DieType::D6,
            DieType::D8,
            DieType::D10,
            DieType::D12,
            DieType::D20,
            DieType::D100,
        ]
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Roll `count` dice of `sides` sides and sum them. `count = 0` rolls
/// nothing and returns 0.
pub fn roll_dice<R: Rng>(rng: &mut R, count: u32, sides: u32) -> i32 {
    let mut total = 0;
    for _ in 0..count {
        total += rng.gen_range(1..=sides) as i32;
    }
    total
}

/// A homogeneous pool of dice (e.g. 2d6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicePool {
    pub count: u32,
    pub die: DieType,
}

impl DicePool {
    pub fn new(count: u32, die: DieType) -> Self {
        Self { count, die }
    }

    /// Roll the pool once.
    pub fn roll<R: Rng>(&self, rng: &mut R) -> i32 {
        roll_dice(rng, self.count, self.die.sides())
    }

    /// Expected value used by the damage fit: count x sides / 2 + 1.
    pub fn expected_value(&self) -> f32 {
        (self.count * self.die.sides()) as f32 / 2.0 + 1.0
    }

    /// Find the pool whose expected value is closest to 35% of an abstract
    /// damage scalar, searching every die type at counts 1..=20. Strict
    /// improvement only, so the first pool found wins ties and smaller die
    /// sizes take precedence.
    pub fn fit_to_damage(original_damage: f32) -> DicePool {
        let target = original_damage * 0.35;
        let mut best = DicePool::new(1, DieType::D4);
        let mut best_difference = f32::MAX;

        for die in DieType::all() {
            for count in 1..=20 {
                let pool = DicePool::new(count, die);
                let difference = (pool.expected_value() - target).abs();
                if difference < best_difference {
                    best_difference = difference;
                    best = pool;
                }
            }
        }

        best
    }
}

impl fmt::Display for DicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.die)
    }
}

/// Result of a d20 check roll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct D20Roll {
    /// The die that counts after applying advantage/disadvantage.
    pub kept: u32,
    /// The discarded second die, when one was rolled.
    pub discarded: Option<u32>,
    pub advantage: Advantage,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.kept == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.kept == 1
    }
}

/// Roll a d20 under an advantage state: two dice keeping the higher for
/// advantage, the lower for disadvantage, one die otherwise.
pub fn roll_d20<R: Rng>(rng: &mut R, advantage: Advantage) -> D20Roll {
    match advantage {
        Advantage::Normal => D20Roll {
            kept: rng.gen_range(1..=20),
            discarded: None,
            advantage,
        },
        Advantage::Advantage | Advantage::Disadvantage => {
            let first = rng.gen_range(1..=20);
            let second = rng.gen_range(1..=20);
            let (kept, discarded) = if advantage == Advantage::Advantage {
                (first.max(second), first.min(second))
            } else {
                (first.min(second), first.max(second))
            };
            D20Roll {
                kept,
                discarded: Some(discarded),
                advantage,
            }
        }
    }
}

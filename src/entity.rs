//! Entity identity and the per-entity component sheet.

use crate::hitpoints::HitPointLedger;
use crate::progression::ClassProgression;
use crate::stats::AttributeSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity in the host simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the engine tracks about one entity. Each entity owns exactly
/// one of each component; there is no inheritance anywhere in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySheet {
    pub id: EntityId,
    /// Display name used in logs and reports.
    pub name: String,
    pub attributes: AttributeSet,
    pub progression: ClassProgression,
    pub hit_points: HitPointLedger,
}

impl EntitySheet {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: AttributeSet::new(),
            progression: ClassProgression::new(),
            hit_points: HitPointLedger::new(1),
        }
    }
}

//! Persistence of per-entity engine state.
//!
//! The save format is owned by the host; this module defines the logical
//! fields and guarantees they round-trip exactly. Only recomputation
//! inputs are persisted — derived values such as max HP are rebuilt after
//! load, so a reload can never drift from the pre-save state.

use crate::entity::EntityId;
use crate::progression::ClassProgression;
use crate::stats::AttributeSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// The complete persisted state of one entity: attribute bases, the class
/// record (levels, XP, resolved choices, hit-dice history), current HP,
/// and the fractional healing accumulator. Nothing derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    pub name: String,
    pub attributes: AttributeSet,
    pub progression: ClassProgression,
    pub current_hp: i32,
    pub healing_budget: f32,
}

/// A saved entity file with version and quick-access metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEntity {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the save was created.
    pub saved_at: String,

    /// The persisted entity state.
    pub entity: EntityState,

    /// Metadata about the save.
    pub metadata: EntityMetadata,
}

/// Quick-display metadata, readable without loading the full state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub total_level: u32,
    pub classes: Vec<String>,
}

impl SavedEntity {
    pub fn new(entity: EntityState) -> Self {
        let metadata = EntityMetadata {
            name: entity.name.clone(),
            total_level: entity.progression.total_level(),
            classes: entity
                .progression
                .classes()
                .map(|(id, level)| format!("{id} {level}"))
                .collect(),
        };

        Self {
            version: SAVE_VERSION,
            saved_at: timestamp_now(),
            entity,
            metadata,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Read a save's metadata without loading the full state.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<EntityMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: EntityMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }
}

/// Generate a save path for an entity by name.
pub fn entity_save_path(dir: impl AsRef<Path>, name: &str) -> std::path::PathBuf {
    let sanitized = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    dir.as_ref().join(format!("{sanitized}.json"))
}

/// Current timestamp as seconds since the epoch.
fn timestamp_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", now.as_secs())
}

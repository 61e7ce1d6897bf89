//! Entity trait - common interface for all persisted record types

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::core::identity::{EntityId, EntityPrefix};

/// Common trait for submissions, baselines, composition records and incidents
pub trait Entity: Serialize + DeserializeOwned {
    /// The entity type prefix (e.g., SUB, INC)
    const PREFIX: EntityPrefix;

    /// Get the entity's unique ID
    fn id(&self) -> &EntityId;

    /// Product the entity belongs to
    fn product(&self) -> &str;

    /// Get the creation timestamp
    fn created(&self) -> DateTime<Utc>;
}

/// One-line summary used by CLI output
pub fn summary_line<E: Entity>(entity: &E) -> String {
    format!(
        "{} {} ({})",
        entity.id(),
        entity.product(),
        entity.created().format("%Y-%m-%d %H:%M")
    )
}

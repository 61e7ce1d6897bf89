//! Baseline entity - the authoritative attribute set for one product

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::entity::Entity;
use crate::core::identity::{AttributeKey, EntityId, EntityPrefix};
use crate::core::policy::FieldValue;
use crate::entities::rule::PolicyKind;

/// One resolved attribute in a baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineField {
    /// Resolved value
    pub value: FieldValue,

    /// Policy that produced the value
    pub policy: PolicyKind,

    /// Submissions that contributed to the value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<EntityId>,

    /// Whether a human may fill or change the value
    #[serde(default = "default_true")]
    pub editable: bool,

    /// Marked for human entry (manual policy)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_manual_entry: bool,
}

fn default_true() -> bool {
    true
}

/// A Baseline snapshot. Each recalculation produces a new snapshot with the
/// next version number; snapshots are never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    /// Unique identifier
    pub id: EntityId,

    /// Product this baseline belongs to
    pub product: String,

    /// Baseline variant (e.g. retail, bulk); rules may be scoped to variants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Snapshot version, starting at 1
    pub version: u32,

    /// Resolved attributes
    #[serde(default)]
    pub fields: BTreeMap<AttributeKey, BaselineField>,

    /// Calculation timestamp
    pub created: DateTime<Utc>,
}

impl Entity for Baseline {
    const PREFIX: EntityPrefix = EntityPrefix::Bsl;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn product(&self) -> &str {
        &self.product
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

impl Baseline {
    /// Create an empty snapshot at the given version
    pub fn new(product: impl Into<String>, variant: Option<String>, version: u32) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Bsl),
            product: product.into(),
            variant,
            version,
            fields: BTreeMap::new(),
            created: Utc::now(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&BaselineField> {
        self.fields.get(key)
    }

    /// Raw expected value for comparisons; unset and blocked fields have none
    pub fn expected(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(|f| f.value.as_raw())
    }

    /// Keys still waiting on a human
    pub fn pending_manual(&self) -> Vec<&AttributeKey> {
        self.fields
            .iter()
            .filter(|(_, f)| f.needs_manual_entry && f.value.is_unset())
            .map(|(k, _)| k)
            .collect()
    }

    /// Every submission id that contributed to any field
    pub fn contributing_submissions(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .fields
            .values()
            .flat_map(|f| f.sources.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

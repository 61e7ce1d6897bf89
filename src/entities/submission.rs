//! Submission entity - one party's attribute values for a product

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::entity::Entity;
use crate::core::identity::{AttributeKey, EntityId, EntityPrefix};

/// A single contributed value for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceValue {
    pub attribute_key: AttributeKey,
    pub raw_value: String,
    pub origin: EntityId,
}

impl SourceValue {
    pub fn new(attribute_key: AttributeKey, raw_value: impl Into<String>, origin: EntityId) -> Self {
        Self {
            attribute_key,
            raw_value: raw_value.into(),
            origin,
        }
    }
}

/// A Submission - attribute values reported by one party (supplier response,
/// questionnaire, lab certificate)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Unique identifier
    pub id: EntityId,

    /// Product this submission describes
    pub product: String,

    /// Who submitted it (supplier name, lab, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,

    /// Version of this party's submission for the product
    #[serde(default = "default_version")]
    pub version: u32,

    /// Attribute values keyed by attribute key
    #[serde(default)]
    pub values: BTreeMap<AttributeKey, String>,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Entity for Submission {
    const PREFIX: EntityPrefix = EntityPrefix::Sub;

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

impl Submission {
    /// Create an empty submission for a product
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Sub),
            product: product.into(),
            submitted_by: None,
            version: 1,
            values: BTreeMap::new(),
            created: Utc::now(),
        }
    }

    /// Builder-style value setter
    pub fn with_value(mut self, key: AttributeKey, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Flatten into source values tagged with this submission's id
    pub fn source_values(&self) -> impl Iterator<Item = SourceValue> + '_ {
        self.values
            .iter()
            .map(|(k, v)| SourceValue::new(k.clone(), v.clone(), self.id))
    }

    /// Create the next version of this submission, keeping identity of the party
    pub fn next_version(&self) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Sub),
            product: self.product.clone(),
            submitted_by: self.submitted_by.clone(),
            version: self.version + 1,
            values: self.values.clone(),
            created: Utc::now(),
        }
    }
}

/// Collect every source value for `key` across a set of submissions,
/// in submission order
pub fn collect_sources(submissions: &[Submission], key: &AttributeKey) -> Vec<SourceValue> {
    submissions
        .iter()
        .filter_map(|s| {
            s.values
                .get(key)
                .map(|v| SourceValue::new(key.clone(), v.clone(), s.id))
        })
        .collect()
}

/// Flat key→value map from the authoritative system of record.
///
/// Only passthrough attributes read from it. Missing keys are simply unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceData(BTreeMap<String, String>);

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ReferenceData {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

//! Incident entity - tracked follow-up for a deviation requiring action

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{AttributeKey, EntityId, EntityPrefix};
use crate::entities::finding::{DeviationFinding, Severity};

/// Incident lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum IncidentState {
    #[default]
    Open,
    Escalated,
    Overridden,
    Resolved,
}

impl IncidentState {
    /// Overridden and resolved incidents accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, IncidentState::Overridden | IncidentState::Resolved)
    }

    /// Open and escalated incidents hold a submission in review
    pub fn is_blocking(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for IncidentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentState::Open => write!(f, "open"),
            IncidentState::Escalated => write!(f, "escalated"),
            IncidentState::Overridden => write!(f, "overridden"),
            IncidentState::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for IncidentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(IncidentState::Open),
            "escalated" => Ok(IncidentState::Escalated),
            "overridden" => Ok(IncidentState::Overridden),
            "resolved" => Ok(IncidentState::Resolved),
            _ => Err(format!(
                "Invalid incident state: {}. Use open, escalated, overridden, or resolved",
                s
            )),
        }
    }
}

/// An Incident - opened from exactly one deviation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier
    pub id: EntityId,

    /// Product the submission belongs to
    pub product: String,

    /// Submission the deviation was found in
    pub submission: EntityId,

    pub attribute_key: AttributeKey,

    /// Expected value at the time of the finding
    pub expected: String,

    /// Submitted value at the time of the finding
    pub actual: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_percent: Option<f64>,

    pub severity: Severity,

    #[serde(default)]
    pub state: IncidentState,

    /// Justification or resolution notes; always set once the incident leaves open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// When escalation notification was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,

    /// When the incident was overridden or resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Entity for Incident {
    const PREFIX: EntityPrefix = EntityPrefix::Inc;

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

impl Incident {
    /// Open a new incident from a finding
    pub fn open(product: impl Into<String>, finding: &DeviationFinding, at: DateTime<Utc>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Inc),
            product: product.into(),
            submission: finding.submission,
            attribute_key: finding.attribute_key.clone(),
            expected: finding.expected.clone(),
            actual: finding.actual.clone(),
            deviation_percent: finding.deviation_percent,
            severity: finding.severity,
            state: IncidentState::Open,
            notes: None,
            notified_at: None,
            resolved_at: None,
            created: at,
        }
    }

    /// Whether this incident covers the given submission/attribute pair
    pub fn covers(&self, submission: &EntityId, key: &AttributeKey) -> bool {
        &self.submission == submission && &self.attribute_key == key
    }
}

/// Emitted on every incident transition for the caller to route to
/// notification collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub incident_id: EntityId,
    /// `None` when the incident was just opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<IncidentState>,
    pub to: IncidentState,
    pub at: DateTime<Utc>,
}

//! Deviation findings - results of comparing submitted values

use serde::{Deserialize, Serialize};

use crate::core::identity::{AttributeKey, EntityId};

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!(
                "Invalid severity: {}. Use info, warning, or critical",
                s
            )),
        }
    }
}

/// What a finding was compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Submission vs. current baseline
    Baseline,
    /// Submission vs. the submitter's previous version (informational)
    VersionComparison,
    /// A numeric attribute carried a value that does not parse
    InputError,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::Baseline => write!(f, "baseline"),
            FindingKind::VersionComparison => write!(f, "version"),
            FindingKind::InputError => write!(f, "input-error"),
        }
    }
}

/// One attribute's deviation from its expected value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationFinding {
    /// Submission the finding was computed for
    pub submission: EntityId,

    pub attribute_key: AttributeKey,

    /// Baseline (or previous version) value
    pub expected: String,

    /// Submitted value
    pub actual: String,

    /// Relative numeric deviation in percent; absent for non-numeric comparisons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_percent: Option<f64>,

    pub severity: Severity,

    pub kind: FindingKind,

    /// Critical findings on this attribute should open an incident
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_action: bool,
}

impl DeviationFinding {
    /// Whether the finding should auto-open an incident
    pub fn opens_incident(&self) -> bool {
        self.kind != FindingKind::VersionComparison
            && self.severity == Severity::Critical
            && self.requires_action
    }
}

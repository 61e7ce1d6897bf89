//! Composition records - chemical composition line items for a product

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// One component line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionLine {
    /// Chemical identifier (CAS number or similar)
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub chemical_id: Option<String>,

    /// Human-readable component name
    pub name: String,

    /// Share of the product in percent
    pub percentage: f64,
}

impl CompositionLine {
    pub fn new(chemical_id: Option<&str>, name: impl Into<String>, percentage: f64) -> Self {
        Self {
            chemical_id: normalize_identifier(chemical_id),
            name: name.into(),
            percentage,
        }
    }

    /// Trimmed identifier; blank identifiers count as absent
    pub fn identifier(&self) -> Option<&str> {
        self.chemical_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Display label: identifier when present, otherwise name
    pub fn label(&self) -> &str {
        self.identifier().unwrap_or(&self.name)
    }

    /// Whether both lines carry the same non-blank identifier
    pub fn same_identifier(&self, other: &CompositionLine) -> bool {
        match (self.identifier(), other.identifier()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// Whether two lines describe the same component.
    ///
    /// Identifiers decide when both lines carry one; otherwise names are
    /// compared case-insensitively.
    pub fn matches(&self, other: &CompositionLine) -> bool {
        match (self.identifier(), other.identifier()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => self.name.trim().to_lowercase() == other.name.trim().to_lowercase(),
        }
    }
}

fn normalize_identifier(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_identifier(raw.as_deref()))
}

/// How a merged record was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Arithmetic mean across records
    EqualWeight,
    /// Weighted mean; one weight per input record, summing to 1.0
    Weighted { weights: Vec<f64> },
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::EqualWeight => write!(f, "equal-weight"),
            MergeStrategy::Weighted { weights } => {
                let ws: Vec<String> = weights.iter().map(|w| format!("{:.2}", w)).collect();
                write!(f, "weighted({})", ws.join(", "))
            }
        }
    }
}

/// Audit trail for a merged record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeProvenance {
    /// Records that were merged, in input order
    pub sources: Vec<EntityId>,
    pub strategy: MergeStrategy,
    pub merged_at: DateTime<Utc>,
}

/// A Composition Record - ordered component lines for one product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRecord {
    /// Unique identifier
    pub id: EntityId,

    /// Product the composition describes
    pub product: String,

    /// Where this record came from (supplier estimate, lab report, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Extraction confidence (0-100) when the record came from a document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Component lines, in document order
    #[serde(default)]
    pub lines: Vec<CompositionLine>,

    /// Set on records produced by a merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<MergeProvenance>,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Entity for CompositionRecord {
    const PREFIX: EntityPrefix = EntityPrefix::Cmp;

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

impl CompositionRecord {
    pub fn new(product: impl Into<String>, lines: Vec<CompositionLine>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Cmp),
            product: product.into(),
            label: None,
            confidence: None,
            lines,
            provenance: None,
            created: Utc::now(),
        }
    }

    /// Sum of line percentages
    pub fn total_percentage(&self) -> f64 {
        self.lines.iter().map(|l| l.percentage).sum()
    }

    /// How far the total is from 100 (signed)
    pub fn sum_deviation(&self) -> f64 {
        self.total_percentage() - 100.0
    }

    /// Lines without a chemical identifier
    pub fn unidentified_lines(&self) -> impl Iterator<Item = &CompositionLine> {
        self.lines.iter().filter(|l| l.identifier().is_none())
    }
}

/// One line as delivered by the document extraction collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLine {
    #[serde(default)]
    pub chemical_identifier: Option<String>,
    pub name: String,
    pub percentage: f64,
}

/// A batch of extracted lines for one document, with the extractor's confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionBatch {
    pub lines: Vec<ExtractedLine>,
    /// 0-100
    pub confidence: f64,
}

impl ExtractionBatch {
    /// Convert into a composition record for a product.
    ///
    /// Low-confidence batches are accepted as-is; the reconciler downgrades
    /// their match scores instead.
    pub fn into_record(self, product: impl Into<String>) -> CompositionRecord {
        let lines = self
            .lines
            .into_iter()
            .map(|l| CompositionLine::new(l.chemical_identifier.as_deref(), l.name, l.percentage))
            .collect();
        let mut record = CompositionRecord::new(product, lines);
        record.confidence = Some(self.confidence.clamp(0.0, 100.0));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_matching_prefers_identifier() {
        let a = CompositionLine::new(Some("64-17-5"), "Ethanol", 10.0);
        let b = CompositionLine::new(Some("64-17-5"), "Ethyl alcohol", 12.0);
        let c = CompositionLine::new(Some("67-56-1"), "Ethanol", 12.0);
        assert!(a.matches(&b));
        assert!(!a.matches(&c), "differing identifiers never match on name");
    }

    #[test]
    fn test_blank_identifier_from_yaml_is_absent() {
        let yaml = "chemical_id: \"  \"\nname: Water\npercentage: 40.0\n";
        let loaded: CompositionLine = serde_yml::from_str(yaml).unwrap();
        assert_eq!(loaded.chemical_id, None);

        let raw = CompositionLine {
            chemical_id: Some(String::new()),
            name: "Glycerol".into(),
            percentage: 5.0,
        };
        let other = CompositionLine {
            chemical_id: Some(String::new()),
            name: "Ethanol".into(),
            percentage: 5.0,
        };
        assert_eq!(raw.identifier(), None);
        assert_eq!(raw.label(), "Glycerol");
        assert!(!raw.same_identifier(&other));
        assert!(!raw.matches(&other));
    }

    #[test]
    fn test_line_matching_falls_back_to_name() {
        let a = CompositionLine::new(None, "Water", 80.0);
        let b = CompositionLine::new(Some("7732-18-5"), "WATER", 75.0);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn test_blank_identifier_is_absent() {
        let line = CompositionLine::new(Some("  "), "Fragrance", 1.0);
        assert_eq!(line.chemical_id, None);
        assert_eq!(line.label(), "Fragrance");
    }

    #[test]
    fn test_totals() {
        let rec = CompositionRecord::new(
            "P",
            vec![
                CompositionLine::new(Some("1"), "A", 60.0),
                CompositionLine::new(None, "B", 39.5),
            ],
        );
        assert!((rec.total_percentage() - 99.5).abs() < 1e-9);
        assert!((rec.sum_deviation() + 0.5).abs() < 1e-9);
        assert_eq!(rec.unidentified_lines().count(), 1);
        assert!(rec.id.to_string().starts_with("CMP-"));
    }

    #[test]
    fn test_extraction_batch_boundary_shape() {
        let json = r#"{
            "lines": [
                {"chemicalIdentifier": "100-1", "name": "Alpha", "percentage": 90.0},
                {"chemicalIdentifier": null, "name": "Beta", "percentage": 10.0}
            ],
            "confidence": 42.0
        }"#;
        let batch: ExtractionBatch = serde_json::from_str(json).unwrap();
        let record = batch.into_record("P-1");
        assert_eq!(record.lines.len(), 2);
        assert_eq!(record.confidence, Some(42.0));
        assert_eq!(record.lines[1].chemical_id, None);
    }
}

//! Deviation validator - compares a submission against the baseline
//!
//! Two independent passes:
//! 1. submission vs. baseline, scored against the severity thresholds;
//! 2. optionally, submission vs. the submitter's previous version, which is
//!    informational only and never opens incidents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::field_logic::{normalize, NormalizedValue};
use crate::core::identity::{AttributeKey, EntityId};
use crate::core::policy;
use crate::entities::baseline::Baseline;
use crate::entities::finding::{DeviationFinding, FindingKind, Severity};
use crate::entities::rule::{RuleSet, ValueKind};
use crate::entities::submission::Submission;

/// Precondition errors for a validation run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Submission {submission} is for product '{found}' but the {against} is for '{expected}'")]
    ProductMismatch {
        submission: EntityId,
        against: &'static str,
        expected: String,
        found: String,
    },

    #[error("Previous version {previous} is the submission being validated")]
    SelfComparison { previous: EntityId },
}

/// Relative deviation in percent.
///
/// Uses the magnitude of `expected` as the base so negative expectations
/// still give a non-negative deviation. `expected == 0` gives 100 unless
/// `actual` is also 0.
pub fn deviation_percent(expected: f64, actual: f64) -> f64 {
    if expected == 0.0 {
        if actual == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (actual - expected).abs() / expected.abs() * 100.0
    }
}

/// Per-severity counts for a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
    pub input_errors: usize,
    pub version_changes: usize,
}

impl FindingSummary {
    pub fn from_findings(findings: &[DeviationFinding]) -> Self {
        let mut summary = Self::default();
        for f in findings {
            match f.kind {
                FindingKind::VersionComparison => summary.version_changes += 1,
                FindingKind::InputError => summary.input_errors += 1,
                FindingKind::Baseline => {}
            }
            if f.kind != FindingKind::VersionComparison {
                match f.severity {
                    Severity::Info => summary.info += 1,
                    Severity::Warning => summary.warning += 1,
                    Severity::Critical => summary.critical += 1,
                }
            }
        }
        summary
    }

    pub fn highest(&self) -> Option<Severity> {
        if self.critical > 0 {
            Some(Severity::Critical)
        } else if self.warning > 0 {
            Some(Severity::Warning)
        } else if self.info > 0 {
            Some(Severity::Info)
        } else {
            None
        }
    }
}

/// Compares submissions with baselines using the attribute rules for
/// normalization and criticality
pub struct DeviationValidator<'a> {
    rules: &'a RuleSet,
    config: &'a EngineConfig,
}

impl<'a> DeviationValidator<'a> {
    pub fn new(rules: &'a RuleSet, config: &'a EngineConfig) -> Self {
        Self { rules, config }
    }

    /// Validate a submission against a baseline and, optionally, its
    /// previous version
    pub fn validate(
        &self,
        submission: &Submission,
        baseline: &Baseline,
        previous: Option<&Submission>,
    ) -> Result<Vec<DeviationFinding>, ValidationError> {
        if submission.product != baseline.product {
            return Err(ValidationError::ProductMismatch {
                submission: submission.id,
                against: "baseline",
                expected: baseline.product.clone(),
                found: submission.product.clone(),
            });
        }

        let mut findings = Vec::new();

        for (key, actual) in &submission.values {
            let Some(expected) = baseline.expected(key.as_str()) else {
                continue;
            };
            if let Some(f) = self.compare(submission.id, key, &expected, actual, false) {
                findings.push(f);
            }
        }

        if let Some(prev) = previous {
            if prev.id == submission.id {
                return Err(ValidationError::SelfComparison { previous: prev.id });
            }
            if prev.product != submission.product {
                return Err(ValidationError::ProductMismatch {
                    submission: submission.id,
                    against: "previous version",
                    expected: prev.product.clone(),
                    found: submission.product.clone(),
                });
            }
            for (key, actual) in &submission.values {
                let Some(expected) = prev.get(key.as_str()) else {
                    continue;
                };
                if let Some(f) = self.compare(submission.id, key, expected, actual, true) {
                    findings.push(f);
                }
            }
        }

        let summary = FindingSummary::from_findings(&findings);
        tracing::info!(
            submission = %submission.id,
            baseline_version = baseline.version,
            info = summary.info,
            warning = summary.warning,
            critical = summary.critical,
            input_errors = summary.input_errors,
            version_changes = summary.version_changes,
            "submission validated"
        );
        Ok(findings)
    }

    fn compare(
        &self,
        submission: EntityId,
        key: &AttributeKey,
        expected_raw: &str,
        actual_raw: &str,
        version_pass: bool,
    ) -> Option<DeviationFinding> {
        let rule = self.rules.get(key.as_str());
        let kind = rule.map(|r| r.value_kind).unwrap_or(ValueKind::Text);
        let critical = rule.is_some_and(|r| r.critical);
        let requires_action = !version_pass && rule.is_some_and(|r| r.requires_action);

        let expected = normalize(kind, expected_raw);
        let actual = normalize(kind, actual_raw);

        let numeric = match (&expected, &actual) {
            (NormalizedValue::Numeric(e), NormalizedValue::Numeric(a)) => Some((*e, *a)),
            (NormalizedValue::Text(e), NormalizedValue::Text(a)) if kind == ValueKind::Text => {
                policy::parse_numeric(e).zip(policy::parse_numeric(a))
            }
            _ => None,
        };
        let malformed = matches!(expected, NormalizedValue::Malformed(_))
            || matches!(actual, NormalizedValue::Malformed(_));

        let (severity, deviation, finding_kind) = if let Some((e, a)) = numeric {
            let dev = deviation_percent(e, a);
            if dev == 0.0 {
                return None;
            }
            let severity = if version_pass {
                self.config.version_comparison_severity
            } else {
                self.config.severity.classify(dev)
            };
            (severity, Some(dev), Self::kind_for(version_pass))
        } else if malformed && !version_pass {
            tracing::warn!(
                %submission,
                attribute = %key,
                expected = expected_raw,
                actual = actual_raw,
                "non-numeric value on numeric attribute; compared as text"
            );
            (Severity::Warning, None, FindingKind::InputError)
        } else {
            if expected.as_text() == actual.as_text() {
                return None;
            }
            let severity = if version_pass {
                self.config.version_comparison_severity
            } else if critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            (severity, None, Self::kind_for(version_pass))
        };

        Some(DeviationFinding {
            submission,
            attribute_key: key.clone(),
            expected: expected_raw.trim().to_string(),
            actual: actual_raw.trim().to_string(),
            deviation_percent: deviation,
            severity,
            kind: finding_kind,
            requires_action,
        })
    }

    fn kind_for(version_pass: bool) -> FindingKind {
        if version_pass {
            FindingKind::VersionComparison
        } else {
            FindingKind::Baseline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{FieldValue, LogicalValue};
    use crate::entities::baseline::BaselineField;
    use crate::entities::rule::PolicyKind;

    const RULES: &str = r#"
rules:
  - key: kosher_certified
    policy: worst_case
    hierarchy: negative-is-worst
    critical: true
    requires_action: true
  - key: vegan
    policy: worst_case
    hierarchy: negative-is-worst
  - key: purity_percentage
    policy: manual
    value_type: numeric
    critical: true
    requires_action: true
  - key: origin_country
    policy: concatenate
    source: origin_country
"#;

    fn key(s: &str) -> AttributeKey {
        AttributeKey::new(s).unwrap()
    }

    fn baseline(values: &[(&str, FieldValue)]) -> Baseline {
        let mut b = Baseline::new("P-1", None, 1);
        for (k, v) in values {
            b.fields.insert(
                key(k),
                BaselineField {
                    value: v.clone(),
                    policy: PolicyKind::Manual,
                    sources: vec![],
                    editable: true,
                    needs_manual_entry: false,
                },
            );
        }
        b
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn run(b: &Baseline, sub: &Submission) -> Vec<DeviationFinding> {
        let rules = RuleSet::from_yaml(RULES, "rules.yaml").unwrap();
        let config = EngineConfig::default();
        DeviationValidator::new(&rules, &config)
            .validate(sub, b, None)
            .unwrap()
    }

    #[test]
    fn test_deviation_percent() {
        assert!((deviation_percent(99.5, 95.2) - 4.3216).abs() < 0.001);
        assert_eq!(deviation_percent(0.0, 0.0), 0.0);
        assert_eq!(deviation_percent(0.0, 3.0), 100.0);
        assert!((deviation_percent(-10.0, -11.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_purity_scenario_is_info() {
        let b = baseline(&[("purity_percentage", text("99.5"))]);
        let sub = Submission::new("P-1").with_value(key("purity_percentage"), "95.2");
        let findings = run(&b, &sub);
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.severity, Severity::Info);
        assert!((f.deviation_percent.unwrap() - 4.32).abs() < 0.01);
        assert_eq!(f.kind, FindingKind::Baseline);
    }

    #[test]
    fn test_threshold_boundaries() {
        let b = baseline(&[("purity_percentage", text("100"))]);
        for (actual, expected) in [
            ("95.01", Severity::Info),
            ("95", Severity::Warning),
            ("90.01", Severity::Warning),
            ("90", Severity::Critical),
            ("110", Severity::Critical),
        ] {
            let sub = Submission::new("P-1").with_value(key("purity_percentage"), actual);
            let findings = run(&b, &sub);
            assert_eq!(findings[0].severity, expected, "actual = {actual}");
        }
    }

    #[test]
    fn test_equal_values_produce_no_finding() {
        let b = baseline(&[
            ("purity_percentage", text("99.5")),
            ("kosher_certified", FieldValue::Logical(LogicalValue::Affirmative)),
            ("origin_country", text("Germany")),
        ]);
        let sub = Submission::new("P-1")
            .with_value(key("purity_percentage"), "99.50")
            .with_value(key("kosher_certified"), "yes")
            .with_value(key("origin_country"), " GERMANY ");
        assert!(run(&b, &sub).is_empty());
    }

    #[test]
    fn test_logical_mismatch_on_critical_attribute() {
        let b = baseline(&[
            ("kosher_certified", FieldValue::Logical(LogicalValue::Affirmative)),
            ("vegan", FieldValue::Logical(LogicalValue::Affirmative)),
        ]);
        let sub = Submission::new("P-1")
            .with_value(key("kosher_certified"), "NEGATIVE")
            .with_value(key("vegan"), "no");
        let findings = run(&b, &sub);
        assert_eq!(findings.len(), 2);

        let kosher = findings
            .iter()
            .find(|f| f.attribute_key.as_str() == "kosher_certified")
            .unwrap();
        assert_eq!(kosher.severity, Severity::Critical);
        assert!(kosher.opens_incident());

        let vegan = findings
            .iter()
            .find(|f| f.attribute_key.as_str() == "vegan")
            .unwrap();
        assert_eq!(vegan.severity, Severity::Warning);
        assert!(!vegan.opens_incident());
    }

    #[test]
    fn test_malformed_numeric_degrades_to_warning() {
        let b = baseline(&[
            ("purity_percentage", text("99.5")),
            ("origin_country", text("Germany")),
        ]);
        let sub = Submission::new("P-1")
            .with_value(key("purity_percentage"), "ninety-nine")
            .with_value(key("origin_country"), "France");
        let findings = run(&b, &sub);
        assert_eq!(findings.len(), 2, "one bad value must not hide the others");

        let bad = findings
            .iter()
            .find(|f| f.attribute_key.as_str() == "purity_percentage")
            .unwrap();
        assert_eq!(bad.kind, FindingKind::InputError);
        assert_eq!(bad.severity, Severity::Warning);
        assert_eq!(bad.deviation_percent, None);
        assert!(!bad.opens_incident());
    }

    #[test]
    fn test_unset_baseline_fields_are_skipped() {
        let b = baseline(&[
            ("purity_percentage", FieldValue::Unset),
            ("origin_country", FieldValue::Blocked),
        ]);
        let sub = Submission::new("P-1")
            .with_value(key("purity_percentage"), "50")
            .with_value(key("origin_country"), "France");
        assert!(run(&b, &sub).is_empty());
    }

    #[test]
    fn test_version_comparison_is_informational() {
        let rules = RuleSet::from_yaml(RULES, "rules.yaml").unwrap();
        let config = EngineConfig::default();
        let b = baseline(&[("kosher_certified", FieldValue::Logical(LogicalValue::Affirmative))]);

        let previous = Submission::new("P-1")
            .with_value(key("kosher_certified"), "yes")
            .with_value(key("purity_percentage"), "99.5");
        let current = previous
            .next_version()
            .with_value(key("kosher_certified"), "no")
            .with_value(key("purity_percentage"), "80");

        let findings = DeviationValidator::new(&rules, &config)
            .validate(&current, &b, Some(&previous))
            .unwrap();

        let version: Vec<_> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::VersionComparison)
            .collect();
        assert_eq!(version.len(), 2);
        assert!(version.iter().all(|f| f.severity == Severity::Info));
        assert!(version.iter().all(|f| !f.opens_incident()));

        let against_baseline: Vec<_> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::Baseline)
            .collect();
        assert_eq!(against_baseline.len(), 1);
        assert_eq!(against_baseline[0].severity, Severity::Critical);
    }

    #[test]
    fn test_product_mismatch() {
        let rules = RuleSet::default();
        let config = EngineConfig::default();
        let b = baseline(&[]);
        let sub = Submission::new("P-9");
        assert!(matches!(
            DeviationValidator::new(&rules, &config).validate(&sub, &b, None),
            Err(ValidationError::ProductMismatch { .. })
        ));
    }

    #[test]
    fn test_summary_counts() {
        let b = baseline(&[
            ("purity_percentage", text("100")),
            ("kosher_certified", FieldValue::Logical(LogicalValue::Affirmative)),
            ("origin_country", text("DE")),
        ]);
        let sub = Submission::new("P-1")
            .with_value(key("purity_percentage"), "98")
            .with_value(key("kosher_certified"), "no")
            .with_value(key("origin_country"), "FR");
        let summary = FindingSummary::from_findings(&run(&b, &sub));
        assert_eq!(summary.info, 1);
        assert_eq!(summary.warning, 1);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.highest(), Some(Severity::Critical));
        assert_eq!(FindingSummary::default().highest(), None);
    }
}

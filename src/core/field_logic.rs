//! Field logic engine - derives baseline attributes from submissions
//!
//! Each attribute rule names one resolution policy. The engine gathers the
//! source values that policy reads, applies it, and records which
//! submissions contributed. Rule consistency is checked when the rule set is
//! loaded, so resolution itself has no configuration failure modes.

use thiserror::Error;

use crate::core::identity::{AttributeKey, EntityId};
use crate::core::policy::{self, FieldValue, LogicalValue};
use crate::entities::baseline::{Baseline, BaselineField};
use crate::entities::rule::{AttributeRule, ResolutionPolicy, RuleSet, ValueKind};
use crate::entities::submission::{collect_sources, ReferenceData, SourceValue, Submission};

/// Errors from resolving fields
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Rule '{rule}' reads attribute '{expected}' but was given a value for '{found}' (from {origin})")]
    ForeignSource {
        rule: AttributeKey,
        expected: AttributeKey,
        found: AttributeKey,
        origin: EntityId,
    },

    #[error("Submission {submission} is for product '{found}', not '{expected}'")]
    ProductMismatch {
        submission: EntityId,
        expected: String,
        found: String,
    },
}

/// A value normalized for comparison, per the attribute's value kind
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Numeric(f64),
    Logical(LogicalValue),
    Text(String),
    /// A numeric attribute whose value does not parse; holds the normalized text
    Malformed(String),
}

impl NormalizedValue {
    /// Text form used for non-numeric equality
    pub fn as_text(&self) -> String {
        match self {
            NormalizedValue::Numeric(v) => v.to_string(),
            NormalizedValue::Logical(v) => v.to_string(),
            NormalizedValue::Text(s) | NormalizedValue::Malformed(s) => s.clone(),
        }
    }
}

/// Normalize a raw value the same way resolution does for this value kind
pub fn normalize(kind: ValueKind, raw: &str) -> NormalizedValue {
    match kind {
        ValueKind::Numeric => match policy::parse_numeric(raw) {
            Some(v) => NormalizedValue::Numeric(v),
            None => NormalizedValue::Malformed(policy::normalize_text(raw)),
        },
        ValueKind::Logical => match LogicalValue::from_token(raw) {
            Some(v) => NormalizedValue::Logical(v),
            None => NormalizedValue::Text(policy::normalize_text(raw)),
        },
        ValueKind::Text => NormalizedValue::Text(policy::normalize_text(raw)),
    }
}

/// Everything needed to (re)calculate one product's baseline
#[derive(Debug, Clone)]
pub struct ProductInputs {
    pub product: String,
    pub variant: Option<String>,
    pub submissions: Vec<Submission>,
    pub reference: ReferenceData,
}

impl ProductInputs {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            variant: None,
            submissions: Vec::new(),
            reference: ReferenceData::default(),
        }
    }
}

/// Applies attribute rules to source values
#[derive(Debug, Clone)]
pub struct FieldLogicEngine {
    rules: RuleSet,
}

impl FieldLogicEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Resolve one attribute from its source values and reference data
    pub fn resolve(
        &self,
        rule: &AttributeRule,
        sources: &[SourceValue],
        reference: &ReferenceData,
    ) -> Result<BaselineField, ResolveError> {
        let field = match &rule.policy {
            ResolutionPolicy::Passthrough { source } => BaselineField {
                value: policy::passthrough(reference.get(source)),
                policy: rule.policy.kind(),
                sources: Vec::new(),
                editable: true,
                needs_manual_entry: false,
            },
            ResolutionPolicy::Concatenate { source } => {
                check_sources(rule, source, sources)?;
                let value = policy::concatenate(sources.iter().map(|s| s.raw_value.as_str()));
                let contributors = distinct_origins(
                    sources
                        .iter()
                        .filter(|s| !policy::is_placeholder(&s.raw_value)),
                );
                BaselineField {
                    value,
                    policy: rule.policy.kind(),
                    sources: contributors,
                    editable: true,
                    needs_manual_entry: false,
                }
            }
            ResolutionPolicy::WorstCase { hierarchy } => {
                check_sources(rule, &rule.key, sources)?;
                let worst =
                    policy::worst_case(sources.iter().map(|s| s.raw_value.as_str()), *hierarchy);
                let contributors = distinct_origins(
                    sources
                        .iter()
                        .filter(|s| LogicalValue::from_token(&s.raw_value) == Some(worst)),
                );
                BaselineField {
                    value: FieldValue::Logical(worst),
                    policy: rule.policy.kind(),
                    sources: contributors,
                    editable: true,
                    needs_manual_entry: false,
                }
            }
            ResolutionPolicy::Manual => BaselineField {
                value: policy::manual(),
                policy: rule.policy.kind(),
                sources: Vec::new(),
                editable: true,
                needs_manual_entry: true,
            },
            ResolutionPolicy::Blocked => BaselineField {
                value: policy::blocked(),
                policy: rule.policy.kind(),
                sources: Vec::new(),
                editable: false,
                needs_manual_entry: false,
            },
        };

        tracing::debug!(
            attribute = %rule.key,
            policy = %rule.policy.kind(),
            value = %field.value,
            sources = field.sources.len(),
            "resolved field"
        );
        Ok(field)
    }

    /// Resolve every in-scope rule into a new baseline snapshot
    pub fn resolve_baseline(
        &self,
        inputs: &ProductInputs,
        version: u32,
    ) -> Result<Baseline, ResolveError> {
        if let Some(stray) = inputs.submissions.iter().find(|s| s.product != inputs.product) {
            return Err(ResolveError::ProductMismatch {
                submission: stray.id,
                expected: inputs.product.clone(),
                found: stray.product.clone(),
            });
        }

        let mut baseline = Baseline::new(inputs.product.clone(), inputs.variant.clone(), version);

        for rule in self.rules.for_variant(inputs.variant.as_deref()) {
            let sources = match &rule.policy {
                ResolutionPolicy::Concatenate { source } => {
                    collect_sources(&inputs.submissions, source)
                }
                ResolutionPolicy::WorstCase { .. } => {
                    collect_sources(&inputs.submissions, &rule.key)
                }
                ResolutionPolicy::Passthrough { .. }
                | ResolutionPolicy::Manual
                | ResolutionPolicy::Blocked => Vec::new(),
            };
            let field = self.resolve(rule, &sources, &inputs.reference)?;
            baseline.fields.insert(rule.key.clone(), field);
        }

        tracing::info!(
            product = %baseline.product,
            version = baseline.version,
            fields = baseline.fields.len(),
            submissions = inputs.submissions.len(),
            "baseline calculated"
        );
        Ok(baseline)
    }

    /// Normalize a raw value for an attribute; attributes without a rule
    /// compare as text
    pub fn normalize(&self, key: &str, raw: &str) -> NormalizedValue {
        let kind = self
            .rules
            .get(key)
            .map(|r| r.value_kind)
            .unwrap_or(ValueKind::Text);
        normalize(kind, raw)
    }
}

fn check_sources(
    rule: &AttributeRule,
    expected: &AttributeKey,
    sources: &[SourceValue],
) -> Result<(), ResolveError> {
    match sources.iter().find(|s| &s.attribute_key != expected) {
        Some(stray) => Err(ResolveError::ForeignSource {
            rule: rule.key.clone(),
            expected: expected.clone(),
            found: stray.attribute_key.clone(),
            origin: stray.origin,
        }),
        None => Ok(()),
    }
}

fn distinct_origins<'a>(sources: impl Iterator<Item = &'a SourceValue>) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = Vec::new();
    for s in sources {
        if !ids.contains(&s.origin) {
            ids.push(s.origin);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;
    use crate::core::policy::Hierarchy;
    use crate::entities::rule::PolicyKind;

    const RULES: &str = r#"
rules:
  - key: kosher_certified
    policy: worst_case
    hierarchy: negative-is-worst
    critical: true
    requires_action: true
  - key: contains_allergens
    policy: worst_case
    hierarchy: affirmative-is-worst
  - key: manufacturer_name
    policy: concatenate
    source: manufacturer
  - key: cas_number
    policy: passthrough
    source: erp.cas
  - key: purity_percentage
    policy: manual
    value_type: numeric
  - key: export_code
    policy: blocked
    scope: [retail]
"#;

    fn engine() -> FieldLogicEngine {
        FieldLogicEngine::new(RuleSet::from_yaml(RULES, "rules.yaml").unwrap())
    }

    fn key(s: &str) -> AttributeKey {
        AttributeKey::new(s).unwrap()
    }

    fn sv(k: &str, v: &str) -> SourceValue {
        SourceValue::new(key(k), v, EntityId::new(EntityPrefix::Sub))
    }

    #[test]
    fn test_passthrough_reference_wins() {
        let engine = engine();
        let rule = engine.rules().get("cas_number").unwrap().clone();
        let mut reference = ReferenceData::new();
        reference.insert("erp.cas", "64-17-5");

        let field = engine
            .resolve(&rule, &[sv("cas_number", "999-99-9")], &reference)
            .unwrap();
        assert_eq!(field.value, FieldValue::Text("64-17-5".into()));
        assert!(field.sources.is_empty());
    }

    #[test]
    fn test_passthrough_missing_reference_is_unset() {
        let engine = engine();
        let rule = engine.rules().get("cas_number").unwrap().clone();
        let field = engine.resolve(&rule, &[], &ReferenceData::new()).unwrap();
        assert_eq!(field.value, FieldValue::Unset);
    }

    #[test]
    fn test_concatenate_tracks_contributors() {
        let engine = engine();
        let rule = engine.rules().get("manufacturer_name").unwrap().clone();
        let a = sv("manufacturer", "Acme");
        let b = sv("manufacturer", "N/A");
        let c = sv("manufacturer", "ACME ");
        let field = engine
            .resolve(&rule, &[a.clone(), b.clone(), c.clone()], &ReferenceData::new())
            .unwrap();
        assert_eq!(field.value, FieldValue::Text("Acme".into()));
        assert_eq!(field.sources, vec![a.origin, c.origin]);
    }

    #[test]
    fn test_concatenate_rejects_foreign_sources() {
        let engine = engine();
        let rule = engine.rules().get("manufacturer_name").unwrap().clone();
        let err = engine
            .resolve(&rule, &[sv("origin_country", "DE")], &ReferenceData::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::ForeignSource { .. }));
    }

    #[test]
    fn test_worst_case_contributors_are_winning_sources() {
        let engine = engine();
        let rule = engine.rules().get("kosher_certified").unwrap().clone();
        let yes = sv("kosher_certified", "yes");
        let na = sv("kosher_certified", "n/a");
        let field = engine
            .resolve(&rule, &[yes.clone(), na.clone()], &ReferenceData::new())
            .unwrap();
        assert_eq!(field.value, FieldValue::Logical(LogicalValue::NotApplicable));
        assert_eq!(field.sources, vec![na.origin]);
        assert_eq!(field.policy, PolicyKind::WorstCase);
    }

    #[test]
    fn test_manual_and_blocked_ignore_sources() {
        let engine = engine();
        let manual = engine.rules().get("purity_percentage").unwrap().clone();
        let blocked = engine.rules().get("export_code").unwrap().clone();
        let noise = [sv("purity_percentage", "99.9")];

        let m = engine.resolve(&manual, &noise, &ReferenceData::new()).unwrap();
        assert_eq!(m.value, FieldValue::Unset);
        assert!(m.needs_manual_entry);
        assert!(m.editable);

        let b = engine.resolve(&blocked, &noise, &ReferenceData::new()).unwrap();
        assert_eq!(b.value, FieldValue::Blocked);
        assert!(!b.editable);
    }

    #[test]
    fn test_resolve_baseline_respects_scope() {
        let engine = engine();
        let sub = Submission::new("P-1")
            .with_value(key("kosher_certified"), "yes")
            .with_value(key("manufacturer"), "Acme");
        let mut inputs = ProductInputs::new("P-1");
        inputs.submissions.push(sub);
        inputs.variant = Some("bulk".into());

        let baseline = engine.resolve_baseline(&inputs, 1).unwrap();
        assert_eq!(baseline.fields.len(), 5);
        assert!(baseline.field("export_code").is_none());
        assert_eq!(
            baseline.expected("kosher_certified"),
            Some("AFFIRMATIVE".into())
        );
        assert_eq!(baseline.expected("manufacturer_name"), Some("Acme".into()));

        inputs.variant = Some("retail".into());
        let retail = engine.resolve_baseline(&inputs, 2).unwrap();
        assert_eq!(retail.fields.len(), 6);
        assert_eq!(retail.version, 2);
    }

    #[test]
    fn test_resolve_baseline_rejects_other_products() {
        let engine = engine();
        let mut inputs = ProductInputs::new("P-1");
        inputs.submissions.push(Submission::new("P-2"));
        assert!(matches!(
            engine.resolve_baseline(&inputs, 1),
            Err(ResolveError::ProductMismatch { .. })
        ));
    }

    #[test]
    fn test_kosher_scenario_baseline() {
        let rule = AttributeRule::from_raw(crate::entities::rule::RawRule {
            key: "kosher_certified".into(),
            policy: PolicyKind::WorstCase,
            source: None,
            hierarchy: Some(Hierarchy::NegativeIsWorst),
            value_type: None,
            scope: vec![],
            critical: true,
            requires_action: true,
            description: None,
        })
        .unwrap();
        let engine = FieldLogicEngine::new(RuleSet::from_rules(vec![rule.clone()]).unwrap());
        let field = engine
            .resolve(
                &rule,
                &[
                    sv("kosher_certified", "AFFIRMATIVE"),
                    sv("kosher_certified", "NOT_APPLICABLE"),
                ],
                &ReferenceData::new(),
            )
            .unwrap();
        // Under negative-is-worst the middle value outranks affirmative
        assert_eq!(field.value, FieldValue::Logical(LogicalValue::NotApplicable));
    }

    #[test]
    fn test_normalize_per_kind() {
        let engine = engine();
        assert_eq!(
            engine.normalize("purity_percentage", " 99.5 "),
            NormalizedValue::Numeric(99.5)
        );
        assert_eq!(
            engine.normalize("purity_percentage", "high"),
            NormalizedValue::Malformed("HIGH".into())
        );
        assert_eq!(
            engine.normalize("kosher_certified", "y"),
            NormalizedValue::Logical(LogicalValue::Affirmative)
        );
        assert_eq!(
            engine.normalize("unknown_attr", " abc "),
            NormalizedValue::Text("ABC".into())
        );
    }
}

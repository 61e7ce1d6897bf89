//! Property tests for resolution policies, reconciliation and incidents

mod common;

use chrono::Utc;
use proptest::prelude::*;

use chemrec::core::identity::{AttributeKey, EntityId, EntityPrefix};
use chemrec::core::field_logic::FieldLogicEngine;
use chemrec::core::lifecycle::IncidentLedger;
use chemrec::core::policy::{self, FieldValue, Hierarchy, LogicalValue};
use chemrec::core::reconcile::ComponentReconciler;
use chemrec::entities::composition::{CompositionLine, CompositionRecord, MergeStrategy};
use chemrec::entities::finding::{DeviationFinding, FindingKind, Severity};
use chemrec::entities::rule::{PolicyKind, RuleSet};
use chemrec::entities::submission::{ReferenceData, SourceValue};

fn logical_token() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "yes", "YES", "y", "1", "no", "N", "0", "false", "n/a", "NA", "not applicable", "maybe",
    ])
}

fn text_token() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Germany", "germany", "France", " France ", "Italy", "NA", "", "Spain",
    ])
    .prop_map(str::to_string)
}

/// Records over a fixed pool of identified components
fn composition() -> impl Strategy<Value = CompositionRecord> {
    prop::collection::vec((0usize..6, 1.0f64..100.0), 1..6).prop_map(|picks| {
        let mut lines: Vec<CompositionLine> = Vec::new();
        for (component, pct) in picks {
            let id = format!("CAS-{}", component);
            if lines.iter().all(|l| l.chemical_id.as_deref() != Some(id.as_str())) {
                lines.push(CompositionLine::new(Some(&id), format!("C{}", component), pct));
            }
        }
        CompositionRecord::new("P-100", lines)
    })
}

proptest! {
    #[test]
    fn manual_and_blocked_ignore_inputs(
        inputs in prop::collection::vec(text_token(), 0..8),
        reference in text_token(),
    ) {
        let rules = RuleSet::from_yaml(
            "rules:\n  - key: notes\n    policy: manual\n  - key: cost\n    policy: blocked\n",
            "rules.yaml",
        )
        .unwrap();
        let engine = FieldLogicEngine::new(rules.clone());
        let mut reference_data = ReferenceData::new();
        reference_data.insert("notes", reference.as_str());
        reference_data.insert("cost", reference.as_str());

        for rule in rules.iter() {
            let sources: Vec<SourceValue> = inputs
                .iter()
                .map(|v| SourceValue::new(rule.key.clone(), v.as_str(), EntityId::new(EntityPrefix::Sub)))
                .collect();
            let field = engine.resolve(rule, &sources, &reference_data).unwrap();
            prop_assert!(field.sources.is_empty());
            match rule.policy.kind() {
                PolicyKind::Manual => {
                    prop_assert_eq!(&field.value, &FieldValue::Unset);
                    prop_assert!(field.needs_manual_entry);
                }
                _ => {
                    prop_assert_eq!(&field.value, &FieldValue::Blocked);
                    prop_assert!(!field.editable);
                }
            }
        }
    }

    #[test]
    fn concatenate_set_is_order_independent(values in prop::collection::vec(text_token(), 0..8)) {
        let mut reversed = values.clone();
        reversed.reverse();

        let as_set = |v: FieldValue| -> Vec<String> {
            match v {
                FieldValue::Text(s) => {
                    let mut parts: Vec<String> = s
                        .split(policy::CONCAT_SEPARATOR)
                        .map(policy::normalize_text)
                        .collect();
                    parts.sort();
                    parts
                }
                _ => Vec::new(),
            }
        };
        let forward = as_set(policy::concatenate(values.iter().map(String::as_str)));
        let backward = as_set(policy::concatenate(reversed.iter().map(String::as_str)));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn worst_value_dominates(tokens in prop::collection::vec(logical_token(), 0..8)) {
        let with_affirmative: Vec<&str> = tokens.iter().copied().chain(["YES"]).collect();
        prop_assert_eq!(
            policy::worst_case(with_affirmative, Hierarchy::AffirmativeIsWorst),
            LogicalValue::Affirmative
        );
        let with_negative: Vec<&str> = tokens.iter().copied().chain(["no"]).collect();
        prop_assert_eq!(
            policy::worst_case(with_negative, Hierarchy::NegativeIsWorst),
            LogicalValue::Negative
        );
    }

    #[test]
    fn diff_is_complementary(a in composition(), b in composition()) {
        let r = ComponentReconciler::default();
        let ab = r.diff(&a, &b).unwrap();
        let ba = r.diff(&b, &a).unwrap();

        let names = |changes: &[chemrec::core::reconcile::ComponentChange]| {
            let mut v: Vec<String> = changes.iter().map(|c| c.label().to_string()).collect();
            v.sort();
            v
        };
        prop_assert_eq!(names(&ab.added), names(&ba.removed));
        prop_assert_eq!(names(&ab.removed), names(&ba.added));
        prop_assert_eq!(names(&ab.changed), names(&ba.changed));
        prop_assert!((ab.match_score - ba.match_score).abs() < 1e-9);
    }

    #[test]
    fn merge_sums_to_hundred(a in composition(), b in composition(), w in 0.05f64..0.95) {
        let merged = ComponentReconciler::default()
            .merge(&a, &b, MergeStrategy::Weighted { weights: vec![w, 1.0 - w] })
            .unwrap();
        prop_assert!((merged.total_percentage() - 100.0).abs() <= 0.01);
    }

    #[test]
    fn score_never_increases_with_more_change(base in composition(), extra in 0.1f64..50.0) {
        let r = ComponentReconciler::default();
        let mut one = base.clone();
        one.lines[0].percentage += extra;
        let mut two = one.clone();
        two.lines[0].percentage += extra;

        let s1 = r.diff(&base, &one).unwrap().match_score;
        let s2 = r.diff(&base, &two).unwrap().match_score;
        prop_assert!(s2 <= s1);
    }

    #[test]
    fn auto_open_never_duplicates(repeats in 1usize..5, runs in 1usize..4) {
        let finding = DeviationFinding {
            submission: EntityId::new(EntityPrefix::Sub),
            attribute_key: AttributeKey::new("kosher_certified").unwrap(),
            expected: "AFFIRMATIVE".into(),
            actual: "NEGATIVE".into(),
            deviation_percent: None,
            severity: Severity::Critical,
            kind: FindingKind::Baseline,
            requires_action: true,
        };
        let findings = vec![finding; repeats];
        let mut ledger = IncidentLedger::new();
        for _ in 0..runs {
            ledger.auto_open("P-100", &findings, Utc::now());
        }
        prop_assert_eq!(ledger.len(), 1);
    }
}

//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use chemrec::core::identity::AttributeKey;
use chemrec::entities::composition::{CompositionLine, CompositionRecord};
use chemrec::entities::submission::Submission;

/// Helper to get a chemrec command
pub fn chemrec() -> Command {
    Command::new(cargo::cargo_bin!("chemrec"))
}

pub const RULES_YAML: &str = r#"
rules:
  - key: kosher_certified
    policy: worst_case
    hierarchy: negative-is-worst
    critical: true
    requires_action: true
  - key: halal_certified
    policy: worst_case
    hierarchy: negative-is-worst
  - key: contains_allergens
    policy: worst_case
    hierarchy: affirmative-is-worst
    critical: true
  - key: origin_country
    policy: concatenate
    source: origin_country
  - key: cas_number
    policy: passthrough
    source: cas
  - key: purity_percentage
    policy: manual
    value_type: numeric
    critical: true
    requires_action: true
  - key: internal_cost
    policy: blocked
"#;

pub fn key(s: &str) -> AttributeKey {
    AttributeKey::new(s).unwrap()
}

/// Submission for product P-100 with the given values
pub fn submission(values: &[(&str, &str)]) -> Submission {
    values
        .iter()
        .fold(Submission::new("P-100"), |s, (k, v)| s.with_value(key(k), *v))
}

pub fn record(lines: &[(Option<&str>, &str, f64)]) -> CompositionRecord {
    CompositionRecord::new(
        "P-100",
        lines
            .iter()
            .map(|(id, name, pct)| CompositionLine::new(*id, *name, *pct))
            .collect(),
    )
}

/// Write a serializable value as YAML into the temp dir
pub fn write_yaml<T: Serialize>(dir: &TempDir, name: &str, value: &T) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_yml::to_string(value).unwrap()).unwrap();
    path
}

pub fn write_text(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn read_yaml<T: serde::de::DeserializeOwned + 'static>(path: &Path) -> T {
    serde_yml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

//! Shared helper functions for CLI commands

use miette::{Context, IntoDiagnostic, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::core::config::EngineConfig;
use crate::core::identity::EntityId;
use crate::entities::rule::{RuleSet, RuleSetError};
use crate::yaml::{parse_yaml_file, write_yaml_file};

/// Format an EntityId for display, truncating if too long
///
/// IDs longer than 16 characters are truncated to 13 chars with "..." suffix.
pub fn format_short_id(id: &EntityId) -> String {
    let s = id.to_string();
    if s.len() > 16 {
        format!("{}...", &s[..13])
    } else {
        s
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Load a YAML (or JSON) entity file, reporting syntax errors with source spans
pub fn load<T: DeserializeOwned + 'static>(path: &Path) -> Result<T> {
    parse_yaml_file(path).map_err(miette::Report::new)
}

pub fn save<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    write_yaml_file(path, value).map_err(miette::Report::new)
}

/// Load a rule set, listing every invalid rule on failure
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    RuleSet::load(path).map_err(|e| match e {
        RuleSetError::Yaml(y) => miette::Report::new(y),
        RuleSetError::Invalid(errors) => {
            let details: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
            miette::miette!(
                "{} invalid rule(s) in {}:\n{}",
                errors.len(),
                path.display(),
                details.join("\n")
            )
        }
    })
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    EngineConfig::load_or_default(path)
        .into_diagnostic()
        .wrap_err("loading engine configuration")
}

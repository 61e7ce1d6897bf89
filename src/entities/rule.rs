//! Attribute rules - per-field resolution configuration
//!
//! Rules are loaded from YAML and validated once. A rule set that loads is
//! guaranteed to be consistent; the field logic engine never has to fall
//! back to a default for a half-configured rule.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::core::identity::{AttributeKey, IdParseError};
use crate::core::policy::Hierarchy;
use crate::yaml::{parse_yaml, parse_yaml_file, YamlError};

/// Policy name as written in rule files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Passthrough,
    Concatenate,
    WorstCase,
    Manual,
    Blocked,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Passthrough => write!(f, "passthrough"),
            PolicyKind::Concatenate => write!(f, "concatenate"),
            PolicyKind::WorstCase => write!(f, "worst_case"),
            PolicyKind::Manual => write!(f, "manual"),
            PolicyKind::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "passthrough" => Ok(PolicyKind::Passthrough),
            "concatenate" => Ok(PolicyKind::Concatenate),
            "worst_case" => Ok(PolicyKind::WorstCase),
            "manual" => Ok(PolicyKind::Manual),
            "blocked" => Ok(PolicyKind::Blocked),
            _ => Err(format!(
                "Invalid policy: {}. Use passthrough, concatenate, worst_case, manual, or blocked",
                s
            )),
        }
    }
}

/// Validated resolution policy. Each variant carries exactly what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Copy the authoritative-system value at `source`
    Passthrough { source: String },
    /// Join distinct submission values of attribute `source`
    Concatenate { source: AttributeKey },
    /// Pick the most conservative logical value
    WorstCase { hierarchy: Hierarchy },
    Manual,
    Blocked,
}

impl ResolutionPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            ResolutionPolicy::Passthrough { .. } => PolicyKind::Passthrough,
            ResolutionPolicy::Concatenate { .. } => PolicyKind::Concatenate,
            ResolutionPolicy::WorstCase { .. } => PolicyKind::WorstCase,
            ResolutionPolicy::Manual => PolicyKind::Manual,
            ResolutionPolicy::Blocked => PolicyKind::Blocked,
        }
    }
}

/// How values of an attribute are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Numeric,
    Logical,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Text => write!(f, "text"),
            ValueKind::Numeric => write!(f, "numeric"),
            ValueKind::Logical => write!(f, "logical"),
        }
    }
}

/// A rule as written in YAML, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    /// Attribute key this rule produces
    pub key: String,

    /// Resolution policy
    pub policy: PolicyKind,

    /// Source attribute path (passthrough / concatenate only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Worst-case direction (worst_case only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Hierarchy>,

    /// Comparison type; inferred from the policy when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueKind>,

    /// Baseline variants this rule applies to (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    /// Deviations on this attribute are critical
    #[serde(default)]
    pub critical: bool,

    /// Critical deviations open an incident
    #[serde(default)]
    pub requires_action: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated attribute rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRule {
    pub key: AttributeKey,
    pub policy: ResolutionPolicy,
    pub value_kind: ValueKind,
    pub scope: Vec<String>,
    pub critical: bool,
    pub requires_action: bool,
    pub description: Option<String>,
}

impl AttributeRule {
    /// Validate a raw rule
    pub fn from_raw(raw: RawRule) -> Result<Self, RuleError> {
        let key = AttributeKey::new(raw.key.clone()).map_err(|source| RuleError::InvalidKey {
            key: raw.key.clone(),
            source,
        })?;

        let policy = match raw.policy {
            PolicyKind::Passthrough | PolicyKind::Concatenate => {
                if raw.hierarchy.is_some() {
                    return Err(RuleError::UnexpectedHierarchy {
                        key,
                        policy: raw.policy,
                    });
                }
                let source = raw
                    .source
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| RuleError::MissingSource {
                        key: key.clone(),
                        policy: raw.policy,
                    })?;
                if raw.policy == PolicyKind::Passthrough {
                    ResolutionPolicy::Passthrough {
                        source: source.to_string(),
                    }
                } else {
                    let source =
                        AttributeKey::new(source).map_err(|e| RuleError::InvalidKey {
                            key: source.to_string(),
                            source: e,
                        })?;
                    ResolutionPolicy::Concatenate { source }
                }
            }
            PolicyKind::WorstCase => {
                if raw.source.is_some() {
                    return Err(RuleError::UnexpectedSource {
                        key,
                        policy: raw.policy,
                    });
                }
                let hierarchy = raw
                    .hierarchy
                    .ok_or_else(|| RuleError::MissingHierarchy { key: key.clone() })?;
                ResolutionPolicy::WorstCase { hierarchy }
            }
            PolicyKind::Manual | PolicyKind::Blocked => {
                if raw.source.is_some() {
                    return Err(RuleError::UnexpectedSource {
                        key,
                        policy: raw.policy,
                    });
                }
                if raw.hierarchy.is_some() {
                    return Err(RuleError::UnexpectedHierarchy {
                        key,
                        policy: raw.policy,
                    });
                }
                if raw.policy == PolicyKind::Manual {
                    ResolutionPolicy::Manual
                } else {
                    ResolutionPolicy::Blocked
                }
            }
        };

        let value_kind = match (&policy, raw.value_type) {
            (ResolutionPolicy::WorstCase { .. }, None | Some(ValueKind::Logical)) => {
                ValueKind::Logical
            }
            (ResolutionPolicy::WorstCase { .. }, Some(kind)) => {
                return Err(RuleError::IncompatibleValueType {
                    key,
                    policy: PolicyKind::WorstCase,
                    value_type: kind,
                })
            }
            (ResolutionPolicy::Concatenate { .. }, Some(ValueKind::Numeric)) => {
                return Err(RuleError::IncompatibleValueType {
                    key,
                    policy: PolicyKind::Concatenate,
                    value_type: ValueKind::Numeric,
                })
            }
            (_, Some(kind)) => kind,
            (_, None) => ValueKind::Text,
        };

        Ok(Self {
            key,
            policy,
            value_kind,
            scope: raw.scope,
            critical: raw.critical,
            requires_action: raw.requires_action,
            description: raw.description,
        })
    }

    /// Whether this rule applies to a baseline variant
    pub fn applies_to(&self, variant: Option<&str>) -> bool {
        match variant {
            _ if self.scope.is_empty() => true,
            Some(v) => self.scope.iter().any(|s| s == v),
            None => false,
        }
    }

    pub fn to_raw(&self) -> RawRule {
        let (source, hierarchy) = match &self.policy {
            ResolutionPolicy::Passthrough { source } => (Some(source.clone()), None),
            ResolutionPolicy::Concatenate { source } => (Some(source.to_string()), None),
            ResolutionPolicy::WorstCase { hierarchy } => (None, Some(*hierarchy)),
            ResolutionPolicy::Manual | ResolutionPolicy::Blocked => (None, None),
        };
        RawRule {
            key: self.key.to_string(),
            policy: self.policy.kind(),
            source,
            hierarchy,
            value_type: Some(self.value_kind),
            scope: self.scope.clone(),
            critical: self.critical,
            requires_action: self.requires_action,
            description: self.description.clone(),
        }
    }
}

/// Configuration errors for a single rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Invalid attribute key '{key}': {source}")]
    InvalidKey { key: String, source: IdParseError },

    #[error("Rule '{key}': worst_case requires a hierarchy")]
    MissingHierarchy { key: AttributeKey },

    #[error("Rule '{key}': {policy} requires a source attribute")]
    MissingSource { key: AttributeKey, policy: PolicyKind },

    #[error("Rule '{key}': {policy} must not declare a source")]
    UnexpectedSource { key: AttributeKey, policy: PolicyKind },

    #[error("Rule '{key}': {policy} must not declare a hierarchy")]
    UnexpectedHierarchy { key: AttributeKey, policy: PolicyKind },

    #[error("Rule '{key}': value_type {value_type} is not valid for {policy}")]
    IncompatibleValueType {
        key: AttributeKey,
        policy: PolicyKind,
        value_type: ValueKind,
    },

    #[error("Duplicate rule for attribute '{key}'")]
    DuplicateKey { key: AttributeKey },
}

/// Errors from loading a whole rule set
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error(transparent)]
    Yaml(#[from] YamlError),

    #[error("{} invalid rule(s):\n{}", .0.len(), format_rule_errors(.0))]
    Invalid(Vec<RuleError>),
}

fn format_rule_errors(errors: &[RuleError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawRuleSet {
    #[serde(default)]
    rules: Vec<RawRule>,
}

/// A validated, keyed collection of attribute rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: BTreeMap<AttributeKey, AttributeRule>,
    order: Vec<AttributeKey>,
}

impl RuleSet {
    /// Validate raw rules, collecting every error rather than stopping at the first
    pub fn from_raw(raw: Vec<RawRule>) -> Result<Self, RuleSetError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut set = RuleSet::default();

        for raw_rule in raw {
            match AttributeRule::from_raw(raw_rule) {
                Ok(rule) => {
                    if !seen.insert(rule.key.clone()) {
                        errors.push(RuleError::DuplicateKey { key: rule.key });
                        continue;
                    }
                    set.order.push(rule.key.clone());
                    set.rules.insert(rule.key.clone(), rule);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            tracing::debug!(rules = set.len(), "rule set loaded");
            Ok(set)
        } else {
            Err(RuleSetError::Invalid(errors))
        }
    }

    pub fn from_rules(rules: Vec<AttributeRule>) -> Result<Self, RuleSetError> {
        Self::from_raw(rules.iter().map(AttributeRule::to_raw).collect())
    }

    pub fn from_yaml(content: &str, filename: &str) -> Result<Self, RuleSetError> {
        let raw: RawRuleSet = parse_yaml(content, filename)?;
        Self::from_raw(raw.rules)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, RuleSetError> {
        let raw: RawRuleSet = parse_yaml_file(path)?;
        Self::from_raw(raw.rules)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeRule> {
        self.rules.get(key)
    }

    /// Rules in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &AttributeRule> {
        self.order.iter().filter_map(|k| self.rules.get(k))
    }

    /// Rules applying to a variant, in declaration order
    pub fn for_variant<'a>(
        &'a self,
        variant: Option<&'a str>,
    ) -> impl Iterator<Item = &'a AttributeRule> + 'a {
        self.iter().filter(move |r| r.applies_to(variant))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

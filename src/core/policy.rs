//! Resolution policy library
//!
//! Pure functions that turn one-or-many raw source tokens into a single
//! baseline value. Nothing in here knows about rules, submissions or
//! provenance; the field logic engine wires these up per attribute.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when joining concatenated values
pub const CONCAT_SEPARATOR: &str = " / ";

/// Tokens that carry no information and are dropped before concatenation
const PLACEHOLDER_TOKENS: &[&str] = &["", "NA", "N/A"];

const AFFIRMATIVE_TOKENS: &[&str] = &["YES", "Y", "1", "TRUE", "AFFIRMATIVE"];
const NEGATIVE_TOKENS: &[&str] = &["NO", "N", "0", "FALSE", "NEGATIVE"];
const NOT_APPLICABLE_TOKENS: &[&str] = &[
    "NA",
    "N/A",
    "NOT APPLICABLE",
    "NOT_APPLICABLE",
    "NOT-APPLICABLE",
];

/// Three-way logical value used by worst-case attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalValue {
    Affirmative,
    Negative,
    NotApplicable,
}

impl LogicalValue {
    /// Parse a raw token using the fixed token table.
    ///
    /// Returns `None` for tokens outside the table; callers drop those.
    pub fn from_token(raw: &str) -> Option<Self> {
        let token = normalize_text(raw);
        if AFFIRMATIVE_TOKENS.contains(&token.as_str()) {
            Some(LogicalValue::Affirmative)
        } else if NEGATIVE_TOKENS.contains(&token.as_str()) {
            Some(LogicalValue::Negative)
        } else if NOT_APPLICABLE_TOKENS.contains(&token.as_str()) {
            Some(LogicalValue::NotApplicable)
        } else {
            None
        }
    }
}

impl fmt::Display for LogicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalValue::Affirmative => write!(f, "AFFIRMATIVE"),
            LogicalValue::Negative => write!(f, "NEGATIVE"),
            LogicalValue::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

/// Which end of the affirmative / not-applicable / negative order is worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hierarchy {
    AffirmativeIsWorst,
    NegativeIsWorst,
}

impl Hierarchy {
    /// Severity rank of a value under this hierarchy (higher is worse).
    /// NotApplicable always sits in the middle.
    fn rank(self, value: LogicalValue) -> u8 {
        match (self, value) {
            (_, LogicalValue::NotApplicable) => 1,
            (Hierarchy::AffirmativeIsWorst, LogicalValue::Affirmative) => 2,
            (Hierarchy::AffirmativeIsWorst, LogicalValue::Negative) => 0,
            (Hierarchy::NegativeIsWorst, LogicalValue::Negative) => 2,
            (Hierarchy::NegativeIsWorst, LogicalValue::Affirmative) => 0,
        }
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hierarchy::AffirmativeIsWorst => write!(f, "affirmative-is-worst"),
            Hierarchy::NegativeIsWorst => write!(f, "negative-is-worst"),
        }
    }
}

/// A resolved baseline value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Nothing to report; left for a later source or a human
    Unset,
    /// Explicitly empty and never populated
    Blocked,
    Text(String),
    Logical(LogicalValue),
}

impl FieldValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldValue::Unset)
    }

    /// Raw string form used when comparing against submissions
    pub fn as_raw(&self) -> Option<String> {
        match self {
            FieldValue::Unset | FieldValue::Blocked => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Logical(v) => Some(v.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unset => write!(f, "(unset)"),
            FieldValue::Blocked => write!(f, "(blocked)"),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Logical(v) => write!(f, "{}", v),
        }
    }
}

/// Trim and uppercase a token for comparison
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Whether a token is an empty/placeholder value
pub fn is_placeholder(raw: &str) -> bool {
    PLACEHOLDER_TOKENS.contains(&normalize_text(raw).as_str())
}

/// Passthrough: authoritative-system value verbatim, or unset
pub fn passthrough(reference: Option<&str>) -> FieldValue {
    match reference {
        Some(v) => FieldValue::Text(v.to_string()),
        None => FieldValue::Unset,
    }
}

/// Concatenate distinct values in first-seen order.
///
/// Duplicates are detected on the trimmed, case-folded form; the first
/// spelling seen (trimmed) is the one kept.
pub fn concatenate<'a, I>(values: I) -> FieldValue
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: Vec<String> = Vec::new();
    let mut kept: Vec<&str> = Vec::new();

    for raw in values {
        if is_placeholder(raw) {
            continue;
        }
        let key = normalize_text(raw);
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(raw.trim());
        }
    }

    if kept.is_empty() {
        FieldValue::Unset
    } else {
        FieldValue::Text(kept.join(CONCAT_SEPARATOR))
    }
}

/// Worst-case resolution over the fixed three-way order.
///
/// Unparseable tokens are ignored; with nothing parseable the result is
/// `NotApplicable`.
pub fn worst_case<'a, I>(values: I, hierarchy: Hierarchy) -> LogicalValue
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(LogicalValue::from_token)
        .max_by_key(|v| hierarchy.rank(*v))
        .unwrap_or(LogicalValue::NotApplicable)
}

/// Manual entry: never auto-populated
pub fn manual() -> FieldValue {
    FieldValue::Unset
}

/// Blocked: explicit empty value
pub fn blocked() -> FieldValue {
    FieldValue::Blocked
}

/// Parse a numeric token, tolerating surrounding whitespace and a trailing '%'
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_table() {
        for t in ["yes", " Y ", "1", "true", "TRUE"] {
            assert_eq!(LogicalValue::from_token(t), Some(LogicalValue::Affirmative));
        }
        for t in ["no", "N", "0", "False"] {
            assert_eq!(LogicalValue::from_token(t), Some(LogicalValue::Negative));
        }
        for t in ["na", "N/A", "not applicable"] {
            assert_eq!(
                LogicalValue::from_token(t),
                Some(LogicalValue::NotApplicable)
            );
        }
        assert_eq!(LogicalValue::from_token("maybe"), None);
    }

    #[test]
    fn test_concatenate_dedupes_preserving_order() {
        let v = concatenate(["Acme GmbH", " acme gmbh", "Beta Ltd", "ACME GMBH"]);
        assert_eq!(v, FieldValue::Text("Acme GmbH / Beta Ltd".to_string()));
    }

    #[test]
    fn test_concatenate_drops_placeholders() {
        let v = concatenate(["NA", "", "n/a", "Germany", "  "]);
        assert_eq!(v, FieldValue::Text("Germany".to_string()));
    }

    #[test]
    fn test_concatenate_empty_is_unset() {
        assert_eq!(concatenate(std::iter::empty()), FieldValue::Unset);
        assert_eq!(concatenate(["N/A"]), FieldValue::Unset);
    }

    #[test]
    fn test_worst_case_affirmative_is_worst() {
        let h = Hierarchy::AffirmativeIsWorst;
        assert_eq!(worst_case(["no", "yes", "na"], h), LogicalValue::Affirmative);
        assert_eq!(worst_case(["no", "na"], h), LogicalValue::NotApplicable);
        assert_eq!(worst_case(["no", "N"], h), LogicalValue::Negative);
    }

    #[test]
    fn test_worst_case_negative_is_worst() {
        let h = Hierarchy::NegativeIsWorst;
        assert_eq!(worst_case(["yes", "no", "na"], h), LogicalValue::Negative);
        assert_eq!(worst_case(["yes", "na"], h), LogicalValue::NotApplicable);
        assert_eq!(worst_case(["yes"], h), LogicalValue::Affirmative);
    }

    #[test]
    fn test_worst_case_unparseable_is_not_applicable() {
        let h = Hierarchy::AffirmativeIsWorst;
        assert_eq!(worst_case(["perhaps", "???"], h), LogicalValue::NotApplicable);
        assert_eq!(
            worst_case(std::iter::empty(), h),
            LogicalValue::NotApplicable
        );
        assert_eq!(worst_case(["perhaps", "no"], h), LogicalValue::Negative);
    }

    #[test]
    fn test_not_applicable_ranks_in_the_middle() {
        let h = Hierarchy::NegativeIsWorst;
        assert_eq!(worst_case(["yes", "n/a"], h), LogicalValue::NotApplicable);
        assert_eq!(worst_case(["n/a", "no"], h), LogicalValue::Negative);
        assert_eq!(worst_case(["yes", "yes"], h), LogicalValue::Affirmative);
    }

    #[test]
    fn test_passthrough_manual_blocked() {
        assert_eq!(passthrough(Some("EU")), FieldValue::Text("EU".to_string()));
        assert_eq!(passthrough(None), FieldValue::Unset);
        assert_eq!(manual(), FieldValue::Unset);
        assert_eq!(blocked(), FieldValue::Blocked);
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(" 99.5 "), Some(99.5));
        assert_eq!(parse_numeric("12%"), Some(12.0));
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric("NaN"), None);
    }

    #[test]
    fn test_field_value_serialization() {
        let yaml = serde_yml::to_string(&FieldValue::Logical(LogicalValue::Affirmative)).unwrap();
        assert!(yaml.contains("kind: logical"));
        assert!(yaml.contains("AFFIRMATIVE"));
    }
}

//! Identity types - ULID-based entity IDs and validated attribute keys

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Entity type prefixes used in IDs (e.g., "SUB-01KCWY20F01B21V0G4E835NW3J")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityPrefix {
    /// Submission from one party (supplier response, lab report, ...)
    Sub,
    /// Baseline snapshot
    Bsl,
    /// Composition record
    Cmp,
    /// Incident
    Inc,
}

impl EntityPrefix {
    /// All known prefixes
    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Sub,
            EntityPrefix::Bsl,
            EntityPrefix::Cmp,
            EntityPrefix::Inc,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Sub => "SUB",
            EntityPrefix::Bsl => "BSL",
            EntityPrefix::Cmp => "CMP",
            EntityPrefix::Inc => "INC",
        }
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUB" => Ok(EntityPrefix::Sub),
            "BSL" => Ok(EntityPrefix::Bsl),
            "CMP" => Ok(EntityPrefix::Cmp),
            "INC" => Ok(EntityPrefix::Inc),
            _ => Err(IdParseError::UnknownPrefix(s.to_string())),
        }
    }
}

/// Errors from parsing IDs and attribute keys
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("Missing '-' separator in ID: {0}")]
    MissingSeparator(String),

    #[error("Unknown entity prefix: {0}")]
    UnknownPrefix(String),

    #[error("Invalid ULID in ID {id}: {message}")]
    InvalidUlid { id: String, message: String },

    #[error("Attribute key must not be empty")]
    EmptyKey,

    #[error("Attribute key '{0}' contains whitespace")]
    KeyWhitespace(String),
}

/// Unique entity identifier: prefix + ULID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl EntityId {
    /// Generate a new ID with the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    pub fn ulid(&self) -> Ulid {
        self.ulid
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, ulid) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingSeparator(s.to_string()))?;
        let prefix: EntityPrefix = prefix.parse()?;
        let ulid = Ulid::from_string(ulid).map_err(|e| IdParseError::InvalidUlid {
            id: s.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Stable, case-sensitive key naming one baseline attribute.
///
/// Keys are opaque: the only checks are that the key is non-empty and
/// contains no whitespace. `Kosher_Certified` and `kosher_certified` are
/// different attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey(String);

impl AttributeKey {
    pub fn new(key: impl Into<String>) -> Result<Self, IdParseError> {
        let key = key.into();
        if key.is_empty() {
            return Err(IdParseError::EmptyKey);
        }
        if key.chars().any(char::is_whitespace) {
            return Err(IdParseError::KeyWhitespace(key));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AttributeKey {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeKey::new(s)
    }
}

impl AsRef<str> for AttributeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for AttributeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for AttributeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AttributeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AttributeKey::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(EntityPrefix::Sub);
        let s = id.to_string();
        assert!(s.starts_with("SUB-"));
        assert_eq!(s.len(), 30);

        let parsed: EntityId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_entity_id_rejects_garbage() {
        assert!(matches!(
            "NOPREFIX".parse::<EntityId>(),
            Err(IdParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            "XYZ-01KCWY20F01B21V0G4E835NW3J".parse::<EntityId>(),
            Err(IdParseError::UnknownPrefix(_))
        ));
        assert!(matches!(
            "SUB-notaulid".parse::<EntityId>(),
            Err(IdParseError::InvalidUlid { .. })
        ));
    }

    #[test]
    fn test_prefix_parse_is_case_insensitive() {
        assert_eq!("inc".parse::<EntityPrefix>().unwrap(), EntityPrefix::Inc);
        assert_eq!(EntityPrefix::all().len(), 4);
    }

    #[test]
    fn test_attribute_key_validation() {
        assert!(AttributeKey::new("kosher_certified").is_ok());
        assert_eq!(AttributeKey::new(""), Err(IdParseError::EmptyKey));
        assert!(matches!(
            AttributeKey::new("purity percentage"),
            Err(IdParseError::KeyWhitespace(_))
        ));
    }

    #[test]
    fn test_attribute_key_is_case_sensitive() {
        let a = AttributeKey::new("Halal").unwrap();
        let b = AttributeKey::new("halal").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_attribute_key_deserialize_validates() {
        let ok: AttributeKey = serde_yml::from_str("purity_percentage").unwrap();
        assert_eq!(ok.as_str(), "purity_percentage");

        let bad: Result<AttributeKey, _> = serde_yml::from_str("\"has space\"");
        assert!(bad.is_err());
    }
}

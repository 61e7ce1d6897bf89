//! Baseline history - versioned snapshots with optimistic commits

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::entities::baseline::Baseline;
use crate::yaml::{parse_yaml_file, write_yaml_file, YamlError};

/// A recalculation raced another writer for the same product
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("Baseline for '{product}' changed underneath this recalculation: read version {expected}, now at {actual}; retry")]
    VersionChanged {
        product: String,
        expected: u32,
        actual: u32,
    },

    #[error("Baseline is for product '{found}' but this history belongs to '{expected}'")]
    WrongProduct { expected: String, found: String },
}

impl ConflictError {
    /// Version conflicts succeed on a fresh read and recalculation
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConflictError::VersionChanged { .. })
    }
}

/// Errors loading or saving a history file
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Yaml(#[from] YamlError),

    #[error("History file holds {count} snapshots with inconsistent versions or products")]
    Corrupt { count: usize },
}

/// Every baseline snapshot for one product, oldest first.
///
/// Snapshots are never edited; a recalculation appends a new one with the
/// next version number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineHistory {
    product: String,
    #[serde(default)]
    snapshots: Vec<Baseline>,
}

impl BaselineHistory {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            snapshots: Vec::new(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// Current version; 0 when no baseline exists yet
    pub fn version(&self) -> u32 {
        self.latest().map_or(0, |b| b.version)
    }

    pub fn latest(&self) -> Option<&Baseline> {
        self.snapshots.last()
    }

    /// Snapshot before the latest one
    pub fn previous(&self) -> Option<&Baseline> {
        self.snapshots.len().checked_sub(2).map(|i| &self.snapshots[i])
    }

    pub fn get(&self, version: u32) -> Option<&Baseline> {
        self.snapshots.iter().find(|b| b.version == version)
    }

    pub fn snapshots(&self) -> &[Baseline] {
        &self.snapshots
    }

    /// Append a snapshot computed from version `expected_version`.
    ///
    /// Fails with a retryable conflict when the history moved on since the
    /// caller read it. The snapshot's version is set to `expected_version + 1`.
    pub fn commit(
        &mut self,
        mut baseline: Baseline,
        expected_version: u32,
    ) -> Result<&Baseline, ConflictError> {
        if baseline.product != self.product {
            return Err(ConflictError::WrongProduct {
                expected: self.product.clone(),
                found: baseline.product,
            });
        }
        let actual = self.version();
        if actual != expected_version {
            tracing::warn!(
                product = %self.product,
                expected = expected_version,
                actual,
                "baseline commit conflict"
            );
            return Err(ConflictError::VersionChanged {
                product: self.product.clone(),
                expected: expected_version,
                actual,
            });
        }
        baseline.version = expected_version + 1;
        tracing::info!(
            product = %self.product,
            version = baseline.version,
            baseline = %baseline.id,
            "baseline committed"
        );
        self.snapshots.push(baseline);
        Ok(&self.snapshots[self.snapshots.len() - 1])
    }

    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let history: Self = parse_yaml_file(path)?;
        let consistent = history
            .snapshots
            .iter()
            .enumerate()
            .all(|(i, b)| b.product == history.product && b.version as usize == i + 1);
        if !consistent {
            return Err(HistoryError::Corrupt {
                count: history.snapshots.len(),
            });
        }
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        write_yaml_file(path, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(product: &str) -> Baseline {
        Baseline::new(product, None, 0)
    }

    #[test]
    fn test_empty_history() {
        let h = BaselineHistory::new("P-1");
        assert_eq!(h.version(), 0);
        assert!(h.latest().is_none());
        assert!(h.previous().is_none());
    }

    #[test]
    fn test_commit_assigns_versions() {
        let mut h = BaselineHistory::new("P-1");
        assert_eq!(h.commit(draft("P-1"), 0).unwrap().version, 1);
        assert_eq!(h.commit(draft("P-1"), 1).unwrap().version, 2);
        assert_eq!(h.version(), 2);
        assert_eq!(h.previous().unwrap().version, 1);
        assert!(h.get(1).is_some());
        assert!(h.get(3).is_none());
    }

    #[test]
    fn test_stale_commit_conflicts() {
        let mut h = BaselineHistory::new("P-1");
        h.commit(draft("P-1"), 0).unwrap();
        let err = h.commit(draft("P-1"), 0).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            err,
            ConflictError::VersionChanged {
                product: "P-1".into(),
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(h.snapshots().len(), 1);
    }

    #[test]
    fn test_wrong_product_rejected() {
        let mut h = BaselineHistory::new("P-1");
        let err = h.commit(draft("P-2"), 0).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.yaml");
        let mut h = BaselineHistory::new("P-1");
        h.commit(draft("P-1"), 0).unwrap();
        h.commit(draft("P-1"), 1).unwrap();
        h.save(&path).unwrap();

        let loaded = BaselineHistory::load(&path).unwrap();
        assert_eq!(loaded.version(), 2);
        assert_eq!(loaded.product(), "P-1");
    }
}

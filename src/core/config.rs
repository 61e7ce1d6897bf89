//! Engine configuration
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no
//! file) gives the standard thresholds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::entities::finding::Severity;
use crate::yaml::{parse_yaml, parse_yaml_file, YamlError};

/// Numeric deviation thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Deviations at or above this are WARNING (default: 5.0)
    pub warning: f64,
    /// Deviations at or above this are CRITICAL (default: 10.0)
    pub critical: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            warning: 5.0,
            critical: 10.0,
        }
    }
}

impl SeverityThresholds {
    /// Classify a deviation percentage
    pub fn classify(&self, deviation_percent: f64) -> Severity {
        if deviation_percent >= self.critical {
            Severity::Critical
        } else if deviation_percent >= self.warning {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Numeric severity thresholds
    pub severity: SeverityThresholds,

    /// Severity assigned to version-comparison findings (default: info)
    pub version_comparison_severity: Severity,

    /// Minimum characters in an override justification (default: 20)
    pub min_justification_length: usize,

    /// Extraction confidence below which match scores are downgraded (default: 50)
    pub low_confidence_threshold: f64,

    /// Percentage differences at or below this are not changes (default: 0.01)
    pub change_epsilon: f64,

    /// Allowed slack when checking merge weights sum to 1.0 (default: 0.01)
    pub weight_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            severity: SeverityThresholds::default(),
            version_comparison_severity: Severity::Info,
            min_justification_length: 20,
            low_confidence_threshold: 50.0,
            change_epsilon: 0.01,
            weight_tolerance: 0.01,
        }
    }
}

/// Errors in engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Yaml(#[from] YamlError),

    #[error("Invalid severity thresholds: warning ({warning}) must be >= 0 and <= critical ({critical})")]
    Thresholds { warning: f64, critical: f64 },

    #[error("Invalid {field}: {value} (must be a finite, non-negative number)")]
    OutOfRange { field: &'static str, value: f64 },
}

impl EngineConfig {
    /// Parse and validate configuration from YAML content
    pub fn from_yaml(content: &str, filename: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = parse_yaml(content, filename)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: EngineConfig = parse_yaml_file(path)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Load from a file when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let SeverityThresholds { warning, critical } = self.severity;
        if !warning.is_finite() || !critical.is_finite() || warning < 0.0 || warning > critical {
            return Err(ConfigError::Thresholds { warning, critical });
        }
        for (field, value) in [
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("change_epsilon", self.change_epsilon),
            ("weight_tolerance", self.weight_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

//! Entity type definitions

pub mod baseline;
pub mod composition;
pub mod finding;
pub mod incident;
pub mod rule;
pub mod submission;

pub use baseline::{Baseline, BaselineField};
pub use composition::{CompositionLine, CompositionRecord, ExtractionBatch, MergeStrategy};
pub use finding::{DeviationFinding, FindingKind, Severity};
pub use incident::{Incident, IncidentEvent, IncidentState};
pub use rule::{AttributeRule, ResolutionPolicy, RuleSet, RuleSetError};
pub use submission::{ReferenceData, SourceValue, Submission};

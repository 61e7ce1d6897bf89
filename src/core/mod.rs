//! Core module - resolution policies, reconciliation and validation

pub mod config;
pub mod deviation;
pub mod engine;
pub mod entity;
pub mod field_logic;
pub mod identity;
pub mod lifecycle;
pub mod policy;
pub mod reconcile;
pub mod snapshot;

pub use config::{EngineConfig, SeverityThresholds};
pub use deviation::{DeviationValidator, FindingSummary, ValidationError};
pub use engine::{EngineError, ProductLocks, ReconciliationEngine, ValidationReport};
pub use entity::Entity;
pub use field_logic::{FieldLogicEngine, ProductInputs, ResolveError};
pub use identity::{AttributeKey, EntityId, EntityPrefix, IdParseError};
pub use lifecycle::{IncidentError, IncidentLedger, IncidentMachine, Transition};
pub use reconcile::{ComponentReconciler, DiffResult, ReconcileError};
pub use snapshot::{BaselineHistory, ConflictError};

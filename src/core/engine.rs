//! Reconciliation engine - per-product serialization around the pure core
//!
//! Resolution, diffing and validation are pure functions. This module adds
//! the one piece of shared state the core needs: a baseline store guarded by
//! per-product locks, so recalculation and incident auto-creation for the
//! same product never overlap. Different products run fully in parallel.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::deviation::{DeviationValidator, FindingSummary, ValidationError};
use crate::core::field_logic::{FieldLogicEngine, ProductInputs, ResolveError};
use crate::core::identity::EntityId;
use crate::core::lifecycle::IncidentLedger;
use crate::core::policy::FieldValue;
use crate::core::reconcile::ComponentReconciler;
use crate::core::snapshot::{BaselineHistory, ConflictError};
use crate::entities::baseline::Baseline;
use crate::entities::finding::DeviationFinding;
use crate::entities::incident::IncidentEvent;
use crate::entities::rule::{PolicyKind, RuleSet};
use crate::entities::submission::Submission;

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No baseline exists for product '{0}'")]
    NoBaseline(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(c) if c.is_retryable())
    }
}

/// One mutex per product key. Entries exist only while some caller holds or
/// waits on the product's lock.
#[derive(Debug, Default)]
pub struct ProductLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, product: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(product.to_string()).or_default())
    }

    /// Drop the registry entry when the map holds the only other reference.
    /// Handles are only cloned under the map lock, so the count is stable here.
    fn release(&self, product: &str, handle: Arc<Mutex<()>>) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = map
            .get(product)
            .is_some_and(|entry| Arc::ptr_eq(entry, &handle) && Arc::strong_count(&handle) == 2);
        if idle {
            map.remove(product);
        }
    }

    /// Run `f` while holding the product's lock
    pub fn with_product<T>(&self, product: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(product);
        let result = {
            // Poisoned locks are reused; critical sections only publish whole snapshots
            let _guard: MutexGuard<'_, ()> =
                handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(product, handle);
        result
    }

    /// Number of products currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory baseline histories keyed by product
#[derive(Debug, Default)]
pub struct BaselineStore {
    histories: RwLock<HashMap<String, BaselineHistory>>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a loaded history, replacing any existing one
    pub fn insert(&self, history: BaselineHistory) {
        let mut map = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(history.product().to_string(), history);
    }

    pub fn version(&self, product: &str) -> u32 {
        let map = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        map.get(product).map_or(0, BaselineHistory::version)
    }

    pub fn latest(&self, product: &str) -> Option<Baseline> {
        let map = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        map.get(product).and_then(|h| h.latest().cloned())
    }

    pub fn history(&self, product: &str) -> Option<BaselineHistory> {
        let map = self.histories.read().unwrap_or_else(PoisonError::into_inner);
        map.get(product).cloned()
    }

    /// Optimistic commit; see [`BaselineHistory::commit`]
    pub fn commit(&self, baseline: Baseline, expected_version: u32) -> Result<Baseline, ConflictError> {
        let mut map = self.histories.write().unwrap_or_else(PoisonError::into_inner);
        let history = map
            .entry(baseline.product.clone())
            .or_insert_with(|| BaselineHistory::new(baseline.product.clone()));
        history.commit(baseline, expected_version).cloned()
    }
}

/// Outcome of validating one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub submission: EntityId,
    pub product: String,
    pub baseline_version: u32,
    pub summary: FindingSummary,
    pub findings: Vec<DeviationFinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incidents_opened: Vec<IncidentEvent>,
    /// Whether the submission has no open or escalated incidents
    pub can_advance: bool,
}

/// Facade over the three core components plus the baseline store
pub struct ReconciliationEngine {
    field_logic: FieldLogicEngine,
    config: EngineConfig,
    locks: ProductLocks,
    store: BaselineStore,
}

impl ReconciliationEngine {
    pub fn new(rules: RuleSet, config: EngineConfig) -> Self {
        Self {
            field_logic: FieldLogicEngine::new(rules),
            config,
            locks: ProductLocks::new(),
            store: BaselineStore::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        self.field_logic.rules()
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn reconciler(&self) -> ComponentReconciler {
        ComponentReconciler::new(&self.config)
    }

    /// Recalculate and commit a product's baseline.
    ///
    /// Manual fields that a human already filled in the current snapshot
    /// carry over into the new one.
    pub fn recalculate(&self, inputs: &ProductInputs) -> Result<Baseline, EngineError> {
        self.locks.with_product(&inputs.product, || -> Result<Baseline, EngineError> {
            let read_version = self.store.version(&inputs.product);
            let current = self.store.latest(&inputs.product);

            let mut baseline = self.field_logic.resolve_baseline(inputs, read_version + 1)?;
            if let Some(current) = &current {
                carry_forward_manual(&mut baseline, current);
            }
            Ok(self.store.commit(baseline, read_version)?)
        })
    }

    /// Recalculate many products in parallel, one task per product
    pub fn recalculate_all(
        &self,
        batch: &[ProductInputs],
    ) -> Vec<(String, Result<Baseline, EngineError>)> {
        batch
            .par_iter()
            .map(|inputs| (inputs.product.clone(), self.recalculate(inputs)))
            .collect()
    }

    /// Validate against the product's latest stored baseline and auto-open
    /// incidents into `ledger`
    pub fn validate(
        &self,
        submission: &Submission,
        previous: Option<&Submission>,
        ledger: &mut IncidentLedger,
    ) -> Result<ValidationReport, EngineError> {
        self.locks.with_product(&submission.product, || -> Result<ValidationReport, EngineError> {
            let baseline = self
                .store
                .latest(&submission.product)
                .ok_or_else(|| EngineError::NoBaseline(submission.product.clone()))?;
            self.validate_locked(submission, &baseline, previous, ledger)
        })
    }

    /// Validate against an explicit baseline snapshot
    pub fn validate_against(
        &self,
        submission: &Submission,
        baseline: &Baseline,
        previous: Option<&Submission>,
        ledger: &mut IncidentLedger,
    ) -> Result<ValidationReport, EngineError> {
        self.locks.with_product(&submission.product, || {
            self.validate_locked(submission, baseline, previous, ledger)
        })
    }

    fn validate_locked(
        &self,
        submission: &Submission,
        baseline: &Baseline,
        previous: Option<&Submission>,
        ledger: &mut IncidentLedger,
    ) -> Result<ValidationReport, EngineError> {
        let validator = DeviationValidator::new(self.field_logic.rules(), &self.config);
        let findings = validator.validate(submission, baseline, previous)?;
        let incidents_opened = ledger.auto_open(&submission.product, &findings, Utc::now());
        Ok(ValidationReport {
            submission: submission.id,
            product: submission.product.clone(),
            baseline_version: baseline.version,
            summary: FindingSummary::from_findings(&findings),
            findings,
            incidents_opened,
            can_advance: ledger.can_advance_past_review(&submission.id),
        })
    }
}

fn carry_forward_manual(next: &mut Baseline, current: &Baseline) {
    for (key, field) in next.fields.iter_mut() {
        if field.policy != PolicyKind::Manual {
            continue;
        }
        if let Some(prior) = current.fields.get(key) {
            if prior.policy == PolicyKind::Manual && !matches!(prior.value, FieldValue::Unset) {
                field.value = prior.value.clone();
            }
        }
    }
}

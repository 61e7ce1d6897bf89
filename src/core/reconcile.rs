//! Component reconciliation - diff and merge composition records
//!
//! Lines are matched by chemical identifier when both sides carry one, and
//! by case-insensitive name otherwise. The match score is a plain linear
//! penalty:
//!
//! ```text
//! score = max(0, 100 - Σ|changed Δ| - Σ added% - Σ|removed%|)
//! ```
//!
//! It is not a similarity metric and is kept exactly as is: downstream
//! consumers compare scores across runs, so the numeric scale must stay
//! reproducible. Note that added percentages are subtracted signed while
//! removed percentages are subtracted as magnitudes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::identity::EntityId;
use crate::entities::composition::{
    CompositionLine, CompositionRecord, MergeProvenance, MergeStrategy,
};

/// Errors from diffing or merging composition records
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("Cannot reconcile {a} ({a_product}) with {b} ({b_product}): different products")]
    ProductMismatch {
        a: EntityId,
        a_product: String,
        b: EntityId,
        b_product: String,
    },

    #[error("Merge needs at least two records, got {0}")]
    TooFewRecords(usize),

    #[error("Expected {expected} weights (one per record), got {got}")]
    WeightCount { expected: usize, got: usize },

    #[error("Weight {value} for record {index} is negative or not a number")]
    InvalidWeight { index: usize, value: f64 },

    #[error("Weights sum to {sum:.4}, must be 1.0 ± {tolerance}")]
    WeightSum { sum: f64, tolerance: f64 },
}

/// One component that differs between two records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chemical_id: Option<String>,

    pub name: String,

    /// Percentage in the base record (absent for added lines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<f64>,

    /// Percentage in the candidate record (absent for removed lines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<f64>,

    /// after - before; +pct for added lines, -pct for removed lines
    pub delta: f64,

    /// delta relative to before, in percent (changed lines with non-zero before)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_delta: Option<f64>,
}

impl ComponentChange {
    pub fn label(&self) -> &str {
        self.chemical_id.as_deref().unwrap_or(&self.name)
    }

    fn added(line: &CompositionLine) -> Self {
        Self {
            chemical_id: line.identifier().map(str::to_string),
            name: line.name.clone(),
            before: None,
            after: Some(line.percentage),
            delta: line.percentage,
            relative_delta: None,
        }
    }

    fn removed(line: &CompositionLine) -> Self {
        Self {
            chemical_id: line.identifier().map(str::to_string),
            name: line.name.clone(),
            before: Some(line.percentage),
            after: None,
            delta: -line.percentage,
            relative_delta: None,
        }
    }

    fn changed(before: &CompositionLine, after: &CompositionLine) -> Self {
        let delta = after.percentage - before.percentage;
        let relative_delta = if before.percentage == 0.0 {
            None
        } else {
            Some(delta / before.percentage * 100.0)
        };
        Self {
            chemical_id: before.identifier().or(after.identifier()).map(str::to_string),
            name: before.name.clone(),
            before: Some(before.percentage),
            after: Some(after.percentage),
            delta,
            relative_delta,
        }
    }
}

/// Result of comparing a base record with a candidate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub base: EntityId,
    pub candidate: EntityId,

    /// Lines only in the candidate
    pub added: Vec<ComponentChange>,

    /// Lines only in the base
    pub removed: Vec<ComponentChange>,

    /// Matched lines whose percentage moved by more than epsilon
    pub changed: Vec<ComponentChange>,

    /// Matched lines within epsilon
    pub unchanged: usize,

    /// Linear-penalty score, 0-100
    pub match_score: f64,

    /// Score after low-confidence downgrade (equal to match_score otherwise)
    pub effective_score: f64,

    /// Either record came from a low-confidence extraction
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_confidence: bool,
}

impl DiffResult {
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// The linear-penalty match score over a set of changes
pub fn match_score(
    added: &[ComponentChange],
    removed: &[ComponentChange],
    changed: &[ComponentChange],
) -> f64 {
    let changed_penalty: f64 = changed.iter().map(|c| c.delta.abs()).sum();
    let added_penalty: f64 = added.iter().map(|c| c.delta).sum();
    let removed_penalty: f64 = removed.iter().map(|c| c.delta.abs()).sum();
    (100.0 - changed_penalty - added_penalty - removed_penalty).max(0.0)
}

/// Pair up lines of two records. Identifier matches are taken first so a
/// name-only line cannot steal a component that has an exact identifier
/// match later in the list.
fn pair_lines(a: &[CompositionLine], b: &[CompositionLine]) -> Vec<(Option<usize>, Option<usize>)> {
    let mut a_used = vec![false; a.len()];
    let mut b_partner: Vec<Option<usize>> = vec![None; b.len()];

    // Pass 1: identifiers on both sides
    for (j, bl) in b.iter().enumerate() {
        if bl.identifier().is_none() {
            continue;
        }
        let hit = a
            .iter()
            .enumerate()
            .position(|(i, al)| !a_used[i] && al.same_identifier(bl));
        if let Some(i) = hit {
            a_used[i] = true;
            b_partner[j] = Some(i);
        }
    }

    // Pass 2: name fallback where at least one side lacks an identifier
    for (j, bl) in b.iter().enumerate() {
        if b_partner[j].is_some() {
            continue;
        }
        let hit = a.iter().enumerate().position(|(i, al)| {
            !a_used[i]
                && (al.identifier().is_none() || bl.identifier().is_none())
                && al.matches(bl)
        });
        if let Some(i) = hit {
            a_used[i] = true;
            b_partner[j] = Some(i);
        }
    }

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    for (i, used) in a_used.iter().enumerate() {
        if *used {
            let j = b_partner.iter().position(|p| *p == Some(i));
            pairs.push((Some(i), j));
        } else {
            pairs.push((Some(i), None));
        }
    }
    for (j, partner) in b_partner.iter().enumerate() {
        if partner.is_none() {
            pairs.push((None, Some(j)));
        }
    }
    pairs
}

/// Diffs and merges composition records
#[derive(Debug, Clone)]
pub struct ComponentReconciler {
    epsilon: f64,
    low_confidence_threshold: f64,
    weight_tolerance: f64,
}

impl Default for ComponentReconciler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ComponentReconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            epsilon: config.change_epsilon,
            low_confidence_threshold: config.low_confidence_threshold,
            weight_tolerance: config.weight_tolerance,
        }
    }

    /// Compare `b` (candidate) against `a` (base)
    pub fn diff(
        &self,
        a: &CompositionRecord,
        b: &CompositionRecord,
    ) -> Result<DiffResult, ReconcileError> {
        ensure_same_product(a, b)?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        let mut unchanged = 0;

        for pair in pair_lines(&a.lines, &b.lines) {
            match pair {
                (Some(i), Some(j)) => {
                    let (before, after) = (&a.lines[i], &b.lines[j]);
                    if (after.percentage - before.percentage).abs() > self.epsilon {
                        changed.push(ComponentChange::changed(before, after));
                    } else {
                        unchanged += 1;
                    }
                }
                (Some(i), None) => removed.push(ComponentChange::removed(&a.lines[i])),
                (None, Some(j)) => added.push(ComponentChange::added(&b.lines[j])),
                (None, None) => {}
            }
        }

        let score = match_score(&added, &removed, &changed);
        let confidence = [a.confidence, b.confidence]
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |m| m.min(c))));
        let low_confidence = confidence.is_some_and(|c| c < self.low_confidence_threshold);
        let effective_score = match confidence {
            Some(c) if low_confidence => score * (c / 100.0),
            _ => score,
        };

        if low_confidence {
            tracing::warn!(
                base = %a.id,
                candidate = %b.id,
                confidence = confidence.unwrap_or_default(),
                "low-confidence extraction; match score downgraded"
            );
        }
        tracing::debug!(
            base = %a.id,
            candidate = %b.id,
            added = added.len(),
            removed = removed.len(),
            changed = changed.len(),
            score,
            "composition diff"
        );

        Ok(DiffResult {
            base: a.id,
            candidate: b.id,
            added,
            removed,
            changed,
            unchanged,
            match_score: score,
            effective_score,
            low_confidence,
        })
    }

    /// Merge two records
    pub fn merge(
        &self,
        a: &CompositionRecord,
        b: &CompositionRecord,
        strategy: MergeStrategy,
    ) -> Result<CompositionRecord, ReconcileError> {
        self.merge_all(&[a, b], strategy)
    }

    /// Merge two or more records of the same product.
    ///
    /// Shared lines get the (weighted) mean of the records that carry them;
    /// lines carried by a single record keep their percentage. The result is
    /// rescaled to sum to 100 unless everything is zero.
    pub fn merge_all(
        &self,
        records: &[&CompositionRecord],
        strategy: MergeStrategy,
    ) -> Result<CompositionRecord, ReconcileError> {
        if records.len() < 2 {
            return Err(ReconcileError::TooFewRecords(records.len()));
        }
        for r in &records[1..] {
            ensure_same_product(records[0], r)?;
        }
        let weights = self.weights_for(records.len(), &strategy)?;

        // Each group: representative line + (record index, percentage) contributions
        let mut groups: Vec<(CompositionLine, Vec<(usize, f64)>)> = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            for line in &record.lines {
                let free = |g: &(CompositionLine, Vec<(usize, f64)>)| {
                    !g.1.iter().any(|(r, _)| *r == idx)
                };
                let by_id = groups
                    .iter()
                    .position(|g| free(g) && g.0.same_identifier(line));
                let slot = by_id.or_else(|| {
                    groups.iter().position(|g| {
                        free(g)
                            && (g.0.identifier().is_none() || line.identifier().is_none())
                            && g.0.matches(line)
                    })
                });
                match slot {
                    Some(g) => {
                        let group = &mut groups[g];
                        if group.0.identifier().is_none() {
                            group.0.chemical_id = line.identifier().map(str::to_string);
                        }
                        group.1.push((idx, line.percentage));
                    }
                    None => groups.push((line.clone(), vec![(idx, line.percentage)])),
                }
            }
        }

        let mut lines: Vec<CompositionLine> = groups
            .into_iter()
            .map(|(mut line, contributions)| {
                line.percentage = combine(&contributions, &weights);
                line
            })
            .collect();

        let total: f64 = lines.iter().map(|l| l.percentage).sum();
        if total != 0.0 {
            let scale = 100.0 / total;
            for line in &mut lines {
                line.percentage *= scale;
            }
        }

        let mut merged = CompositionRecord::new(records[0].product.clone(), lines);
        merged.label = Some("merged".to_string());
        merged.confidence = records
            .iter()
            .filter_map(|r| r.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |m| m.min(c))));
        merged.provenance = Some(MergeProvenance {
            sources: records.iter().map(|r| r.id).collect(),
            strategy: strategy.clone(),
            merged_at: Utc::now(),
        });

        tracing::info!(
            merged = %merged.id,
            sources = records.len(),
            strategy = %strategy,
            lines = merged.lines.len(),
            "composition records merged"
        );
        Ok(merged)
    }

    fn weights_for(&self, count: usize, strategy: &MergeStrategy) -> Result<Vec<f64>, ReconcileError> {
        match strategy {
            MergeStrategy::EqualWeight => Ok(vec![1.0 / count as f64; count]),
            MergeStrategy::Weighted { weights } => {
                if weights.len() != count {
                    return Err(ReconcileError::WeightCount {
                        expected: count,
                        got: weights.len(),
                    });
                }
                if let Some((index, value)) = weights
                    .iter()
                    .copied()
                    .enumerate()
                    .find(|(_, w)| !w.is_finite() || *w < 0.0)
                {
                    return Err(ReconcileError::InvalidWeight { index, value });
                }
                let sum: f64 = weights.iter().sum();
                if (sum - 1.0).abs() > self.weight_tolerance {
                    return Err(ReconcileError::WeightSum {
                        sum,
                        tolerance: self.weight_tolerance,
                    });
                }
                Ok(weights.clone())
            }
        }
    }
}

/// Weighted mean over the records that carry a line. Falls back to the plain
/// mean when every contributing record has zero weight.
fn combine(contributions: &[(usize, f64)], weights: &[f64]) -> f64 {
    let weight_sum: f64 = contributions.iter().map(|(r, _)| weights[*r]).sum();
    if weight_sum > 0.0 {
        contributions
            .iter()
            .map(|(r, pct)| weights[*r] * pct)
            .sum::<f64>()
            / weight_sum
    } else {
        contributions.iter().map(|(_, pct)| pct).sum::<f64>() / contributions.len() as f64
    }
}

fn ensure_same_product(a: &CompositionRecord, b: &CompositionRecord) -> Result<(), ReconcileError> {
    if a.product == b.product {
        Ok(())
    } else {
        Err(ReconcileError::ProductMismatch {
            a: a.id,
            a_product: a.product.clone(),
            b: b.id,
            b_product: b.product.clone(),
        })
    }
}

//! Incident lifecycle - state transitions, auto-creation and the review gate
//!
//! Transitions are pure: [`IncidentMachine::apply`] takes the current incident
//! and returns the next one together with the event to route, or an error
//! without touching anything. [`IncidentLedger`] is the in-memory view of the
//! persisted incidents that enforces one non-terminal incident per
//! `(submission, attribute)` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::config::EngineConfig;
use crate::core::identity::{AttributeKey, EntityId};
use crate::entities::finding::DeviationFinding;
use crate::entities::incident::{Incident, IncidentEvent, IncidentState};
use crate::yaml::{parse_yaml_file, write_yaml_file, YamlError};

/// Requested incident transition with its required payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// OPEN → ESCALATED; the reason becomes the incident notes
    Escalate { reason: String },
    /// OPEN → OVERRIDDEN
    Override { justification: String },
    /// OPEN | ESCALATED → RESOLVED
    Resolve { notes: String },
}

impl Transition {
    pub fn target(&self) -> IncidentState {
        match self {
            Transition::Escalate { .. } => IncidentState::Escalated,
            Transition::Override { .. } => IncidentState::Overridden,
            Transition::Resolve { .. } => IncidentState::Resolved,
        }
    }
}

/// Incident transition errors. None of these change any state.
#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("Invalid incident transition for {id}: {from} → {to}")]
    InvalidTransition {
        id: EntityId,
        from: IncidentState,
        to: IncidentState,
    },

    #[error("Override justification for {id} is too short: {got} characters (minimum {min})")]
    JustificationTooShort { id: EntityId, min: usize, got: usize },

    #[error("Transition of {id} to {to} requires notes")]
    MissingNotes { id: EntityId, to: IncidentState },

    #[error("Incident not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Yaml(#[from] YamlError),
}

/// Incident state machine
#[derive(Debug, Clone)]
pub struct IncidentMachine {
    min_justification_length: usize,
}

impl Default for IncidentMachine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl IncidentMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_justification_length: config.min_justification_length,
        }
    }

    /// Check if a state transition is valid
    pub fn is_valid_transition(&self, from: IncidentState, to: IncidentState) -> bool {
        matches!(
            (from, to),
            (IncidentState::Open, IncidentState::Escalated)
                | (IncidentState::Open, IncidentState::Overridden)
                | (IncidentState::Open, IncidentState::Resolved)
                | (IncidentState::Escalated, IncidentState::Resolved)
        )
    }

    /// Get allowed transitions from the current state
    pub fn allowed_transitions(&self, current: IncidentState) -> Vec<IncidentState> {
        match current {
            IncidentState::Open => vec![
                IncidentState::Escalated,
                IncidentState::Overridden,
                IncidentState::Resolved,
            ],
            IncidentState::Escalated => vec![IncidentState::Resolved],
            IncidentState::Overridden | IncidentState::Resolved => vec![],
        }
    }

    /// Compute the next incident state, or fail without side effects
    pub fn apply(
        &self,
        incident: &Incident,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<(Incident, IncidentEvent), IncidentError> {
        let from = incident.state;
        let to = transition.target();
        if !self.is_valid_transition(from, to) {
            return Err(IncidentError::InvalidTransition {
                id: incident.id,
                from,
                to,
            });
        }

        let mut next = incident.clone();
        next.state = to;

        match transition {
            Transition::Escalate { reason } => {
                next.notes = Some(self.require_notes(incident, to, &reason)?);
                next.notified_at = Some(at);
            }
            Transition::Override { justification } => {
                let justification = justification.trim();
                let got = justification.chars().count();
                if got < self.min_justification_length {
                    return Err(IncidentError::JustificationTooShort {
                        id: incident.id,
                        min: self.min_justification_length,
                        got,
                    });
                }
                next.notes = Some(justification.to_string());
                next.resolved_at = Some(at);
            }
            Transition::Resolve { notes } => {
                let notes = self.require_notes(incident, to, &notes)?;
                // Escalation reason is kept ahead of the resolution notes
                next.notes = Some(match &incident.notes {
                    Some(prior) => format!("{}\n{}", prior, notes),
                    None => notes,
                });
                next.resolved_at = Some(at);
            }
        }

        tracing::info!(incident = %incident.id, %from, %to, "incident transition");
        let event = IncidentEvent {
            incident_id: incident.id,
            from: Some(from),
            to,
            at,
        };
        Ok((next, event))
    }

    fn require_notes(
        &self,
        incident: &Incident,
        to: IncidentState,
        notes: &str,
    ) -> Result<String, IncidentError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(IncidentError::MissingNotes {
                id: incident.id,
                to,
            });
        }
        Ok(notes.to_string())
    }
}

/// All known incidents for a product or workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentLedger {
    #[serde(default)]
    incidents: Vec<Incident>,
}

impl IncidentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_incidents(incidents: Vec<Incident>) -> Self {
        Self { incidents }
    }

    /// Load a ledger file; a missing file is an empty ledger
    pub fn load(path: &Path) -> Result<Self, IncidentError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        Ok(parse_yaml_file(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), IncidentError> {
        write_yaml_file(path, self)?;
        Ok(())
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Look up an incident by full id or unique id prefix
    pub fn get(&self, id: &str) -> Result<&Incident, IncidentError> {
        self.position(id).map(|i| &self.incidents[i])
    }

    /// The non-terminal incident for a pair, if any
    pub fn find_active(&self, submission: &EntityId, key: &AttributeKey) -> Option<&Incident> {
        self.incidents
            .iter()
            .find(|i| !i.state.is_terminal() && i.covers(submission, key))
    }

    /// Open an incident for every finding that calls for one and has no
    /// non-terminal incident yet. Returns the opening events.
    pub fn auto_open(
        &mut self,
        product: &str,
        findings: &[DeviationFinding],
        at: DateTime<Utc>,
    ) -> Vec<IncidentEvent> {
        let mut events = Vec::new();
        for finding in findings.iter().filter(|f| f.opens_incident()) {
            if let Some(existing) = self.find_active(&finding.submission, &finding.attribute_key) {
                tracing::debug!(
                    incident = %existing.id,
                    attribute = %finding.attribute_key,
                    "non-terminal incident already exists"
                );
                continue;
            }
            let incident = Incident::open(product, finding, at);
            tracing::info!(
                incident = %incident.id,
                submission = %finding.submission,
                attribute = %finding.attribute_key,
                "incident opened"
            );
            events.push(IncidentEvent {
                incident_id: incident.id,
                from: None,
                to: IncidentState::Open,
                at,
            });
            self.incidents.push(incident);
        }
        events
    }

    /// Apply a transition to the incident with this id. The ledger is only
    /// updated when the transition succeeds.
    pub fn transition(
        &mut self,
        machine: &IncidentMachine,
        id: &str,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<IncidentEvent, IncidentError> {
        let idx = self.position(id)?;
        let (next, event) = machine.apply(&self.incidents[idx], transition, at)?;
        self.incidents[idx] = next;
        Ok(event)
    }

    /// Number of incidents still holding a submission in review
    pub fn blocking_count(&self, submission: &EntityId) -> usize {
        self.incidents
            .iter()
            .filter(|i| &i.submission == submission && i.state.is_blocking())
            .count()
    }

    /// A submission may only leave review with no open or escalated incidents
    pub fn can_advance_past_review(&self, submission: &EntityId) -> bool {
        self.blocking_count(submission) == 0
    }

    fn position(&self, id: &str) -> Result<usize, IncidentError> {
        let needle = id.trim().to_uppercase();
        let matches: Vec<usize> = self
            .incidents
            .iter()
            .enumerate()
            .filter(|(_, i)| i.id.to_string().starts_with(&needle))
            .map(|(idx, _)| idx)
            .collect();
        match matches.as_slice() {
            [only] => Ok(*only),
            _ => Err(IncidentError::NotFound(id.to_string())),
        }
    }
}

//! Error taxonomy for the workflow engine.
//!
//! State-conflict variants carry the observed status so callers can decide
//! whether a retry makes sense. Quorum-not-met is not an error: recording a
//! verdict on a still-pending decision simply returns the pending status.

use crate::status::{DecisionStatus, DisputeStatus, TenderStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Criterion weights do not sum to 100
    #[error("invalid criteria: weights sum to {weight_sum}, expected 100")]
    InvalidCriteria { weight_sum: u32 },

    /// Publish attempted with a deadline that already passed
    #[error("deadline {deadline} is in the past")]
    DeadlineInPast { deadline: DateTime<Utc> },

    /// Generic illegal transition; carries the current state for the caller
    #[error("cannot move tender from {current} to {attempted}")]
    StateConflict {
        current: TenderStatus,
        attempted: TenderStatus,
    },

    #[error("tender is not open (currently {current})")]
    TenderNotOpen { current: TenderStatus },

    #[error("tender is not closed (currently {current})")]
    TenderNotClosed { current: TenderStatus },

    #[error("tender is not awarded (currently {current})")]
    TenderNotAwarded { current: TenderStatus },

    #[error("cannot close a tender with no assigned evaluators")]
    NoEvaluatorsAssigned,

    /// Submission or amendment arrived after the deadline
    #[error("submission deadline {deadline} has passed")]
    DeadlineExceeded { deadline: DateTime<Utc> },

    #[error("criterion {criterion_id} is not part of this tender")]
    UnknownCriteria { criterion_id: String },

    #[error("evaluator {evaluator_id} is not assigned to this tender")]
    UnassignedEvaluator { evaluator_id: String },

    /// Out-of-range scores are rejected, never clamped
    #[error("score {value} outside declared range [{min}, {max}]")]
    ScoreOutOfRange { value: f64, min: f64, max: f64 },

    /// Dispute filed after the window expired
    #[error("dispute window closed at {window_end}")]
    WindowClosed { window_end: DateTime<Utc> },

    #[error("the winning vendor cannot dispute the award")]
    WinnerCannotDispute,

    /// Approver already recorded a verdict on this decision
    #[error("approver {approver_id} already voted on decision {decision_id}")]
    DuplicateVerdict {
        decision_id: String,
        approver_id: String,
    },

    #[error("decision already resolved ({current})")]
    DecisionResolved { current: DecisionStatus },

    #[error("dispute already terminal ({current})")]
    DisputeResolved { current: DisputeStatus },

    #[error("not found: {0}")]
    NotFound(String),

    /// Role mismatch for the attempted operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Persistent store failure; the logical operation was aborted without
    /// partial writes
    #[error("store unavailable: {0}")]
    Store(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

//! Canonical domain types for the tender evaluation and award workflow.
//!
//! Every crate in the workspace goes through these definitions; status values
//! are never handled as ad-hoc strings outside the storage boundary.

pub mod error;
pub mod status;
pub mod types;

pub use error::EngineError;
pub use status::{
    DecisionStatus, DisputeStatus, Role, StatusParseError, SubmissionStatus, TenderStatus, Verdict,
};
pub use types::{
    Approval, Criterion, Decision, Dispute, FileRef, Principal, RankedSubmission, Score,
    StatusTransition, Submission, SubmissionPayload, Tender, TenderDraft,
};

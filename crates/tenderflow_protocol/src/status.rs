//! Status enums and the tender lifecycle transition table.
//!
//! These are the CANONICAL definitions - use them everywhere. The database
//! stores the lowercase string forms and parses back at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error when parsing a status value from its string form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind}: '{value}'")]
pub struct StatusParseError {
    pub kind: &'static str,
    pub value: String,
}

impl StatusParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Tender lifecycle
// ============================================================================

/// Tender lifecycle status.
///
/// The transition table is the single authority for lifecycle moves; every
/// component goes through it rather than writing status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenderStatus {
    /// Being drafted, not visible to vendors
    #[default]
    Draft,
    /// Published and accepting submissions
    Open,
    /// Submissions locked, evaluation in progress
    Closed,
    /// Terminal: a winner has been awarded
    Awarded,
    /// Terminal: withdrawn before award
    Cancelled,
}

impl TenderStatus {
    pub const ALL: [TenderStatus; 5] = [
        TenderStatus::Draft,
        TenderStatus::Open,
        TenderStatus::Closed,
        TenderStatus::Awarded,
        TenderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TenderStatus::Draft => "draft",
            TenderStatus::Open => "open",
            TenderStatus::Closed => "closed",
            TenderStatus::Awarded => "awarded",
            TenderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TenderStatus::Awarded | TenderStatus::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TenderStatus] {
        match self {
            TenderStatus::Draft => &[TenderStatus::Open, TenderStatus::Cancelled],
            TenderStatus::Open => &[TenderStatus::Closed, TenderStatus::Cancelled],
            TenderStatus::Closed => &[TenderStatus::Awarded, TenderStatus::Cancelled],
            TenderStatus::Awarded | TenderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TenderStatus) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TenderStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(TenderStatus::Draft),
            "open" => Ok(TenderStatus::Open),
            "closed" => Ok(TenderStatus::Closed),
            "awarded" => Ok(TenderStatus::Awarded),
            "cancelled" => Ok(TenderStatus::Cancelled),
            _ => Err(StatusParseError::new("tender status", s)),
        }
    }
}

// ============================================================================
// Submission status
// ============================================================================

/// Submission status. Terminal status is set by the award coordinator or the
/// cancellation cascade, never by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Awarded,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Awarded => "awarded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Rejected | SubmissionStatus::Awarded)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "awarded" => Ok(SubmissionStatus::Awarded),
            _ => Err(StatusParseError::new("submission status", s)),
        }
    }
}

// ============================================================================
// Decision status and verdicts
// ============================================================================

/// Award decision status. Resolves exactly once: unanimous approval or a
/// single reject verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, DecisionStatus::Pending)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DecisionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DecisionStatus::Pending),
            "approved" => Ok(DecisionStatus::Approved),
            "rejected" => Ok(DecisionStatus::Rejected),
            _ => Err(StatusParseError::new("decision status", s)),
        }
    }
}

/// An approver's verdict on a pending decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::Reject => "reject",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(Verdict::Approve),
            "reject" => Ok(Verdict::Reject),
            _ => Err(StatusParseError::new("verdict", s)),
        }
    }
}

// ============================================================================
// Dispute status
// ============================================================================

/// Post-award dispute status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    #[default]
    Pending,
    Investigating,
    Resolved,
    Dismissed,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Pending => "pending",
            DisputeStatus::Investigating => "investigating",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Dismissed)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DisputeStatus::Pending),
            "investigating" => Ok(DisputeStatus::Investigating),
            "resolved" => Ok(DisputeStatus::Resolved),
            "dismissed" => Ok(DisputeStatus::Dismissed),
            _ => Err(StatusParseError::new("dispute status", s)),
        }
    }
}

// ============================================================================
// Principal roles
// ============================================================================

/// Role of an already-authenticated principal, supplied by the external
/// auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Procurement manager: owns tenders and award proposals
    Procurement,
    /// Vendor: submits and amends proposals, may dispute
    Vendor,
    /// Evaluator: scores submissions against criteria
    Evaluator,
    /// Admin: dispute resolution and overrides
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Procurement => "procurement",
            Role::Vendor => "vendor",
            Role::Evaluator => "evaluator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "procurement" => Ok(Role::Procurement),
            "vendor" => Ok(Role::Vendor),
            "evaluator" => Ok(Role::Evaluator),
            "admin" => Ok(Role::Admin),
            _ => Err(StatusParseError::new("role", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tender_status_roundtrip() {
        for status in TenderStatus::ALL {
            let parsed: TenderStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
        assert!("limbo".parse::<TenderStatus>().is_err());
    }

    #[test]
    fn test_tender_status_serde() {
        assert_eq!(
            serde_json::to_string(&TenderStatus::Awarded).unwrap(),
            "\"awarded\""
        );
        assert_eq!(
            serde_json::from_str::<TenderStatus>("\"draft\"").unwrap(),
            TenderStatus::Draft
        );
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(TenderStatus::Draft.can_transition_to(TenderStatus::Open));
        assert!(TenderStatus::Open.can_transition_to(TenderStatus::Closed));
        assert!(TenderStatus::Closed.can_transition_to(TenderStatus::Awarded));

        // Cancellation is reachable from every non-terminal state
        for status in [TenderStatus::Draft, TenderStatus::Open, TenderStatus::Closed] {
            assert!(status.can_transition_to(TenderStatus::Cancelled));
        }

        // No skipping and no leaving terminal states
        assert!(!TenderStatus::Draft.can_transition_to(TenderStatus::Closed));
        assert!(!TenderStatus::Open.can_transition_to(TenderStatus::Awarded));
        assert!(TenderStatus::Awarded.valid_transitions().is_empty());
        assert!(TenderStatus::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn test_terminal_detection() {
        assert!(!TenderStatus::Draft.is_terminal());
        assert!(!TenderStatus::Closed.is_terminal());
        assert!(TenderStatus::Awarded.is_terminal());
        assert!(TenderStatus::Cancelled.is_terminal());

        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(SubmissionStatus::Awarded.is_terminal());

        assert!(!DisputeStatus::Investigating.is_terminal());
        assert!(DisputeStatus::Dismissed.is_terminal());
    }

    #[test]
    fn test_verdict_from_str() {
        assert_eq!("approve".parse::<Verdict>().unwrap(), Verdict::Approve);
        assert_eq!("REJECT".parse::<Verdict>().unwrap(), Verdict::Reject);
        assert!("abstain".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("procurement".parse::<Role>().unwrap(), Role::Procurement);
        assert_eq!("Vendor".parse::<Role>().unwrap(), Role::Vendor);
        assert!("auditor".parse::<Role>().is_err());
    }
}

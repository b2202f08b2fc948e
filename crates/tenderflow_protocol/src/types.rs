//! Domain records shared across the workspace.

use crate::status::{
    DecisionStatus, DisputeStatus, Role, SubmissionStatus, TenderStatus, Verdict,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tenderflow_ids::{CriterionId, DecisionId, DisputeId, SubmissionId, TenderId};

// ============================================================================
// Principal
// ============================================================================

/// An already-authenticated caller. Identity verification is an external
/// collaborator; the engine only consumes the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

// ============================================================================
// Tender
// ============================================================================

/// A weighted evaluation dimension. Weights across a tender sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub name: String,
    /// Weight in percent (0-100)
    pub weight: u32,
    /// Inclusive score range evaluators may assign
    pub min_value: f64,
    pub max_value: f64,
}

impl Criterion {
    /// New criterion on the conventional 0-5 scale.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: CriterionId::new(),
            name: name.into(),
            weight,
            min_value: 0.0,
            max_value: 5.0,
        }
    }

    pub fn with_range(mut self, min_value: f64, max_value: f64) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    pub fn accepts(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }
}

/// Input for creating a tender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderDraft {
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub deadline: DateTime<Utc>,
    pub dispute_window_days: u32,
    pub criteria: Vec<Criterion>,
    pub evaluators: Vec<String>,
    pub approvers: Vec<String>,
}

/// A published procurement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub id: TenderId,
    pub title: String,
    pub description: String,
    pub status: TenderStatus,
    pub budget: f64,
    pub deadline: DateTime<Utc>,
    pub dispute_window_days: u32,
    /// Ordered criteria; weights sum to 100 once published
    pub criteria: Vec<Criterion>,
    pub evaluators: Vec<String>,
    pub approvers: Vec<String>,
    pub winning_submission_id: Option<SubmissionId>,
    /// Set exactly once by the award transition
    pub awarded_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    pub fn weight_sum(&self) -> u32 {
        self.criteria.iter().map(|c| c.weight).sum()
    }

    pub fn criterion(&self, id: &CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|c| &c.id == id)
    }

    pub fn has_evaluator(&self, evaluator_id: &str) -> bool {
        self.evaluators.iter().any(|e| e == evaluator_id)
    }

    /// Latest instant at which a dispute may still be filed, if awarded.
    pub fn dispute_window_end(&self) -> Option<DateTime<Utc>> {
        self.awarded_at
            .map(|at| at + Duration::days(i64::from(self.dispute_window_days)))
    }

    /// The dispute window is a pure function of `now`; no timer exists.
    pub fn dispute_window_open(&self, now: DateTime<Utc>) -> bool {
        self.dispute_window_end().is_some_and(|end| now <= end)
    }
}

/// Audit record of a lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: TenderStatus,
    pub to: TenderStatus,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Submission
// ============================================================================

/// Metadata for an externally stored file. Bytes live in the object store;
/// the engine never sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub key: String,
    pub size: u64,
    pub content_type: String,
}

/// Vendor input for submit/amend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub proposal: String,
    pub proposed_budget: f64,
    #[serde(default)]
    pub attachments: Vec<FileRef>,
}

/// A vendor's proposal against a tender. One row per vendor per tender;
/// amendments overwrite in place until the deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub tender_id: TenderId,
    pub vendor_id: String,
    pub proposal: String,
    pub proposed_budget: f64,
    pub status: SubmissionStatus,
    pub attachments: Vec<FileRef>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One evaluator's score for one criterion. At most one row per
/// (submission, evaluator, criterion); later writes overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub submission_id: SubmissionId,
    pub evaluator_id: String,
    pub criterion_id: CriterionId,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A ranking entry. Only submissions with at least one complete evaluator
/// score set appear in rankings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSubmission {
    pub submission_id: SubmissionId,
    pub vendor_id: String,
    pub average_score: f64,
    /// Evaluators with a complete score set contributing to the average
    pub evaluator_count: usize,
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// Decision
// ============================================================================

/// One committee member's recorded verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub approver_id: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An award proposal and its approval record. The committee is snapshotted
/// at proposal time so later tender edits cannot move a pending quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub tender_id: TenderId,
    pub proposed_winner_id: SubmissionId,
    pub status: DecisionStatus,
    pub proposed_by: String,
    /// Set when the proposal bypassed the top-ranked submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation_note: Option<String>,
    pub committee: Vec<String>,
    pub approvals: Vec<Approval>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn approval_for(&self, approver_id: &str) -> Option<&Approval> {
        self.approvals.iter().find(|a| a.approver_id == approver_id)
    }

    /// Outcome implied by the recorded verdicts: any reject resolves the
    /// decision rejected, unanimity resolves it approved, otherwise pending.
    pub fn quorum_outcome(&self) -> DecisionStatus {
        if self.approvals.iter().any(|a| a.verdict == Verdict::Reject) {
            return DecisionStatus::Rejected;
        }
        let approved = self
            .committee
            .iter()
            .filter(|member| {
                self.approval_for(member)
                    .is_some_and(|a| a.verdict == Verdict::Approve)
            })
            .count();
        if !self.committee.is_empty() && approved == self.committee.len() {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Pending
        }
    }
}

// ============================================================================
// Dispute
// ============================================================================

/// A post-award challenge from a non-winning vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub tender_id: TenderId,
    pub raised_by_vendor_id: String,
    pub reason: String,
    pub evidence: Vec<FileRef>,
    pub status: DisputeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub filed_at: DateTime<Utc>,
}

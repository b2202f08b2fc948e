//! Award coordination: proposal against a closed tender and the
//! unanimous-approval / single-veto quorum.

use crate::{require_role, store_err, Result, TenderEngine};
use chrono::{DateTime, Utc};
use tenderflow_db::{ApprovalResult, DbError};
use tenderflow_ids::{DecisionId, SubmissionId, TenderId};
use tenderflow_protocol::{
    Decision, EngineError, Principal, Role, TenderStatus, Verdict,
};
use tracing::info;

impl TenderEngine {
    /// Propose a submission for award. The committee is snapshotted from the
    /// tender's approvers; proposing past the top-ranked submission is
    /// allowed but leaves a deviation note in the record.
    pub async fn propose_award(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        submission_id: &SubmissionId,
    ) -> Result<Decision> {
        self.propose_award_at(principal, tender_id, submission_id, Utc::now())
            .await
    }

    pub async fn propose_award_at(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        submission_id: &SubmissionId,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        require_role(principal, &[Role::Procurement, Role::Admin])?;
        let tender = self.require_tender(tender_id).await?;

        if tender.status != TenderStatus::Closed {
            return Err(EngineError::TenderNotClosed {
                current: tender.status,
            });
        }
        if tender.approvers.is_empty() {
            return Err(EngineError::validation(
                "tender has no approvers to form a committee",
            ));
        }

        let submission = self.get_submission(submission_id).await?;
        if submission.tender_id != *tender_id {
            return Err(EngineError::not_found(format!(
                "submission {} on tender {}",
                submission_id, tender_id
            )));
        }

        if let Some(pending) = self
            .db
            .pending_decision_for_tender(tender_id)
            .await
            .map_err(store_err)?
        {
            return Err(EngineError::validation(format!(
                "decision {} is already pending for this tender",
                pending.id
            )));
        }

        let ranking = self.get_ranking(tender_id).await?;
        let deviation_note = match ranking.first() {
            Some(top) if top.submission_id != *submission_id => Some(format!(
                "proposed {} over top-ranked {} ({:.2})",
                submission.vendor_id, top.vendor_id, top.average_score
            )),
            _ => None,
        };
        if let Some(note) = &deviation_note {
            info!(tender_id = %tender_id, note, "Award proposal deviates from ranking");
        }

        match self
            .db
            .create_decision(
                tender_id,
                submission_id,
                &principal.id,
                deviation_note.as_deref(),
                &tender.approvers,
                now,
            )
            .await
        {
            Ok(decision) => Ok(decision),
            // Lost a concurrent propose to the unique pending-decision index
            Err(DbError::Constraint(msg)) => Err(EngineError::Validation(msg)),
            Err(e) => Err(store_err(e)),
        }
    }

    /// Record one committee member's verdict. Returns the decision as it
    /// stands afterwards; a still-pending quorum is not an error. When the
    /// verdict completes a unanimous approval the award cascade has already
    /// run by the time this returns.
    pub async fn add_approval(
        &self,
        principal: &Principal,
        decision_id: &DecisionId,
        verdict: Verdict,
        comment: Option<String>,
    ) -> Result<Decision> {
        self.add_approval_at(principal, decision_id, verdict, comment, Utc::now())
            .await
    }

    pub async fn add_approval_at(
        &self,
        principal: &Principal,
        decision_id: &DecisionId,
        verdict: Verdict,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let decision = self.require_decision(decision_id).await?;
        if !decision.committee.iter().any(|m| m == &principal.id) {
            return Err(EngineError::forbidden(format!(
                "{} is not on the committee for decision {}",
                principal.id, decision_id
            )));
        }

        let result = self
            .db
            .record_approval(decision_id, &principal.id, verdict, comment.as_deref(), now)
            .await
            .map_err(store_err)?;

        match result {
            ApprovalResult::Recorded { .. } => self.require_decision(decision_id).await,
            ApprovalResult::Duplicate => Err(EngineError::DuplicateVerdict {
                decision_id: decision_id.to_string(),
                approver_id: principal.id.clone(),
            }),
            ApprovalResult::AlreadyResolved { status } => {
                Err(EngineError::DecisionResolved { current: status })
            }
            ApprovalResult::TenderConflict => {
                let current = self.require_tender(&decision.tender_id).await?.status;
                Err(EngineError::TenderNotClosed { current })
            }
        }
    }

    pub async fn get_decision(&self, id: &DecisionId) -> Result<Decision> {
        self.require_decision(id).await
    }

    pub async fn decisions_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Decision>> {
        self.require_tender(tender_id).await?;
        self.db.decisions_for_tender(tender_id).await.map_err(store_err)
    }

    async fn require_decision(&self, id: &DecisionId) -> Result<Decision> {
        self.db
            .get_decision(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::not_found(format!("decision {}", id)))
    }
}

//! Submission intake: validation and the amend-until-deadline upsert.

use crate::{require_role, store_err, Result, TenderEngine};
use chrono::{DateTime, Utc};
use tenderflow_ids::{SubmissionId, TenderId};
use tenderflow_protocol::{
    EngineError, Principal, Role, Submission, SubmissionPayload, TenderStatus,
};

impl TenderEngine {
    /// Submit or amend a proposal. One submission per vendor per tender;
    /// a repeat call before the deadline overwrites the previous payload.
    pub async fn submit_proposal(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        payload: &SubmissionPayload,
    ) -> Result<Submission> {
        self.submit_proposal_at(principal, tender_id, payload, Utc::now())
            .await
    }

    pub async fn submit_proposal_at(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        payload: &SubmissionPayload,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        require_role(principal, &[Role::Vendor])?;
        let tender = self.require_tender(tender_id).await?;

        if tender.status != TenderStatus::Open {
            return Err(EngineError::TenderNotOpen {
                current: tender.status,
            });
        }
        // Checked independently of the status flag: nothing flips a tender
        // to closed at the deadline instant.
        if now >= tender.deadline {
            return Err(EngineError::DeadlineExceeded {
                deadline: tender.deadline,
            });
        }
        if payload.proposal.trim().is_empty() {
            return Err(EngineError::validation("proposal text is required"));
        }
        if payload.proposed_budget <= 0.0 {
            return Err(EngineError::validation("proposed budget must be positive"));
        }

        self.db
            .upsert_submission(tender_id, &principal.id, payload, now)
            .await
            .map_err(store_err)
    }

    pub async fn get_submission(&self, id: &SubmissionId) -> Result<Submission> {
        self.db
            .get_submission(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::not_found(format!("submission {}", id)))
    }

    pub async fn list_submissions(&self, tender_id: &TenderId) -> Result<Vec<Submission>> {
        self.require_tender(tender_id).await?;
        self.db.list_submissions(tender_id).await.map_err(store_err)
    }
}

//! Post-award disputes: filing inside the window and resolution.

use crate::{require_role, store_err, Result, TenderEngine};
use chrono::{DateTime, Utc};
use tenderflow_ids::{DisputeId, TenderId};
use tenderflow_protocol::{
    Dispute, DisputeStatus, EngineError, FileRef, Principal, Role, TenderStatus,
};

impl TenderEngine {
    /// File a dispute against an awarded tender. Only a non-winning vendor
    /// with a submission on the tender may file, and only while
    /// now <= awarded_at + dispute_window_days (boundary inclusive).
    pub async fn file_dispute(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        reason: &str,
        evidence: &[FileRef],
    ) -> Result<Dispute> {
        self.file_dispute_at(principal, tender_id, reason, evidence, Utc::now())
            .await
    }

    pub async fn file_dispute_at(
        &self,
        principal: &Principal,
        tender_id: &TenderId,
        reason: &str,
        evidence: &[FileRef],
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        require_role(principal, &[Role::Vendor])?;
        let tender = self.require_tender(tender_id).await?;

        if tender.status != TenderStatus::Awarded {
            return Err(EngineError::TenderNotAwarded {
                current: tender.status,
            });
        }

        let submission = self
            .db
            .get_submission_by_vendor(tender_id, &principal.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| {
                EngineError::forbidden(format!(
                    "{} has no submission on tender {}",
                    principal.id, tender_id
                ))
            })?;
        if tender.winning_submission_id.as_ref() == Some(&submission.id) {
            return Err(EngineError::WinnerCannotDispute);
        }

        if !tender.dispute_window_open(now) {
            // awarded implies awarded_at is set, so the end always exists
            let window_end = tender.dispute_window_end().ok_or_else(|| {
                EngineError::Store(format!("awarded tender {} has no awarded_at", tender_id))
            })?;
            return Err(EngineError::WindowClosed { window_end });
        }

        if reason.trim().is_empty() {
            return Err(EngineError::validation("dispute reason is required"));
        }

        self.db
            .create_dispute(tender_id, &principal.id, reason, evidence, now)
            .await
            .map_err(store_err)
    }

    /// Move a pending dispute under investigation. Idempotent for a dispute
    /// already being investigated.
    pub async fn begin_investigation(
        &self,
        principal: &Principal,
        dispute_id: &DisputeId,
    ) -> Result<Dispute> {
        require_role(principal, &[Role::Admin])?;
        let dispute = self.require_dispute(dispute_id).await?;

        match dispute.status {
            DisputeStatus::Pending => {
                self.db
                    .begin_investigation(dispute_id)
                    .await
                    .map_err(store_err)?;
                self.require_dispute(dispute_id).await
            }
            DisputeStatus::Investigating => Ok(dispute),
            current => Err(EngineError::DisputeResolved { current }),
        }
    }

    /// Close an open dispute as resolved or dismissed.
    pub async fn resolve_dispute(
        &self,
        principal: &Principal,
        dispute_id: &DisputeId,
        outcome: DisputeStatus,
        resolution: &str,
    ) -> Result<Dispute> {
        self.resolve_dispute_at(principal, dispute_id, outcome, resolution, Utc::now())
            .await
    }

    pub async fn resolve_dispute_at(
        &self,
        principal: &Principal,
        dispute_id: &DisputeId,
        outcome: DisputeStatus,
        resolution: &str,
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        require_role(principal, &[Role::Admin])?;
        if !matches!(outcome, DisputeStatus::Resolved | DisputeStatus::Dismissed) {
            return Err(EngineError::validation(format!(
                "dispute outcome must be resolved or dismissed, got {}",
                outcome
            )));
        }
        if resolution.trim().is_empty() {
            return Err(EngineError::validation("resolution text is required"));
        }

        let closed = self
            .db
            .close_dispute(dispute_id, outcome, resolution, &principal.id, now)
            .await
            .map_err(store_err)?;
        if !closed {
            let current = self.require_dispute(dispute_id).await?.status;
            return Err(EngineError::DisputeResolved { current });
        }
        self.require_dispute(dispute_id).await
    }

    pub async fn get_dispute(&self, id: &DisputeId) -> Result<Dispute> {
        self.require_dispute(id).await
    }

    pub async fn list_disputes(&self, tender_id: &TenderId) -> Result<Vec<Dispute>> {
        self.require_tender(tender_id).await?;
        self.db.disputes_for_tender(tender_id).await.map_err(store_err)
    }

    async fn require_dispute(&self, id: &DisputeId) -> Result<Dispute> {
        self.db
            .get_dispute(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::not_found(format!("dispute {}", id)))
    }
}

//! Tender lifecycle: creation, publish, close, cancel, and the audit trail.
//!
//! The transition table lives on `TenderStatus`; this module validates the
//! business preconditions and delegates the CAS to the store. A lost CAS is
//! re-read and surfaced as a `StateConflict` carrying the current status.

use crate::{require_role, store_err, Result, TenderEngine};
use chrono::{DateTime, Utc};
use tenderflow_ids::TenderId;
use tenderflow_protocol::{
    EngineError, Principal, Role, StatusTransition, Tender, TenderDraft, TenderStatus,
};
use tracing::warn;

impl TenderEngine {
    /// Create a tender in `draft`. Criteria may still be empty at this point;
    /// weights are enforced when any are supplied and again at publish.
    pub async fn create_tender(&self, principal: &Principal, draft: &TenderDraft) -> Result<Tender> {
        self.create_tender_at(principal, draft, Utc::now()).await
    }

    pub async fn create_tender_at(
        &self,
        principal: &Principal,
        draft: &TenderDraft,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        require_role(principal, &[Role::Procurement, Role::Admin])?;

        if draft.title.trim().is_empty() {
            return Err(EngineError::validation("tender title is required"));
        }
        if draft.budget <= 0.0 {
            return Err(EngineError::validation("budget must be positive"));
        }
        if !draft.criteria.is_empty() {
            let weight_sum: u32 = draft.criteria.iter().map(|c| c.weight).sum();
            if weight_sum != 100 {
                return Err(EngineError::InvalidCriteria { weight_sum });
            }
            for criterion in &draft.criteria {
                if criterion.min_value >= criterion.max_value {
                    return Err(EngineError::validation(format!(
                        "criterion {} has an empty score range",
                        criterion.name
                    )));
                }
            }
        }

        self.db
            .create_tender(draft, &principal.id, now)
            .await
            .map_err(store_err)
    }

    /// Publish a draft: weights must sum to 100 and the deadline must still
    /// be in the future.
    pub async fn publish_tender(&self, principal: &Principal, id: &TenderId) -> Result<Tender> {
        self.publish_tender_at(principal, id, Utc::now()).await
    }

    pub async fn publish_tender_at(
        &self,
        principal: &Principal,
        id: &TenderId,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        require_role(principal, &[Role::Procurement, Role::Admin])?;
        let tender = self.require_tender(id).await?;

        if tender.status != TenderStatus::Draft {
            return Err(EngineError::StateConflict {
                current: tender.status,
                attempted: TenderStatus::Open,
            });
        }
        let weight_sum = tender.weight_sum();
        if weight_sum != 100 {
            return Err(EngineError::InvalidCriteria { weight_sum });
        }
        if tender.deadline <= now {
            return Err(EngineError::DeadlineInPast {
                deadline: tender.deadline,
            });
        }

        self.transition(id, TenderStatus::Draft, TenderStatus::Open, principal, None, now)
            .await
    }

    /// Close an open tender to further submissions. Requires at least one
    /// assigned evaluator. Before the deadline this is an early close and is
    /// noted in the audit trail.
    pub async fn close_tender(&self, principal: &Principal, id: &TenderId) -> Result<Tender> {
        self.close_tender_at(principal, id, Utc::now()).await
    }

    pub async fn close_tender_at(
        &self,
        principal: &Principal,
        id: &TenderId,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        require_role(principal, &[Role::Procurement, Role::Admin])?;
        let tender = self.require_tender(id).await?;

        if tender.status != TenderStatus::Open {
            return Err(EngineError::TenderNotOpen {
                current: tender.status,
            });
        }
        if tender.evaluators.is_empty() {
            return Err(EngineError::NoEvaluatorsAssigned);
        }

        let reason = if now < tender.deadline {
            Some("closed before deadline")
        } else {
            None
        };
        self.transition(id, TenderStatus::Open, TenderStatus::Closed, principal, reason, now)
            .await
    }

    /// Cancel from any non-terminal state. All non-terminal submissions are
    /// rejected in the same transaction.
    pub async fn cancel_tender(&self, principal: &Principal, id: &TenderId) -> Result<Tender> {
        self.cancel_tender_at(principal, id, Utc::now()).await
    }

    pub async fn cancel_tender_at(
        &self,
        principal: &Principal,
        id: &TenderId,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        require_role(principal, &[Role::Procurement, Role::Admin])?;
        let tender = self.require_tender(id).await?;

        if !tender.status.can_transition_to(TenderStatus::Cancelled) {
            return Err(EngineError::StateConflict {
                current: tender.status,
                attempted: TenderStatus::Cancelled,
            });
        }

        let moved = self
            .db
            .cancel_tender(id, tender.status, &principal.id, now)
            .await
            .map_err(store_err)?;
        if !moved {
            return self.conflict(id, TenderStatus::Cancelled).await;
        }
        self.require_tender(id).await
    }

    pub async fn get_tender(&self, id: &TenderId) -> Result<Tender> {
        self.require_tender(id).await
    }

    pub async fn list_tenders(&self, status: Option<TenderStatus>) -> Result<Vec<Tender>> {
        self.db.list_tenders(status).await.map_err(store_err)
    }

    /// Lifecycle audit trail, oldest first.
    pub async fn transition_history(&self, id: &TenderId) -> Result<Vec<StatusTransition>> {
        self.require_tender(id).await?;
        self.db.transition_history(id).await.map_err(store_err)
    }

    async fn transition(
        &self,
        id: &TenderId,
        expected: TenderStatus,
        to: TenderStatus,
        principal: &Principal,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        let moved = self
            .db
            .transition_tender(id, expected, to, &principal.id, reason, now)
            .await
            .map_err(store_err)?;
        if !moved {
            return self.conflict(id, to).await;
        }
        self.require_tender(id).await
    }

    /// The CAS lost; re-read for the precise current status.
    async fn conflict(&self, id: &TenderId, attempted: TenderStatus) -> Result<Tender> {
        let current = self.require_tender(id).await?.status;
        warn!(tender_id = %id, %current, %attempted, "Lifecycle transition lost the race");
        Err(EngineError::StateConflict { current, attempted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenderflow_db::TenderDb;
    use tenderflow_protocol::Criterion;

    async fn engine() -> TenderEngine {
        TenderEngine::new(TenderDb::open_in_memory().await.unwrap())
    }

    fn pm() -> Principal {
        Principal::new("pm-1", Role::Procurement)
    }

    fn draft(criteria: Vec<Criterion>) -> TenderDraft {
        TenderDraft {
            title: "Road resurfacing".to_string(),
            description: String::new(),
            budget: 1_000_000.0,
            deadline: Utc::now() + Duration::days(10),
            dispute_window_days: 7,
            criteria,
            evaluators: vec!["eval-1".to_string()],
            approvers: vec!["appr-1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_weights_must_sum_to_100() {
        let engine = engine().await;
        let bad = draft(vec![Criterion::new("technical", 60), Criterion::new("cost", 30)]);
        let err = engine.create_tender(&pm(), &bad).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCriteria { weight_sum: 90 }));

        let good = draft(vec![
            Criterion::new("technical", 40),
            Criterion::new("cost", 30),
            Criterion::new("sustainability", 20),
            Criterion::new("delivery", 10),
        ]);
        assert!(engine.create_tender(&pm(), &good).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_requires_future_deadline() {
        let engine = engine().await;
        let mut d = draft(vec![Criterion::new("quality", 100)]);
        d.deadline = Utc::now() + Duration::days(1);
        let tender = engine.create_tender(&pm(), &d).await.unwrap();

        let late = d.deadline + Duration::hours(1);
        let err = engine
            .publish_tender_at(&pm(), &tender.id, late)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DeadlineInPast { .. }));

        let published = engine
            .publish_tender_at(&pm(), &tender.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(published.status, TenderStatus::Open);
    }

    #[tokio::test]
    async fn test_close_requires_evaluators() {
        let engine = engine().await;
        let mut d = draft(vec![Criterion::new("quality", 100)]);
        d.evaluators.clear();
        let tender = engine.create_tender(&pm(), &d).await.unwrap();
        engine.publish_tender(&pm(), &tender.id).await.unwrap();

        let err = engine.close_tender(&pm(), &tender.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NoEvaluatorsAssigned));
    }

    #[tokio::test]
    async fn test_vendor_cannot_publish() {
        let engine = engine().await;
        let tender = engine
            .create_tender(&pm(), &draft(vec![Criterion::new("quality", 100)]))
            .await
            .unwrap();
        let vendor = Principal::new("vendor-a", Role::Vendor);
        let err = engine.publish_tender(&vendor, &tender.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let engine = engine().await;
        let tender = engine
            .create_tender(&pm(), &draft(vec![Criterion::new("quality", 100)]))
            .await
            .unwrap();
        engine.cancel_tender(&pm(), &tender.id).await.unwrap();

        let err = engine.publish_tender(&pm(), &tender.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::StateConflict {
                current: TenderStatus::Cancelled,
                ..
            }
        ));

        let history = engine.transition_history(&tender.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to, TenderStatus::Cancelled);
    }
}

//! Award decision storage: proposal with a committee snapshot and atomic
//! verdict recording that resolves the quorum in the same transaction.

use crate::error::{DbError, Result};
use crate::row::{parse_enum, parse_ts, ts_str};
use crate::tender::award_cascade;
use crate::TenderDb;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tenderflow_ids::{DecisionId, SubmissionId, TenderId};
use tenderflow_protocol::{Approval, Decision, DecisionStatus, Verdict};
use tracing::info;

/// What happened to a verdict submitted against a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalResult {
    /// Verdict recorded; `resolved_now` is true when this verdict tipped the
    /// quorum and `status` moved off pending in the same transaction.
    Recorded {
        status: DecisionStatus,
        resolved_now: bool,
    },
    /// The approver already voted on this decision.
    Duplicate,
    /// The decision was already resolved before this verdict arrived.
    AlreadyResolved { status: DecisionStatus },
    /// The quorum approved but the tender was no longer awardable, so the
    /// whole transaction was rolled back and nothing was recorded.
    TenderConflict,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl TenderDb {
    /// Record an award proposal and snapshot the committee, in one
    /// transaction. At most one pending decision may exist per tender,
    /// enforced by a partial unique index.
    pub async fn create_decision(
        &self,
        tender_id: &TenderId,
        proposed_winner_id: &SubmissionId,
        proposed_by: &str,
        deviation_note: Option<&str>,
        committee: &[String],
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let id = DecisionId::new();
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO decisions
                (id, tender_id, proposed_winner_id, status, proposed_by, deviation_note, created_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(tender_id.as_str())
        .bind(proposed_winner_id.as_str())
        .bind(proposed_by)
        .bind(deviation_note)
        .bind(ts_str(now))
        .execute(&mut *tx)
        .await;

        // The partial unique index allows one pending decision per tender;
        // the loser of a concurrent propose lands here
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                tx.rollback().await?;
                return Err(DbError::constraint(format!(
                    "a pending decision already exists for tender {}",
                    tender_id
                )));
            }
            return Err(e.into());
        }

        for approver in committee {
            sqlx::query("INSERT INTO decision_committee (decision_id, approver_id) VALUES (?, ?)")
                .bind(id.as_str())
                .bind(approver)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            decision_id = %id,
            tender_id = %tender_id,
            winner = %proposed_winner_id,
            committee = committee.len(),
            "Award proposed"
        );

        self.get_decision(&id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("decision {} after insert", id)))
    }

    pub async fn get_decision(&self, id: &DecisionId) -> Result<Option<Decision>> {
        let row = sqlx::query("SELECT * FROM decisions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let committee = self.decision_committee(id).await?;
        let approvals = self.decision_approvals(id).await?;

        Ok(Some(Decision {
            id: id.clone(),
            tender_id: TenderId::parse(&row.get::<String, _>("tender_id"))
                .map_err(|e| DbError::type_conversion(e.to_string()))?,
            proposed_winner_id: SubmissionId::parse(&row.get::<String, _>("proposed_winner_id"))
                .map_err(|e| DbError::type_conversion(e.to_string()))?,
            status: parse_enum("decision status", row.get::<String, _>("status").as_str())?,
            proposed_by: row.get("proposed_by"),
            deviation_note: row.get("deviation_note"),
            committee,
            approvals,
            created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        }))
    }

    /// The open decision for a tender, if any. The engine never proposes a
    /// second award while one is pending.
    pub async fn pending_decision_for_tender(
        &self,
        tender_id: &TenderId,
    ) -> Result<Option<Decision>> {
        let row = sqlx::query("SELECT id FROM decisions WHERE tender_id = ? AND status = 'pending'")
            .bind(tender_id.as_str())
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => {
                let id = DecisionId::parse(&row.get::<String, _>("id"))
                    .map_err(|e| DbError::type_conversion(e.to_string()))?;
                self.get_decision(&id).await
            }
            None => Ok(None),
        }
    }

    pub async fn decisions_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Decision>> {
        let rows = sqlx::query(
            "SELECT id FROM decisions WHERE tender_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(tender_id.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut decisions = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = DecisionId::parse(&row.get::<String, _>("id"))
                .map_err(|e| DbError::type_conversion(e.to_string()))?;
            if let Some(decision) = self.get_decision(&id).await? {
                decisions.push(decision);
            }
        }
        Ok(decisions)
    }

    /// Record one approver's verdict and resolve the quorum atomically.
    ///
    /// The verdict insert, the quorum evaluation, the decision status flip
    /// and (on approval) the award cascade all share one transaction, so a
    /// reader never observes a resolved quorum with an unawarded tender.
    pub async fn record_approval(
        &self,
        decision_id: &DecisionId,
        approver_id: &str,
        verdict: Verdict,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalResult> {
        let mut tx = self.pool().begin().await?;

        let status_row = sqlx::query("SELECT status, tender_id, proposed_winner_id FROM decisions WHERE id = ?")
            .bind(decision_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("decision {}", decision_id)))?;
        let status: DecisionStatus =
            parse_enum("decision status", status_row.get::<String, _>("status").as_str())?;
        if status != DecisionStatus::Pending {
            tx.rollback().await?;
            return Ok(ApprovalResult::AlreadyResolved { status });
        }

        let already = sqlx::query("SELECT 1 FROM approvals WHERE decision_id = ? AND approver_id = ?")
            .bind(decision_id.as_str())
            .bind(approver_id)
            .fetch_optional(&mut *tx)
            .await?;
        if already.is_some() {
            tx.rollback().await?;
            return Ok(ApprovalResult::Duplicate);
        }

        sqlx::query(
            "INSERT INTO approvals (decision_id, approver_id, verdict, comment, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(decision_id.as_str())
        .bind(approver_id)
        .bind(verdict.as_str())
        .bind(comment)
        .bind(ts_str(now))
        .execute(&mut *tx)
        .await?;

        // Re-read committee and verdicts inside the transaction and let the
        // protocol quorum rule decide the outcome.
        let committee: Vec<String> =
            sqlx::query("SELECT approver_id FROM decision_committee WHERE decision_id = ?")
                .bind(decision_id.as_str())
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|r| r.get::<String, _>(0))
                .collect();
        let vote_rows = sqlx::query(
            "SELECT approver_id, verdict, comment, created_at FROM approvals WHERE decision_id = ?",
        )
        .bind(decision_id.as_str())
        .fetch_all(&mut *tx)
        .await?;
        let mut approvals = Vec::with_capacity(vote_rows.len());
        for row in &vote_rows {
            approvals.push(Approval {
                approver_id: row.get("approver_id"),
                verdict: parse_enum("verdict", row.get::<String, _>("verdict").as_str())?,
                comment: row.get("comment"),
                created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
            });
        }

        let probe = Decision {
            id: decision_id.clone(),
            tender_id: TenderId::parse(&status_row.get::<String, _>("tender_id"))
                .map_err(|e| DbError::type_conversion(e.to_string()))?,
            proposed_winner_id: SubmissionId::parse(
                &status_row.get::<String, _>("proposed_winner_id"),
            )
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
            status: DecisionStatus::Pending,
            proposed_by: String::new(),
            deviation_note: None,
            committee,
            approvals,
            created_at: now,
        };
        let outcome = probe.quorum_outcome();

        if outcome == DecisionStatus::Pending {
            tx.commit().await?;
            return Ok(ApprovalResult::Recorded {
                status: DecisionStatus::Pending,
                resolved_now: false,
            });
        }

        let flipped = sqlx::query("UPDATE decisions SET status = ? WHERE id = ? AND status = 'pending'")
            .bind(outcome.as_str())
            .bind(decision_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if flipped == 0 {
            tx.rollback().await?;
            return Ok(ApprovalResult::AlreadyResolved { status });
        }

        if outcome == DecisionStatus::Approved {
            let awarded = award_cascade(
                &mut tx,
                &probe.tender_id,
                &probe.proposed_winner_id,
                approver_id,
                now,
            )
            .await?;
            if !awarded {
                tx.rollback().await?;
                return Ok(ApprovalResult::TenderConflict);
            }
        }

        tx.commit().await?;
        info!(
            decision_id = %decision_id,
            approver_id,
            verdict = %verdict,
            outcome = %outcome,
            "Quorum resolved"
        );
        Ok(ApprovalResult::Recorded {
            status: outcome,
            resolved_now: true,
        })
    }

    async fn decision_committee(&self, id: &DecisionId) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT approver_id FROM decision_committee WHERE decision_id = ? ORDER BY approver_id ASC",
        )
        .bind(id.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn decision_approvals(&self, id: &DecisionId) -> Result<Vec<Approval>> {
        let rows = sqlx::query(
            "SELECT approver_id, verdict, comment, created_at FROM approvals
             WHERE decision_id = ? ORDER BY created_at ASC, approver_id ASC",
        )
        .bind(id.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Approval {
                    approver_id: row.get("approver_id"),
                    verdict: parse_enum("verdict", row.get::<String, _>("verdict").as_str())?,
                    comment: row.get("comment"),
                    created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenderflow_protocol::{Criterion, SubmissionPayload, TenderDraft, TenderStatus};

    struct Fixture {
        tender: tenderflow_protocol::Tender,
        winner: tenderflow_protocol::Submission,
        runner_up: tenderflow_protocol::Submission,
    }

    /// Tender in `closed` with two submissions, ready for an award proposal.
    async fn closed_tender(db: &TenderDb, approvers: &[&str]) -> Fixture {
        let draft = TenderDraft {
            title: "Fleet renewal".to_string(),
            description: String::new(),
            budget: 500_000.0,
            deadline: Utc::now() + Duration::days(1),
            dispute_window_days: 7,
            criteria: vec![Criterion::new("quality", 100)],
            evaluators: vec!["eval-1".to_string()],
            approvers: approvers.iter().map(|s| s.to_string()).collect(),
        };
        let tender = db.create_tender(&draft, "pm-1", Utc::now()).await.unwrap();

        let payload = |p: &str| SubmissionPayload {
            proposal: p.to_string(),
            proposed_budget: 400_000.0,
            attachments: vec![],
        };
        db.transition_tender(&tender.id, TenderStatus::Draft, TenderStatus::Open, "pm-1", None, Utc::now())
            .await
            .unwrap();
        let winner = db
            .upsert_submission(&tender.id, "vendor-a", &payload("a"), Utc::now())
            .await
            .unwrap();
        let runner_up = db
            .upsert_submission(&tender.id, "vendor-b", &payload("b"), Utc::now())
            .await
            .unwrap();
        db.transition_tender(&tender.id, TenderStatus::Open, TenderStatus::Closed, "pm-1", None, Utc::now())
            .await
            .unwrap();

        Fixture { tender, winner, runner_up }
    }

    #[tokio::test]
    async fn test_unanimous_approval_awards_tender() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let fx = closed_tender(&db, &["appr-1", "appr-2"]).await;

        let decision = db
            .create_decision(&fx.tender.id, &fx.winner.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();

        let first = db
            .record_approval(&decision.id, "appr-1", Verdict::Approve, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            first,
            ApprovalResult::Recorded { status: DecisionStatus::Pending, resolved_now: false }
        );

        let second = db
            .record_approval(&decision.id, "appr-2", Verdict::Approve, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            second,
            ApprovalResult::Recorded { status: DecisionStatus::Approved, resolved_now: true }
        );

        let tender = db.get_tender(&fx.tender.id).await.unwrap().unwrap();
        assert_eq!(tender.status, TenderStatus::Awarded);
        assert_eq!(tender.winning_submission_id, Some(fx.winner.id.clone()));
        assert!(tender.awarded_at.is_some());

        let winner = db.get_submission(&fx.winner.id).await.unwrap().unwrap();
        assert_eq!(winner.status, tenderflow_protocol::SubmissionStatus::Awarded);
        let loser = db.get_submission(&fx.runner_up.id).await.unwrap().unwrap();
        assert_eq!(loser.status, tenderflow_protocol::SubmissionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_single_veto_rejects_immediately() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let fx = closed_tender(&db, &["appr-1", "appr-2", "appr-3"]).await;

        let decision = db
            .create_decision(&fx.tender.id, &fx.winner.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();

        db.record_approval(&decision.id, "appr-1", Verdict::Approve, None, Utc::now())
            .await
            .unwrap();
        let veto = db
            .record_approval(&decision.id, "appr-2", Verdict::Reject, Some("budget overrun"), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            veto,
            ApprovalResult::Recorded { status: DecisionStatus::Rejected, resolved_now: true }
        );

        // Tender stays closed, no award happened
        let tender = db.get_tender(&fx.tender.id).await.unwrap().unwrap();
        assert_eq!(tender.status, TenderStatus::Closed);
        assert!(tender.winning_submission_id.is_none());

        // Late vote bounces off the resolved decision
        let late = db
            .record_approval(&decision.id, "appr-3", Verdict::Approve, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(late, ApprovalResult::AlreadyResolved { status: DecisionStatus::Rejected });
    }

    #[tokio::test]
    async fn test_one_pending_decision_per_tender() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let fx = closed_tender(&db, &["appr-1"]).await;

        db.create_decision(&fx.tender.id, &fx.winner.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();

        // Second proposal bounces off the partial unique index
        let err = db
            .create_decision(&fx.tender.id, &fx.runner_up.id, "pm-2", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));

        let decisions = db.decisions_for_tender(&fx.tender.id).await.unwrap();
        assert_eq!(decisions.len(), 1);
    }

    #[tokio::test]
    async fn test_resolved_decision_frees_the_tender_for_a_new_proposal() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let fx = closed_tender(&db, &["appr-1"]).await;

        let first = db
            .create_decision(&fx.tender.id, &fx.winner.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();
        db.record_approval(&first.id, "appr-1", Verdict::Reject, None, Utc::now())
            .await
            .unwrap();

        // The index only covers pending rows, so a fresh proposal fits
        let second = db
            .create_decision(&fx.tender.id, &fx.runner_up.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();
        assert_eq!(second.status, DecisionStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_verdict_not_recorded() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let fx = closed_tender(&db, &["appr-1", "appr-2"]).await;

        let decision = db
            .create_decision(&fx.tender.id, &fx.winner.id, "pm-1", None, &fx.tender.approvers, Utc::now())
            .await
            .unwrap();

        db.record_approval(&decision.id, "appr-1", Verdict::Approve, None, Utc::now())
            .await
            .unwrap();
        // Flipping the vote is not allowed either
        let dup = db
            .record_approval(&decision.id, "appr-1", Verdict::Reject, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(dup, ApprovalResult::Duplicate);

        let fetched = db.get_decision(&decision.id).await.unwrap().unwrap();
        assert_eq!(fetched.approvals.len(), 1);
        assert_eq!(fetched.approvals[0].verdict, Verdict::Approve);
        assert_eq!(fetched.status, DecisionStatus::Pending);
    }
}

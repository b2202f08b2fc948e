//! Tender aggregate operations: creation, reads, and CAS-guarded lifecycle
//! transitions with their cascades.

use crate::error::{DbError, Result};
use crate::row::{parse_enum, parse_opt_ts, parse_ts, ts_str};
use crate::TenderDb;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tenderflow_ids::{CriterionId, SubmissionId, TenderId};
use tenderflow_protocol::{Criterion, StatusTransition, Tender, TenderDraft, TenderStatus};
use tracing::info;

impl TenderDb {
    /// Create a tender in `draft` with its criteria and assignment sets,
    /// all in one transaction.
    pub async fn create_tender(
        &self,
        draft: &TenderDraft,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Tender> {
        let id = TenderId::new();
        let now_s = ts_str(now);

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tenders
                (id, title, description, status, budget, deadline,
                 dispute_window_days, created_by, created_at, updated_at)
            VALUES (?, ?, ?, 'draft', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.budget)
        .bind(ts_str(draft.deadline))
        .bind(i64::from(draft.dispute_window_days))
        .bind(created_by)
        .bind(&now_s)
        .bind(&now_s)
        .execute(&mut *tx)
        .await?;

        for (position, criterion) in draft.criteria.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO criteria (id, tender_id, name, weight, min_value, max_value, position)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(criterion.id.as_str())
            .bind(id.as_str())
            .bind(&criterion.name)
            .bind(i64::from(criterion.weight))
            .bind(criterion.min_value)
            .bind(criterion.max_value)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        for evaluator in &draft.evaluators {
            sqlx::query("INSERT INTO tender_evaluators (tender_id, evaluator_id) VALUES (?, ?)")
                .bind(id.as_str())
                .bind(evaluator)
                .execute(&mut *tx)
                .await?;
        }
        for approver in &draft.approvers {
            sqlx::query("INSERT INTO tender_approvers (tender_id, approver_id) VALUES (?, ?)")
                .bind(id.as_str())
                .bind(approver)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(tender_id = %id, title = %draft.title, "Tender created");

        self.get_tender(&id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("tender {} after insert", id)))
    }

    /// Fetch a tender with its criteria and assignment sets.
    pub async fn get_tender(&self, id: &TenderId) -> Result<Option<Tender>> {
        let row = sqlx::query("SELECT * FROM tenders WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let criteria = self.criteria_for(id).await?;
        let evaluators = self.assignment_set(id, "tender_evaluators", "evaluator_id").await?;
        let approvers = self.assignment_set(id, "tender_approvers", "approver_id").await?;

        Ok(Some(row_to_tender(&row, criteria, evaluators, approvers)?))
    }

    /// List tenders, optionally filtered by status, newest first.
    pub async fn list_tenders(&self, status: Option<TenderStatus>) -> Result<Vec<Tender>> {
        let rows = match status {
            Some(s) => {
                sqlx::query("SELECT * FROM tenders WHERE status = ? ORDER BY created_at DESC")
                    .bind(s.as_str())
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tenders ORDER BY created_at DESC")
                    .fetch_all(self.pool())
                    .await?
            }
        };

        let mut tenders = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let id = TenderId::parse(&id)
                .map_err(|e| DbError::type_conversion(e.to_string()))?;
            let criteria = self.criteria_for(&id).await?;
            let evaluators = self.assignment_set(&id, "tender_evaluators", "evaluator_id").await?;
            let approvers = self.assignment_set(&id, "tender_approvers", "approver_id").await?;
            tenders.push(row_to_tender(row, criteria, evaluators, approvers)?);
        }
        Ok(tenders)
    }

    async fn criteria_for(&self, tender_id: &TenderId) -> Result<Vec<Criterion>> {
        let rows = sqlx::query(
            "SELECT id, name, weight, min_value, max_value FROM criteria
             WHERE tender_id = ? ORDER BY position ASC",
        )
        .bind(tender_id.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                Ok(Criterion {
                    id: CriterionId::parse(&id)
                        .map_err(|e| DbError::type_conversion(e.to_string()))?,
                    name: row.get("name"),
                    weight: row.get::<i64, _>("weight") as u32,
                    min_value: row.get("min_value"),
                    max_value: row.get("max_value"),
                })
            })
            .collect()
    }

    async fn assignment_set(
        &self,
        tender_id: &TenderId,
        table: &str,
        column: &str,
    ) -> Result<Vec<String>> {
        // Table/column names are compile-time constants from this module only.
        let sql = format!(
            "SELECT {column} FROM {table} WHERE tender_id = ? ORDER BY {column} ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tender_id.as_str())
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// CAS a tender from `expected` to `to`, recording the audit entry.
    ///
    /// Returns false when the tender was no longer in `expected` (someone
    /// else transitioned it first); the caller re-reads for the precise
    /// conflict.
    pub async fn transition_tender(
        &self,
        id: &TenderId,
        expected: TenderStatus,
        to: TenderStatus,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await?;
        let moved = cas_tender_status(&mut tx, id, expected, to, actor, reason, now).await?;
        tx.commit().await?;

        if moved {
            info!(tender_id = %id, from = %expected, to = %to, "Tender transitioned");
        }
        Ok(moved)
    }

    /// CAS to `cancelled` and reject every non-terminal submission, in one
    /// transaction. The per-submission update is idempotent, so a retried
    /// cancellation converges.
    pub async fn cancel_tender(
        &self,
        id: &TenderId,
        expected: TenderStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let moved = cas_tender_status(
            &mut tx,
            id,
            expected,
            TenderStatus::Cancelled,
            actor,
            Some("tender cancelled"),
            now,
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'rejected', rejection_reason = 'tender cancelled', updated_at = ?
            WHERE tender_id = ? AND status NOT IN ('rejected', 'awarded')
            "#,
        )
        .bind(ts_str(now))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(tender_id = %id, "Tender cancelled, submissions rejected");
        Ok(true)
    }

    /// Lifecycle audit trail, oldest first.
    pub async fn transition_history(&self, id: &TenderId) -> Result<Vec<StatusTransition>> {
        let rows = sqlx::query(
            "SELECT from_status, to_status, actor, reason, created_at
             FROM tender_transitions WHERE tender_id = ? ORDER BY id ASC",
        )
        .bind(id.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StatusTransition {
                    from: parse_enum("tender status", row.get::<String, _>("from_status").as_str())?,
                    to: parse_enum("tender status", row.get::<String, _>("to_status").as_str())?,
                    actor: row.get("actor"),
                    reason: row.get("reason"),
                    at: parse_ts(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }
}

/// CAS the tender status inside an open transaction and append the audit row.
pub(crate) async fn cas_tender_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &TenderId,
    expected: TenderStatus,
    to: TenderStatus,
    actor: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows_affected = sqlx::query(
        "UPDATE tenders SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(ts_str(now))
    .bind(id.as_str())
    .bind(expected.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO tender_transitions (tender_id, from_status, to_status, actor, reason, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.as_str())
    .bind(expected.as_str())
    .bind(to.as_str())
    .bind(actor)
    .bind(reason)
    .bind(ts_str(now))
    .execute(&mut **tx)
    .await?;

    Ok(true)
}

/// Award cascade inside an open transaction: tender closed -> awarded with
/// `awarded_at` set once, winner -> awarded, siblings -> rejected.
pub(crate) async fn award_cascade(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    tender_id: &TenderId,
    winner_id: &SubmissionId,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let moved = cas_tender_status(
        tx,
        tender_id,
        TenderStatus::Closed,
        TenderStatus::Awarded,
        actor,
        Some("award approved"),
        now,
    )
    .await?;
    if !moved {
        return Ok(false);
    }

    sqlx::query("UPDATE tenders SET winning_submission_id = ?, awarded_at = ? WHERE id = ?")
        .bind(winner_id.as_str())
        .bind(ts_str(now))
        .bind(tender_id.as_str())
        .execute(&mut **tx)
        .await?;

    sqlx::query("UPDATE submissions SET status = 'awarded', updated_at = ? WHERE id = ?")
        .bind(ts_str(now))
        .bind(winner_id.as_str())
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE submissions
        SET status = 'rejected', rejection_reason = 'not selected', updated_at = ?
        WHERE tender_id = ? AND id != ? AND status NOT IN ('rejected', 'awarded')
        "#,
    )
    .bind(ts_str(now))
    .bind(tender_id.as_str())
    .bind(winner_id.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(true)
}

fn row_to_tender(
    row: &SqliteRow,
    criteria: Vec<Criterion>,
    evaluators: Vec<String>,
    approvers: Vec<String>,
) -> Result<Tender> {
    let id: String = row.get("id");
    let winning: Option<String> = row.get("winning_submission_id");

    Ok(Tender {
        id: TenderId::parse(&id).map_err(|e| DbError::type_conversion(e.to_string()))?,
        title: row.get("title"),
        description: row.get("description"),
        status: parse_enum("tender status", row.get::<String, _>("status").as_str())?,
        budget: row.get("budget"),
        deadline: parse_ts(row.get::<String, _>("deadline").as_str())?,
        dispute_window_days: row.get::<i64, _>("dispute_window_days") as u32,
        criteria,
        evaluators,
        approvers,
        winning_submission_id: winning
            .as_deref()
            .map(SubmissionId::parse)
            .transpose()
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
        awarded_at: parse_opt_ts(row.get("awarded_at"))?,
        created_by: row.get("created_by"),
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_draft() -> TenderDraft {
        TenderDraft {
            title: "Bridge maintenance".to_string(),
            description: "Annual inspection and repairs".to_string(),
            budget: 250_000.0,
            deadline: Utc::now() + Duration::days(14),
            dispute_window_days: 7,
            criteria: vec![
                Criterion::new("technical", 60),
                Criterion::new("cost", 40),
            ],
            evaluators: vec!["eval-1".to_string(), "eval-2".to_string()],
            approvers: vec!["appr-1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_and_get_tender() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let tender = db
            .create_tender(&sample_draft(), "pm-1", Utc::now())
            .await
            .unwrap();

        assert_eq!(tender.status, TenderStatus::Draft);
        assert_eq!(tender.criteria.len(), 2);
        assert_eq!(tender.criteria[0].name, "technical");
        assert_eq!(tender.evaluators, vec!["eval-1", "eval-2"]);
        assert_eq!(tender.weight_sum(), 100);

        let fetched = db.get_tender(&tender.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Bridge maintenance");
    }

    #[tokio::test]
    async fn test_transition_cas_single_winner() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let tender = db
            .create_tender(&sample_draft(), "pm-1", Utc::now())
            .await
            .unwrap();

        let first = db
            .transition_tender(
                &tender.id,
                TenderStatus::Draft,
                TenderStatus::Open,
                "pm-1",
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(first);

        // Second caller with the stale expectation loses
        let second = db
            .transition_tender(
                &tender.id,
                TenderStatus::Draft,
                TenderStatus::Open,
                "pm-2",
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(!second);

        let history = db.transition_history(&tender.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to, TenderStatus::Open);
    }

    #[tokio::test]
    async fn test_list_tenders_by_status() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let a = db
            .create_tender(&sample_draft(), "pm-1", Utc::now())
            .await
            .unwrap();
        let _b = db
            .create_tender(&sample_draft(), "pm-1", Utc::now())
            .await
            .unwrap();

        db.transition_tender(
            &a.id,
            TenderStatus::Draft,
            TenderStatus::Open,
            "pm-1",
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        let open = db.list_tenders(Some(TenderStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, a.id);

        let all = db.list_tenders(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}

//! Submission and score storage.
//!
//! One submission row per (tender, vendor); amendments overwrite in place.
//! Scores are upserts keyed on (submission, evaluator, criterion) - repeat
//! writes replace, never accumulate.

use crate::error::{DbError, Result};
use crate::row::{parse_enum, parse_ts, ts_str};
use crate::TenderDb;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tenderflow_ids::{CriterionId, SubmissionId, TenderId};
use tenderflow_protocol::{FileRef, Score, Submission, SubmissionPayload};
use tracing::info;

impl TenderDb {
    /// Insert or amend the vendor's submission. The original id and
    /// submitted_at survive an amendment; the payload is replaced wholesale.
    pub async fn upsert_submission(
        &self,
        tender_id: &TenderId,
        vendor_id: &str,
        payload: &SubmissionPayload,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let attachments_json = serde_json::to_string(&payload.attachments)?;
        let id = SubmissionId::new();
        let now_s = ts_str(now);

        sqlx::query(
            r#"
            INSERT INTO submissions
                (id, tender_id, vendor_id, proposal, proposed_budget, status,
                 attachments_json, submitted_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            ON CONFLICT(tender_id, vendor_id) DO UPDATE SET
                proposal = excluded.proposal,
                proposed_budget = excluded.proposed_budget,
                attachments_json = excluded.attachments_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(tender_id.as_str())
        .bind(vendor_id)
        .bind(&payload.proposal)
        .bind(payload.proposed_budget)
        .bind(&attachments_json)
        .bind(&now_s)
        .bind(&now_s)
        .execute(self.pool())
        .await?;

        let submission = self
            .get_submission_by_vendor(tender_id, vendor_id)
            .await?
            .ok_or_else(|| {
                DbError::not_found(format!("submission for vendor {} after upsert", vendor_id))
            })?;

        info!(
            submission_id = %submission.id,
            tender_id = %tender_id,
            vendor_id,
            "Submission recorded"
        );
        Ok(submission)
    }

    pub async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let row = sqlx::query("SELECT * FROM submissions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_submission).transpose()
    }

    pub async fn get_submission_by_vendor(
        &self,
        tender_id: &TenderId,
        vendor_id: &str,
    ) -> Result<Option<Submission>> {
        let row = sqlx::query("SELECT * FROM submissions WHERE tender_id = ? AND vendor_id = ?")
            .bind(tender_id.as_str())
            .bind(vendor_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_submission).transpose()
    }

    /// Submissions for a tender in intake order.
    pub async fn list_submissions(&self, tender_id: &TenderId) -> Result<Vec<Submission>> {
        let rows = sqlx::query(
            "SELECT * FROM submissions WHERE tender_id = ? ORDER BY submitted_at ASC, id ASC",
        )
        .bind(tender_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_submission).collect()
    }

    /// Upsert one evaluator's score for one criterion. Idempotent: a repeat
    /// call with identical values leaves a single identical row.
    pub async fn upsert_score(&self, score: &Score, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scores (submission_id, evaluator_id, criterion_id, value, comment, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(submission_id, evaluator_id, criterion_id) DO UPDATE SET
                value = excluded.value,
                comment = excluded.comment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(score.submission_id.as_str())
        .bind(&score.evaluator_id)
        .bind(score.criterion_id.as_str())
        .bind(score.value)
        .bind(&score.comment)
        .bind(ts_str(now))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn scores_for_submission(&self, submission_id: &SubmissionId) -> Result<Vec<Score>> {
        let rows = sqlx::query(
            "SELECT submission_id, evaluator_id, criterion_id, value, comment
             FROM scores WHERE submission_id = ?",
        )
        .bind(submission_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_score).collect()
    }
}

fn row_to_submission(row: &SqliteRow) -> Result<Submission> {
    let id: String = row.get("id");
    let tender_id: String = row.get("tender_id");
    let attachments_json: String = row.get("attachments_json");
    let attachments: Vec<FileRef> = serde_json::from_str(&attachments_json)?;

    Ok(Submission {
        id: SubmissionId::parse(&id).map_err(|e| DbError::type_conversion(e.to_string()))?,
        tender_id: TenderId::parse(&tender_id)
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
        vendor_id: row.get("vendor_id"),
        proposal: row.get("proposal"),
        proposed_budget: row.get("proposed_budget"),
        status: parse_enum("submission status", row.get::<String, _>("status").as_str())?,
        attachments,
        submitted_at: parse_ts(row.get::<String, _>("submitted_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}

fn row_to_score(row: &SqliteRow) -> Result<Score> {
    let submission_id: String = row.get("submission_id");
    let criterion_id: String = row.get("criterion_id");
    Ok(Score {
        submission_id: SubmissionId::parse(&submission_id)
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
        evaluator_id: row.get("evaluator_id"),
        criterion_id: CriterionId::parse(&criterion_id)
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
        value: row.get("value"),
        comment: row.get("comment"),
    })
}

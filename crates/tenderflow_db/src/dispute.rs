//! Dispute storage. Status moves are CAS-guarded the same way tender
//! transitions are; window enforcement lives in the engine.

use crate::error::{DbError, Result};
use crate::row::{parse_enum, parse_opt_ts, parse_ts, ts_str};
use crate::TenderDb;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tenderflow_ids::{DisputeId, TenderId};
use tenderflow_protocol::{Dispute, DisputeStatus, FileRef};
use tracing::info;

impl TenderDb {
    pub async fn create_dispute(
        &self,
        tender_id: &TenderId,
        raised_by_vendor_id: &str,
        reason: &str,
        evidence: &[FileRef],
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        let id = DisputeId::new();
        let evidence_json = serde_json::to_string(evidence)?;

        sqlx::query(
            r#"
            INSERT INTO disputes
                (id, tender_id, raised_by_vendor_id, reason, evidence_json, status, filed_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(id.as_str())
        .bind(tender_id.as_str())
        .bind(raised_by_vendor_id)
        .bind(reason)
        .bind(&evidence_json)
        .bind(ts_str(now))
        .execute(self.pool())
        .await?;

        info!(dispute_id = %id, tender_id = %tender_id, vendor = raised_by_vendor_id, "Dispute filed");

        self.get_dispute(&id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("dispute {} after insert", id)))
    }

    pub async fn get_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>> {
        let row = sqlx::query("SELECT * FROM disputes WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_dispute).transpose()
    }

    pub async fn disputes_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Dispute>> {
        let rows = sqlx::query(
            "SELECT * FROM disputes WHERE tender_id = ? ORDER BY filed_at ASC, id ASC",
        )
        .bind(tender_id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_dispute).collect()
    }

    /// CAS pending -> investigating.
    pub async fn begin_investigation(&self, id: &DisputeId) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE disputes SET status = 'investigating' WHERE id = ? AND status = 'pending'",
        )
        .bind(id.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected > 0 {
            info!(dispute_id = %id, "Dispute under investigation");
        }
        Ok(rows_affected > 0)
    }

    /// CAS an open dispute (pending or investigating) to `resolved` or
    /// `dismissed`, recording who closed it and why.
    pub async fn close_dispute(
        &self,
        id: &DisputeId,
        outcome: DisputeStatus,
        resolution: &str,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !matches!(outcome, DisputeStatus::Resolved | DisputeStatus::Dismissed) {
            return Err(DbError::constraint(format!(
                "dispute can only close to resolved or dismissed, got {}",
                outcome
            )));
        }

        let rows_affected = sqlx::query(
            r#"
            UPDATE disputes
            SET status = ?, resolution = ?, resolved_by = ?, resolved_at = ?
            WHERE id = ? AND status IN ('pending', 'investigating')
            "#,
        )
        .bind(outcome.as_str())
        .bind(resolution)
        .bind(resolved_by)
        .bind(ts_str(now))
        .bind(id.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected > 0 {
            info!(dispute_id = %id, outcome = %outcome, "Dispute closed");
        }
        Ok(rows_affected > 0)
    }
}

fn row_to_dispute(row: &SqliteRow) -> Result<Dispute> {
    let id: String = row.get("id");
    let tender_id: String = row.get("tender_id");
    let evidence_json: String = row.get("evidence_json");
    let evidence: Vec<FileRef> = serde_json::from_str(&evidence_json)?;

    Ok(Dispute {
        id: DisputeId::parse(&id).map_err(|e| DbError::type_conversion(e.to_string()))?,
        tender_id: TenderId::parse(&tender_id)
            .map_err(|e| DbError::type_conversion(e.to_string()))?,
        raised_by_vendor_id: row.get("raised_by_vendor_id"),
        reason: row.get("reason"),
        evidence,
        status: parse_enum("dispute status", row.get::<String, _>("status").as_str())?,
        resolution: row.get("resolution"),
        resolved_by: row.get("resolved_by"),
        resolved_at: parse_opt_ts(row.get("resolved_at"))?,
        filed_at: parse_ts(row.get::<String, _>("filed_at").as_str())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenderflow_protocol::{Criterion, TenderDraft};

    async fn tender_id(db: &TenderDb) -> TenderId {
        let draft = TenderDraft {
            title: "Signage".to_string(),
            description: String::new(),
            budget: 10_000.0,
            deadline: Utc::now() + Duration::days(1),
            dispute_window_days: 3,
            criteria: vec![Criterion::new("quality", 100)],
            evaluators: vec!["eval-1".to_string()],
            approvers: vec!["appr-1".to_string()],
        };
        db.create_tender(&draft, "pm-1", Utc::now()).await.unwrap().id
    }

    #[tokio::test]
    async fn test_dispute_lifecycle() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let tid = tender_id(&db).await;

        let dispute = db
            .create_dispute(&tid, "vendor-b", "scoring looks inconsistent", &[], Utc::now())
            .await
            .unwrap();
        assert_eq!(dispute.status, DisputeStatus::Pending);

        assert!(db.begin_investigation(&dispute.id).await.unwrap());
        // Repeat is a no-op
        assert!(!db.begin_investigation(&dispute.id).await.unwrap());

        assert!(db
            .close_dispute(&dispute.id, DisputeStatus::Dismissed, "no irregularity found", "admin-1", Utc::now())
            .await
            .unwrap());

        let closed = db.get_dispute(&dispute.id).await.unwrap().unwrap();
        assert_eq!(closed.status, DisputeStatus::Dismissed);
        assert_eq!(closed.resolution.as_deref(), Some("no irregularity found"));
        assert_eq!(closed.resolved_by.as_deref(), Some("admin-1"));
        assert!(closed.resolved_at.is_some());

        // Closed disputes cannot be reopened or re-closed
        assert!(!db
            .close_dispute(&dispute.id, DisputeStatus::Resolved, "late change", "admin-1", Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_close_rejects_non_terminal_outcome() {
        let db = TenderDb::open_in_memory().await.unwrap();
        let tid = tender_id(&db).await;
        let dispute = db
            .create_dispute(&tid, "vendor-b", "reason", &[], Utc::now())
            .await
            .unwrap();

        let err = db
            .close_dispute(&dispute.id, DisputeStatus::Pending, "x", "admin-1", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }
}

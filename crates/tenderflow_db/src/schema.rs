//! Database schema creation for all Tenderflow tables.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::TenderDb;
use tracing::info;

impl TenderDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL for better concurrent access
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(self.pool())
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(self.pool())
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(self.pool())
            .await?;

        self.create_tender_tables().await?;
        self.create_submission_tables().await?;
        self.create_decision_tables().await?;
        self.create_dispute_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    async fn create_tender_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tenders (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft','open','closed','awarded','cancelled')),
                budget REAL NOT NULL,
                deadline TEXT NOT NULL,
                dispute_window_days INTEGER NOT NULL DEFAULT 0,
                winning_submission_id TEXT,
                awarded_at TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS criteria (
                id TEXT PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                name TEXT NOT NULL,
                weight INTEGER NOT NULL,
                min_value REAL NOT NULL DEFAULT 0,
                max_value REAL NOT NULL DEFAULT 5,
                position INTEGER NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tender_evaluators (
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                evaluator_id TEXT NOT NULL,
                UNIQUE(tender_id, evaluator_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tender_approvers (
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                approver_id TEXT NOT NULL,
                UNIQUE(tender_id, approver_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Append-only audit log of lifecycle transitions
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tender_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                actor TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tenders_status ON tenders(status)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_criteria_tender ON criteria(tender_id)")
            .execute(self.pool())
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transitions_tender ON tender_transitions(tender_id)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_submission_tables(&self) -> Result<()> {
        // One row per vendor per tender; amendments overwrite in place
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                vendor_id TEXT NOT NULL,
                proposal TEXT NOT NULL,
                proposed_budget REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending','approved','rejected','awarded')),
                rejection_reason TEXT,
                attachments_json TEXT NOT NULL DEFAULT '[]',
                submitted_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(tender_id, vendor_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        // One score per (submission, evaluator, criterion); upsert overwrites
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scores (
                submission_id TEXT NOT NULL REFERENCES submissions(id),
                evaluator_id TEXT NOT NULL,
                criterion_id TEXT NOT NULL REFERENCES criteria(id),
                value REAL NOT NULL,
                comment TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE(submission_id, evaluator_id, criterion_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_tender ON submissions(tender_id)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scores_submission ON scores(submission_id)")
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn create_decision_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                proposed_winner_id TEXT NOT NULL REFERENCES submissions(id),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending','approved','rejected')),
                proposed_by TEXT NOT NULL,
                deviation_note TEXT,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        // Committee snapshot taken at proposal time
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS decision_committee (
                decision_id TEXT NOT NULL REFERENCES decisions(id),
                approver_id TEXT NOT NULL,
                UNIQUE(decision_id, approver_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS approvals (
                decision_id TEXT NOT NULL REFERENCES decisions(id),
                approver_id TEXT NOT NULL,
                verdict TEXT NOT NULL CHECK (verdict IN ('approve','reject')),
                comment TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(decision_id, approver_id)
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_tender ON decisions(tender_id)")
            .execute(self.pool())
            .await?;

        // At most one open proposal per tender; concurrent proposers race on
        // this index instead of on a read-then-insert check
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_decisions_pending
             ON decisions(tender_id) WHERE status = 'pending'",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn create_dispute_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS disputes (
                id TEXT PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(id),
                raised_by_vendor_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                evidence_json TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending','investigating','resolved','dismissed')),
                resolution TEXT,
                resolved_by TEXT,
                resolved_at TEXT,
                filed_at TEXT NOT NULL
            )"#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_disputes_tender ON disputes(tender_id)")
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

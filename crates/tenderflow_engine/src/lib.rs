//! Tender evaluation and award workflow engine.
//!
//! [`TenderEngine`] composes the five workflow components over a single
//! [`TenderDb`]: lifecycle transitions, submission intake, score
//! aggregation, the award quorum and post-award disputes. Every operation
//! takes an already-authenticated [`Principal`] and enforces its role gate
//! here; identity verification itself lives outside this crate.
//!
//! Time-dependent operations come in pairs: the public method supplies
//! `Utc::now()`, the `*_at` variant takes an explicit instant so tests can
//! pin the clock. Deadlines and the dispute window are pure functions of
//! that instant; no timers run anywhere.

mod decision;
mod dispute;
mod evaluation;
mod intake;
mod lifecycle;

pub use evaluation::{evaluator_total, submission_average};
pub use tenderflow_protocol::EngineError;

use tenderflow_db::{DbError, TenderDb};
use tenderflow_ids::TenderId;
use tenderflow_protocol::{Principal, Role, Tender};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Workflow facade over a [`TenderDb`].
#[derive(Clone)]
pub struct TenderEngine {
    db: TenderDb,
}

impl TenderEngine {
    pub fn new(db: TenderDb) -> Self {
        Self { db }
    }

    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(TenderDb::open(path).await.map_err(store_err)?))
    }

    pub fn db(&self) -> &TenderDb {
        &self.db
    }

    /// Fetch a tender or fail with `NotFound`.
    pub(crate) async fn require_tender(&self, id: &TenderId) -> Result<Tender> {
        self.db
            .get_tender(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| EngineError::not_found(format!("tender {}", id)))
    }
}

/// Role gate shared by every operation.
pub(crate) fn require_role(principal: &Principal, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&principal.role) {
        return Ok(());
    }
    Err(EngineError::forbidden(format!(
        "role {} may not perform this operation",
        principal.role
    )))
}

/// Store errors keep their not-found identity; everything else is opaque.
pub(crate) fn store_err(err: DbError) -> EngineError {
    match err {
        DbError::NotFound(msg) => EngineError::NotFound(msg),
        other => EngineError::Store(other.to_string()),
    }
}

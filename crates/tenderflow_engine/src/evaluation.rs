//! Score recording and the ranking computation.
//!
//! Averages are recomputed from the score rows on every read; no cached
//! total exists anywhere. An evaluator contributes to a submission's
//! average only once they have scored every criterion.

use crate::{require_role, store_err, Result, TenderEngine};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tenderflow_ids::{CriterionId, SubmissionId, TenderId};
use tenderflow_protocol::{
    EngineError, Principal, RankedSubmission, Role, Score, Tender, TenderStatus,
};

impl TenderEngine {
    /// Record one evaluator's score for one criterion. Idempotent: repeat
    /// writes overwrite the previous value.
    pub async fn record_score(
        &self,
        principal: &Principal,
        submission_id: &SubmissionId,
        criterion_id: &CriterionId,
        value: f64,
        comment: Option<String>,
    ) -> Result<()> {
        self.record_score_at(principal, submission_id, criterion_id, value, comment, Utc::now())
            .await
    }

    pub async fn record_score_at(
        &self,
        principal: &Principal,
        submission_id: &SubmissionId,
        criterion_id: &CriterionId,
        value: f64,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        require_role(principal, &[Role::Evaluator])?;

        let submission = self.get_submission(submission_id).await?;
        let tender = self.require_tender(&submission.tender_id).await?;

        if tender.status != TenderStatus::Closed {
            return Err(EngineError::TenderNotClosed {
                current: tender.status,
            });
        }
        if !tender.has_evaluator(&principal.id) {
            return Err(EngineError::UnassignedEvaluator {
                evaluator_id: principal.id.clone(),
            });
        }
        let criterion = tender.criterion(criterion_id).ok_or_else(|| {
            EngineError::UnknownCriteria {
                criterion_id: criterion_id.to_string(),
            }
        })?;
        if !criterion.accepts(value) {
            return Err(EngineError::ScoreOutOfRange {
                value,
                min: criterion.min_value,
                max: criterion.max_value,
            });
        }

        let score = Score {
            submission_id: submission_id.clone(),
            evaluator_id: principal.id.clone(),
            criterion_id: criterion_id.clone(),
            value,
            comment,
        };
        self.db.upsert_score(&score, now).await.map_err(store_err)
    }

    /// Rank the tender's submissions by weighted average, descending. Ties
    /// break by earlier submission, then by id. Submissions no evaluator has
    /// fully scored are omitted.
    pub async fn get_ranking(&self, tender_id: &TenderId) -> Result<Vec<RankedSubmission>> {
        let tender = self.require_tender(tender_id).await?;
        let submissions = self.db.list_submissions(tender_id).await.map_err(store_err)?;

        let mut ranked = Vec::new();
        for submission in &submissions {
            let scores = self
                .db
                .scores_for_submission(&submission.id)
                .await
                .map_err(store_err)?;
            if let Some((average_score, evaluator_count)) = submission_average(&tender, &scores) {
                ranked.push(RankedSubmission {
                    submission_id: submission.id.clone(),
                    vendor_id: submission.vendor_id.clone(),
                    average_score,
                    evaluator_count,
                    submitted_at: submission.submitted_at,
                });
            }
        }

        ranked.sort_by(|a, b| {
            b.average_score
                .total_cmp(&a.average_score)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });
        Ok(ranked)
    }
}

/// Weighted mean of one evaluator's scores, defined only when they have
/// scored every criterion of the tender.
pub fn evaluator_total(tender: &Tender, scores: &[Score], evaluator_id: &str) -> Option<f64> {
    let weight_sum: u32 = tender.criteria.iter().map(|c| c.weight).sum();
    if weight_sum == 0 {
        return None;
    }

    let mut weighted = 0.0;
    for criterion in &tender.criteria {
        let score = scores
            .iter()
            .find(|s| s.evaluator_id == evaluator_id && s.criterion_id == criterion.id)?;
        weighted += score.value * f64::from(criterion.weight);
    }
    Some(weighted / f64::from(weight_sum))
}

/// Mean of the complete evaluator totals for one submission's scores, with
/// the count of contributing evaluators. `None` when no evaluator has a
/// complete set.
pub fn submission_average(tender: &Tender, scores: &[Score]) -> Option<(f64, usize)> {
    let evaluators: BTreeSet<&str> = scores.iter().map(|s| s.evaluator_id.as_str()).collect();

    let totals: Vec<f64> = evaluators
        .iter()
        .filter_map(|evaluator| evaluator_total(tender, scores, evaluator))
        .collect();
    if totals.is_empty() {
        return None;
    }
    Some((totals.iter().sum::<f64>() / totals.len() as f64, totals.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenderflow_db::TenderDb;
    use tenderflow_protocol::{Criterion, SubmissionPayload, TenderDraft};

    fn tender_with(criteria: Vec<Criterion>) -> Tender {
        Tender {
            id: TenderId::new(),
            title: "t".to_string(),
            description: String::new(),
            status: TenderStatus::Closed,
            budget: 1.0,
            deadline: Utc::now(),
            dispute_window_days: 7,
            criteria,
            evaluators: vec!["eval-1".to_string(), "eval-2".to_string()],
            approvers: vec![],
            winning_submission_id: None,
            awarded_at: None,
            created_by: "pm-1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn score(evaluator: &str, criterion: &CriterionId, value: f64) -> Score {
        Score {
            submission_id: SubmissionId::new(),
            evaluator_id: evaluator.to_string(),
            criterion_id: criterion.clone(),
            value,
            comment: None,
        }
    }

    #[test]
    fn test_weighted_mean() {
        // technical 60 / cost 40, scores 4 and 3 -> 3.6
        let tender = tender_with(vec![
            Criterion::new("technical", 60),
            Criterion::new("cost", 40),
        ]);
        let technical = tender.criteria[0].id.clone();
        let cost = tender.criteria[1].id.clone();
        let scores = vec![score("eval-1", &technical, 4.0), score("eval-1", &cost, 3.0)];

        let total = evaluator_total(&tender, &scores, "eval-1").unwrap();
        assert!((total - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_evaluator_has_no_total() {
        let tender = tender_with(vec![
            Criterion::new("technical", 60),
            Criterion::new("cost", 40),
        ]);
        let technical = tender.criteria[0].id.clone();
        let scores = vec![score("eval-1", &technical, 4.0)];

        assert!(evaluator_total(&tender, &scores, "eval-1").is_none());
        assert!(submission_average(&tender, &scores).is_none());
    }

    #[test]
    fn test_average_ignores_incomplete_evaluators() {
        let tender = tender_with(vec![
            Criterion::new("technical", 60),
            Criterion::new("cost", 40),
        ]);
        let technical = tender.criteria[0].id.clone();
        let cost = tender.criteria[1].id.clone();

        let scores = vec![
            score("eval-1", &technical, 4.0),
            score("eval-1", &cost, 3.0),
            // eval-2 only scored one criterion
            score("eval-2", &technical, 5.0),
        ];
        let (average, count) = submission_average(&tender, &scores).unwrap();
        assert!((average - 3.6).abs() < 1e-9);
        assert_eq!(count, 1);
    }

    async fn closed_with_submission(
        engine: &TenderEngine,
    ) -> (Tender, tenderflow_protocol::Submission) {
        let pm = Principal::new("pm-1", Role::Procurement);
        let vendor = Principal::new("vendor-a", Role::Vendor);
        let draft = TenderDraft {
            title: "IT support".to_string(),
            description: String::new(),
            budget: 100_000.0,
            deadline: Utc::now() + Duration::days(1),
            dispute_window_days: 7,
            criteria: vec![Criterion::new("quality", 100)],
            evaluators: vec!["eval-1".to_string()],
            approvers: vec!["appr-1".to_string()],
        };
        let tender = engine.create_tender(&pm, &draft).await.unwrap();
        engine.publish_tender(&pm, &tender.id).await.unwrap();
        let submission = engine
            .submit_proposal(
                &vendor,
                &tender.id,
                &SubmissionPayload {
                    proposal: "offer".to_string(),
                    proposed_budget: 90_000.0,
                    attachments: vec![],
                },
            )
            .await
            .unwrap();
        let tender = engine.close_tender(&pm, &tender.id).await.unwrap();
        (tender, submission)
    }

    #[tokio::test]
    async fn test_out_of_range_score_rejected_not_clamped() {
        let engine = TenderEngine::new(TenderDb::open_in_memory().await.unwrap());
        let (tender, submission) = closed_with_submission(&engine).await;
        let evaluator = Principal::new("eval-1", Role::Evaluator);
        let criterion = tender.criteria[0].id.clone();

        let err = engine
            .record_score(&evaluator, &submission.id, &criterion, 5.5, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ScoreOutOfRange { min, max, .. } if min == 0.0 && max == 5.0
        ));

        // Nothing was stored
        let ranking = engine.get_ranking(&tender.id).await.unwrap();
        assert!(ranking.is_empty());
    }

    #[tokio::test]
    async fn test_unassigned_evaluator_rejected() {
        let engine = TenderEngine::new(TenderDb::open_in_memory().await.unwrap());
        let (tender, submission) = closed_with_submission(&engine).await;
        let outsider = Principal::new("eval-9", Role::Evaluator);
        let criterion = tender.criteria[0].id.clone();

        let err = engine
            .record_score(&outsider, &submission.id, &criterion, 4.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnassignedEvaluator { .. }));
    }

    #[tokio::test]
    async fn test_repeat_score_overwrites_and_ranking_updates() {
        let engine = TenderEngine::new(TenderDb::open_in_memory().await.unwrap());
        let (tender, submission) = closed_with_submission(&engine).await;
        let evaluator = Principal::new("eval-1", Role::Evaluator);
        let criterion = tender.criteria[0].id.clone();

        engine
            .record_score(&evaluator, &submission.id, &criterion, 3.0, None)
            .await
            .unwrap();
        engine
            .record_score(&evaluator, &submission.id, &criterion, 4.5, None)
            .await
            .unwrap();

        let ranking = engine.get_ranking(&tender.id).await.unwrap();
        assert_eq!(ranking.len(), 1);
        assert!((ranking[0].average_score - 4.5).abs() < 1e-9);
        assert_eq!(ranking[0].evaluator_count, 1);
    }
}

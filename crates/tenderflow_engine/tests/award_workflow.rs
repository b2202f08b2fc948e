//! Full workflow integration test: create, publish, submit, close, score,
//! rank, propose, approve, award cascade, and the dispute that follows.

use chrono::{DateTime, Duration, Utc};
use tenderflow_db::TenderDb;
use tenderflow_engine::TenderEngine;
use tenderflow_protocol::{
    Criterion, DecisionStatus, DisputeStatus, Principal, Role, SubmissionPayload,
    SubmissionStatus, TenderDraft, TenderStatus, Verdict,
};

fn pm() -> Principal {
    Principal::new("pm-1", Role::Procurement)
}

fn payload(proposal: &str, budget: f64) -> SubmissionPayload {
    SubmissionPayload {
        proposal: proposal.to_string(),
        proposed_budget: budget,
        attachments: vec![],
    }
}

#[tokio::test]
async fn test_full_award_workflow() {
    let engine = TenderEngine::new(TenderDb::open_in_memory().await.unwrap());
    let t0: DateTime<Utc> = Utc::now();

    // Create and publish a tender with weighted criteria
    let draft = TenderDraft {
        title: "Municipal broadband rollout".to_string(),
        description: "Fibre to 12 districts".to_string(),
        budget: 4_000_000.0,
        deadline: t0 + Duration::days(14),
        dispute_window_days: 7,
        criteria: vec![
            Criterion::new("technical", 60),
            Criterion::new("cost", 40),
        ],
        evaluators: vec!["eval-1".to_string(), "eval-2".to_string()],
        approvers: vec!["appr-1".to_string(), "appr-2".to_string()],
    };
    let tender = engine.create_tender_at(&pm(), &draft, t0).await.unwrap();
    let tender = engine.publish_tender_at(&pm(), &tender.id, t0).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Open);

    // Two vendors bid before the deadline; vendor-a amends once
    let vendor_a = Principal::new("vendor-a", Role::Vendor);
    let vendor_b = Principal::new("vendor-b", Role::Vendor);
    engine
        .submit_proposal_at(&vendor_a, &tender.id, &payload("draft offer", 3_900_000.0), t0 + Duration::days(1))
        .await
        .unwrap();
    let sub_a = engine
        .submit_proposal_at(&vendor_a, &tender.id, &payload("final offer", 3_600_000.0), t0 + Duration::days(2))
        .await
        .unwrap();
    let sub_b = engine
        .submit_proposal_at(&vendor_b, &tender.id, &payload("competing offer", 3_700_000.0), t0 + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(sub_a.proposed_budget, 3_600_000.0);

    // Close at the deadline; scoring opens
    let closed_at = t0 + Duration::days(14);
    let tender = engine.close_tender_at(&pm(), &tender.id, closed_at).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Closed);

    // A second close loses the CAS
    let conflict = engine.close_tender_at(&pm(), &tender.id, closed_at).await;
    assert!(matches!(
        conflict,
        Err(tenderflow_engine::EngineError::TenderNotOpen {
            current: TenderStatus::Closed
        })
    ));

    // Both evaluators score both submissions on both criteria
    let technical = tender.criteria[0].id.clone();
    let cost = tender.criteria[1].id.clone();
    let eval_1 = Principal::new("eval-1", Role::Evaluator);
    let eval_2 = Principal::new("eval-2", Role::Evaluator);
    for (evaluator, sub, tech_score, cost_score) in [
        (&eval_1, &sub_a, 4.0, 3.0),
        (&eval_2, &sub_a, 5.0, 4.0),
        (&eval_1, &sub_b, 3.0, 4.0),
        (&eval_2, &sub_b, 3.5, 3.5),
    ] {
        engine
            .record_score(evaluator, &sub.id, &technical, tech_score, None)
            .await
            .unwrap();
        engine
            .record_score(evaluator, &sub.id, &cost, cost_score, None)
            .await
            .unwrap();
    }

    // vendor-a: eval-1 3.6, eval-2 4.6 -> 4.1; vendor-b: 3.4 and 3.5 -> 3.45
    let ranking = engine.get_ranking(&tender.id).await.unwrap();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].vendor_id, "vendor-a");
    assert!((ranking[0].average_score - 4.1).abs() < 1e-9);
    assert_eq!(ranking[0].evaluator_count, 2);
    assert!((ranking[1].average_score - 3.45).abs() < 1e-9);

    // Propose the top-ranked submission; both approvers approve
    let awarded_at = closed_at + Duration::days(1);
    let decision = engine
        .propose_award_at(&pm(), &tender.id, &ranking[0].submission_id, awarded_at)
        .await
        .unwrap();
    assert!(decision.deviation_note.is_none());
    assert_eq!(decision.committee.len(), 2);

    let appr_1 = Principal::new("appr-1", Role::Procurement);
    let appr_2 = Principal::new("appr-2", Role::Procurement);
    let mid = engine
        .add_approval_at(&appr_1, &decision.id, Verdict::Approve, None, awarded_at)
        .await
        .unwrap();
    assert_eq!(mid.status, DecisionStatus::Pending);

    let resolved = engine
        .add_approval_at(&appr_2, &decision.id, Verdict::Approve, Some("good value".to_string()), awarded_at)
        .await
        .unwrap();
    assert_eq!(resolved.status, DecisionStatus::Approved);

    // Award cascade: tender awarded, winner marked, loser rejected
    let tender = engine.get_tender(&tender.id).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Awarded);
    assert_eq!(tender.winning_submission_id, Some(sub_a.id.clone()));
    assert_eq!(tender.awarded_at, Some(awarded_at));

    let winner = engine.get_submission(&sub_a.id).await.unwrap();
    assert_eq!(winner.status, SubmissionStatus::Awarded);
    let loser = engine.get_submission(&sub_b.id).await.unwrap();
    assert_eq!(loser.status, SubmissionStatus::Rejected);

    // A duplicate verdict after resolution is refused
    let late = engine
        .add_approval_at(&appr_1, &decision.id, Verdict::Reject, None, awarded_at)
        .await;
    assert!(matches!(
        late,
        Err(tenderflow_engine::EngineError::DecisionResolved { .. })
    ));

    // The losing vendor disputes on day 3, inside the 7-day window
    let dispute = engine
        .file_dispute_at(
            &vendor_b,
            &tender.id,
            "cost scores look inconsistent with the offers",
            &[],
            awarded_at + Duration::days(3),
        )
        .await
        .unwrap();
    assert_eq!(dispute.status, DisputeStatus::Pending);

    // Admin investigates and dismisses on day 5
    let admin = Principal::new("admin-1", Role::Admin);
    engine.begin_investigation(&admin, &dispute.id).await.unwrap();
    let closed = engine
        .resolve_dispute_at(
            &admin,
            &dispute.id,
            DisputeStatus::Dismissed,
            "scores were applied per the published criteria",
            awarded_at + Duration::days(5),
        )
        .await
        .unwrap();
    assert_eq!(closed.status, DisputeStatus::Dismissed);

    // The winner never could have disputed
    let winner_try = engine
        .file_dispute_at(&vendor_a, &tender.id, "ceremonial", &[], awarded_at + Duration::days(3))
        .await;
    assert!(matches!(
        winner_try,
        Err(tenderflow_engine::EngineError::WinnerCannotDispute)
    ));

    // Audit trail covers the whole lifecycle
    let history = engine.transition_history(&tender.id).await.unwrap();
    let moves: Vec<(TenderStatus, TenderStatus)> =
        history.iter().map(|h| (h.from, h.to)).collect();
    assert_eq!(
        moves,
        vec![
            (TenderStatus::Draft, TenderStatus::Open),
            (TenderStatus::Open, TenderStatus::Closed),
            (TenderStatus::Closed, TenderStatus::Awarded),
        ]
    );
}

#[tokio::test]
async fn test_cancellation_rejects_pending_submissions() {
    let engine = TenderEngine::new(TenderDb::open_in_memory().await.unwrap());
    let t0 = Utc::now();
    let draft = TenderDraft {
        title: "Archived records digitisation".to_string(),
        description: String::new(),
        budget: 120_000.0,
        deadline: t0 + Duration::days(7),
        dispute_window_days: 7,
        criteria: vec![Criterion::new("quality", 100)],
        evaluators: vec!["eval-1".to_string()],
        approvers: vec!["appr-1".to_string()],
    };
    let tender = engine.create_tender_at(&pm(), &draft, t0).await.unwrap();
    engine.publish_tender_at(&pm(), &tender.id, t0).await.unwrap();

    let vendor = Principal::new("vendor-a", Role::Vendor);
    let submission = engine
        .submit_proposal_at(&vendor, &tender.id, &payload("offer", 110_000.0), t0 + Duration::days(1))
        .await
        .unwrap();

    engine
        .cancel_tender_at(&pm(), &tender.id, t0 + Duration::days(2))
        .await
        .unwrap();

    let tender = engine.get_tender(&tender.id).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Cancelled);
    let submission = engine.get_submission(&submission.id).await.unwrap();
    assert_eq!(submission.status, SubmissionStatus::Rejected);

    // Terminal: no further submissions, no publishing, no award
    let refused = engine
        .submit_proposal_at(&vendor, &tender.id, &payload("retry", 100_000.0), t0 + Duration::days(3))
        .await;
    assert!(matches!(
        refused,
        Err(tenderflow_engine::EngineError::TenderNotOpen {
            current: TenderStatus::Cancelled
        })
    ));
}

#[tokio::test]
async fn test_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tenderflow.db");
    let t0 = Utc::now();

    let tender_id = {
        let engine = TenderEngine::open(&db_path).await.unwrap();
        let draft = TenderDraft {
            title: "Playground equipment".to_string(),
            description: String::new(),
            budget: 60_000.0,
            deadline: t0 + Duration::days(7),
            dispute_window_days: 7,
            criteria: vec![Criterion::new("safety", 100)],
            evaluators: vec!["eval-1".to_string()],
            approvers: vec!["appr-1".to_string()],
        };
        let tender = engine.create_tender_at(&pm(), &draft, t0).await.unwrap();
        engine.publish_tender_at(&pm(), &tender.id, t0).await.unwrap();
        tender.id
    };

    let engine = TenderEngine::open(&db_path).await.unwrap();
    let tender = engine.get_tender(&tender_id).await.unwrap();
    assert_eq!(tender.status, TenderStatus::Open);
    assert_eq!(tender.criteria.len(), 1);
}

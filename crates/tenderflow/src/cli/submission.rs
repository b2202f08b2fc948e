//! Submission, scoring and ranking commands.

use crate::cli::output::{fmt_money, fmt_ts, submission_status_cell, table};
use crate::cli::{parse_tender_id, require_principal};
use anyhow::{Context, Result};
use clap::Args;
use tenderflow_engine::TenderEngine;
use tenderflow_ids::{CriterionId, SubmissionId};
use tenderflow_protocol::{FileRef, Principal, SubmissionPayload};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub tender_id: String,

    /// Proposal text
    #[arg(long)]
    pub proposal: String,

    /// Proposed budget
    #[arg(long)]
    pub budget: f64,

    /// Attachment metadata as <name>:<storage-key>:<size>:<content-type>.
    /// Bytes live in the object store; only the reference is recorded.
    #[arg(long = "attachment", value_name = "NAME:KEY:SIZE:TYPE")]
    pub attachments: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    pub submission_id: String,

    /// Criterion id being scored
    #[arg(long)]
    pub criterion: String,

    /// Score value within the criterion's declared range
    #[arg(long)]
    pub value: f64,

    #[arg(long)]
    pub comment: Option<String>,
}

pub async fn submit(
    engine: &TenderEngine,
    principal: Option<Principal>,
    args: SubmitArgs,
) -> Result<()> {
    let principal = require_principal(principal)?;
    let tender_id = parse_tender_id(&args.tender_id)?;

    let attachments = args
        .attachments
        .iter()
        .map(|spec| parse_attachment(spec))
        .collect::<Result<Vec<_>>>()?;
    let payload = SubmissionPayload {
        proposal: args.proposal,
        proposed_budget: args.budget,
        attachments,
    };

    let submission = engine.submit_proposal(&principal, &tender_id, &payload).await?;
    println!(
        "Submission {} recorded for {} (amendable until the deadline)",
        submission.id, submission.vendor_id
    );
    Ok(())
}

pub async fn list(engine: &TenderEngine, tender_id: &str) -> Result<()> {
    let tender_id = parse_tender_id(tender_id)?;
    let submissions = engine.list_submissions(&tender_id).await?;

    let mut t = table(&["ID", "VENDOR", "BUDGET", "STATUS", "SUBMITTED", "AMENDED"]);
    for s in &submissions {
        t.add_row(vec![
            comfy_table::Cell::new(s.id.as_str()),
            comfy_table::Cell::new(&s.vendor_id),
            comfy_table::Cell::new(fmt_money(s.proposed_budget)),
            submission_status_cell(s.status),
            comfy_table::Cell::new(fmt_ts(s.submitted_at)),
            comfy_table::Cell::new(fmt_ts(s.updated_at)),
        ]);
    }
    println!("{t}");
    println!("{} submission(s)", submissions.len());
    Ok(())
}

pub async fn score(
    engine: &TenderEngine,
    principal: Option<Principal>,
    args: ScoreArgs,
) -> Result<()> {
    let principal = require_principal(principal)?;
    let submission_id = SubmissionId::parse(&args.submission_id)
        .with_context(|| format!("invalid submission id '{}'", args.submission_id))?;
    let criterion_id = CriterionId::parse(&args.criterion)
        .with_context(|| format!("invalid criterion id '{}'", args.criterion))?;

    engine
        .record_score(&principal, &submission_id, &criterion_id, args.value, args.comment)
        .await?;
    println!("Score {} recorded on {}", args.value, submission_id);
    Ok(())
}

pub async fn rank(engine: &TenderEngine, tender_id: &str) -> Result<()> {
    let tender_id = parse_tender_id(tender_id)?;
    let ranking = engine.get_ranking(&tender_id).await?;

    let mut t = table(&["#", "VENDOR", "AVERAGE", "EVALUATORS", "SUBMITTED", "SUBMISSION"]);
    for (position, entry) in ranking.iter().enumerate() {
        t.add_row(vec![
            (position + 1).to_string(),
            entry.vendor_id.clone(),
            format!("{:.2}", entry.average_score),
            entry.evaluator_count.to_string(),
            fmt_ts(entry.submitted_at),
            entry.submission_id.to_string(),
        ]);
    }
    println!("{t}");
    if ranking.is_empty() {
        println!("No submission has a complete evaluator score set yet");
    }
    Ok(())
}

/// `<name>:<storage-key>:<size>:<content-type>`.
fn parse_attachment(spec: &str) -> Result<FileRef> {
    let parts: Vec<&str> = spec.splitn(4, ':').collect();
    let [name, key, size, content_type] = parts.as_slice() else {
        anyhow::bail!("expected NAME:KEY:SIZE:TYPE, got '{spec}'");
    };
    Ok(FileRef {
        name: name.to_string(),
        key: key.to_string(),
        size: size
            .parse()
            .with_context(|| format!("invalid size in '{spec}'"))?,
        content_type: content_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attachment() {
        let f = parse_attachment("spec.pdf:bids/abc123:20480:application/pdf").unwrap();
        assert_eq!(f.name, "spec.pdf");
        assert_eq!(f.key, "bids/abc123");
        assert_eq!(f.size, 20480);
        assert_eq!(f.content_type, "application/pdf");

        assert!(parse_attachment("missing:parts").is_err());
        assert!(parse_attachment("a:b:huge:t").is_err());
    }
}

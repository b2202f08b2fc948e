//! Award proposal and quorum commands.

use crate::cli::output::{decision_status_cell, fmt_ts, table};
use crate::cli::{parse_tender_id, require_principal};
use anyhow::{Context, Result};
use clap::Subcommand;
use tenderflow_engine::TenderEngine;
use tenderflow_ids::{DecisionId, SubmissionId};
use tenderflow_protocol::{Decision, Principal, Verdict};

#[derive(Subcommand, Debug)]
pub enum AwardCommand {
    /// Propose a submission for award; snapshots the approval committee
    Propose {
        tender_id: String,
        submission_id: String,
    },
    /// Record a committee verdict (approve or reject)
    Approve {
        decision_id: String,

        #[arg(long, default_value = "approve")]
        verdict: String,

        #[arg(long)]
        comment: Option<String>,
    },
    /// Show a decision with its committee and verdicts
    Show { decision_id: String },
    /// List the decisions proposed against a tender
    List { tender_id: String },
}

pub async fn run(
    engine: &TenderEngine,
    principal: Option<Principal>,
    command: AwardCommand,
) -> Result<()> {
    match command {
        AwardCommand::Propose {
            tender_id,
            submission_id,
        } => {
            let principal = require_principal(principal)?;
            let tender_id = parse_tender_id(&tender_id)?;
            let submission_id = SubmissionId::parse(&submission_id)
                .with_context(|| format!("invalid submission id '{submission_id}'"))?;

            let decision = engine
                .propose_award(&principal, &tender_id, &submission_id)
                .await?;
            println!(
                "Decision {} proposed; awaiting {} committee verdict(s)",
                decision.id,
                decision.committee.len()
            );
            if let Some(note) = &decision.deviation_note {
                println!("Note: {note}");
            }
            Ok(())
        }
        AwardCommand::Approve {
            decision_id,
            verdict,
            comment,
        } => {
            let principal = require_principal(principal)?;
            let decision_id = parse_decision_id(&decision_id)?;
            let verdict: Verdict = verdict
                .parse()
                .with_context(|| format!("unknown verdict '{verdict}'"))?;

            let decision = engine
                .add_approval(&principal, &decision_id, verdict, comment)
                .await?;
            println!("Verdict recorded; decision is {}", decision.status);
            Ok(())
        }
        AwardCommand::Show { decision_id } => {
            let decision_id = parse_decision_id(&decision_id)?;
            let decision = engine.get_decision(&decision_id).await?;
            print_decision(&decision);
            Ok(())
        }
        AwardCommand::List { tender_id } => {
            let tender_id = parse_tender_id(&tender_id)?;
            let decisions = engine.decisions_for_tender(&tender_id).await?;
            let mut t = table(&["ID", "WINNER", "STATUS", "PROPOSED BY", "PROPOSED AT"]);
            for d in &decisions {
                t.add_row(vec![
                    comfy_table::Cell::new(d.id.as_str()),
                    comfy_table::Cell::new(d.proposed_winner_id.as_str()),
                    decision_status_cell(d.status),
                    comfy_table::Cell::new(&d.proposed_by),
                    comfy_table::Cell::new(fmt_ts(d.created_at)),
                ]);
            }
            println!("{t}");
            Ok(())
        }
    }
}

fn parse_decision_id(raw: &str) -> Result<DecisionId> {
    DecisionId::parse(raw).with_context(|| format!("invalid decision id '{raw}'"))
}

fn print_decision(decision: &Decision) {
    println!("Decision:  {}", decision.id);
    println!("Tender:    {}", decision.tender_id);
    println!("Winner:    {}", decision.proposed_winner_id);
    println!("Status:    {}", decision.status);
    println!("Proposed:  {} by {}", fmt_ts(decision.created_at), decision.proposed_by);
    if let Some(note) = &decision.deviation_note {
        println!("Note:      {note}");
    }

    let mut t = table(&["APPROVER", "VERDICT", "COMMENT", "WHEN"]);
    for member in &decision.committee {
        match decision.approval_for(member) {
            Some(approval) => t.add_row(vec![
                member.clone(),
                approval.verdict.to_string(),
                approval.comment.clone().unwrap_or_else(|| "-".to_string()),
                fmt_ts(approval.created_at),
            ]),
            None => t.add_row(vec![
                member.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]),
        };
    }
    println!("{t}");
}

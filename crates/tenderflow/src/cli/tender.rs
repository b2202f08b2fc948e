//! Tender lifecycle commands.

use crate::cli::output::{fmt_money, fmt_opt_ts, fmt_ts, table, tender_status_cell};
use crate::cli::{parse_tender_id, require_principal};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use tenderflow_engine::TenderEngine;
use tenderflow_protocol::{Criterion, Principal, Tender, TenderDraft, TenderStatus};

#[derive(Subcommand, Debug)]
pub enum TenderCommand {
    /// Create a tender in draft
    Create(CreateArgs),
    /// Publish a draft (opens it to submissions)
    Publish { tender_id: String },
    /// Close an open tender to further submissions
    Close { tender_id: String },
    /// Cancel a tender; pending submissions are rejected
    Cancel { tender_id: String },
    /// Show one tender with its criteria and assignments
    Show { tender_id: String },
    /// List tenders, optionally by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show the lifecycle audit trail
    History { tender_id: String },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long)]
    pub budget: f64,

    /// Submission deadline, RFC3339 (e.g. 2026-09-30T17:00:00Z)
    #[arg(long)]
    pub deadline: String,

    /// Days after award during which disputes may be filed
    #[arg(long = "window-days", default_value_t = 7)]
    pub dispute_window_days: u32,

    /// Criterion as <name>:<weight> or <name>:<weight>:<min>-<max>;
    /// weights must sum to 100. Repeatable.
    #[arg(long = "criterion", value_name = "NAME:WEIGHT[:MIN-MAX]")]
    pub criteria: Vec<String>,

    /// Evaluator id. Repeatable.
    #[arg(long = "evaluator")]
    pub evaluators: Vec<String>,

    /// Award committee member id. Repeatable.
    #[arg(long = "approver")]
    pub approvers: Vec<String>,
}

pub async fn run(
    engine: &TenderEngine,
    principal: Option<Principal>,
    command: TenderCommand,
) -> Result<()> {
    match command {
        TenderCommand::Create(args) => {
            let principal = require_principal(principal)?;
            let draft = build_draft(&args)?;
            let tender = engine.create_tender(&principal, &draft).await?;
            println!("Created tender {} ({})", tender.id, tender.title);
            Ok(())
        }
        TenderCommand::Publish { tender_id } => {
            let principal = require_principal(principal)?;
            let id = parse_tender_id(&tender_id)?;
            let tender = engine.publish_tender(&principal, &id).await?;
            println!(
                "Tender {} is open for submissions until {}",
                tender.id,
                fmt_ts(tender.deadline)
            );
            Ok(())
        }
        TenderCommand::Close { tender_id } => {
            let principal = require_principal(principal)?;
            let id = parse_tender_id(&tender_id)?;
            let tender = engine.close_tender(&principal, &id).await?;
            println!("Tender {} closed; evaluation may begin", tender.id);
            Ok(())
        }
        TenderCommand::Cancel { tender_id } => {
            let principal = require_principal(principal)?;
            let id = parse_tender_id(&tender_id)?;
            let tender = engine.cancel_tender(&principal, &id).await?;
            println!("Tender {} cancelled", tender.id);
            Ok(())
        }
        TenderCommand::Show { tender_id } => {
            let id = parse_tender_id(&tender_id)?;
            let tender = engine.get_tender(&id).await?;
            print_tender(&tender);
            Ok(())
        }
        TenderCommand::List { status } => {
            let status = status
                .as_deref()
                .map(|s| {
                    s.parse::<TenderStatus>()
                        .with_context(|| format!("unknown status '{s}'"))
                })
                .transpose()?;
            let tenders = engine.list_tenders(status).await?;
            let mut t = table(&["ID", "TITLE", "STATUS", "BUDGET", "DEADLINE", "AWARDED"]);
            for tender in &tenders {
                t.add_row(vec![
                    comfy_table::Cell::new(tender.id.as_str()),
                    comfy_table::Cell::new(&tender.title),
                    tender_status_cell(tender.status),
                    comfy_table::Cell::new(fmt_money(tender.budget)),
                    comfy_table::Cell::new(fmt_ts(tender.deadline)),
                    comfy_table::Cell::new(fmt_opt_ts(tender.awarded_at)),
                ]);
            }
            println!("{t}");
            println!("{} tender(s)", tenders.len());
            Ok(())
        }
        TenderCommand::History { tender_id } => {
            let id = parse_tender_id(&tender_id)?;
            let history = engine.transition_history(&id).await?;
            let mut t = table(&["WHEN", "FROM", "TO", "ACTOR", "REASON"]);
            for entry in &history {
                t.add_row(vec![
                    fmt_ts(entry.at),
                    entry.from.to_string(),
                    entry.to.to_string(),
                    entry.actor.clone(),
                    entry.reason.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{t}");
            Ok(())
        }
    }
}

fn build_draft(args: &CreateArgs) -> Result<TenderDraft> {
    let deadline: DateTime<Utc> = args
        .deadline
        .parse()
        .with_context(|| format!("invalid deadline '{}'; expected RFC3339", args.deadline))?;

    let criteria = args
        .criteria
        .iter()
        .map(|spec| parse_criterion(spec))
        .collect::<Result<Vec<_>>>()?;

    Ok(TenderDraft {
        title: args.title.clone(),
        description: args.description.clone(),
        budget: args.budget,
        deadline,
        dispute_window_days: args.dispute_window_days,
        criteria,
        evaluators: args.evaluators.clone(),
        approvers: args.approvers.clone(),
    })
}

/// `<name>:<weight>` or `<name>:<weight>:<min>-<max>`.
fn parse_criterion(spec: &str) -> Result<Criterion> {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        bail!("criterion name missing in '{spec}'");
    }
    let weight: u32 = parts
        .next()
        .context("criterion weight missing")?
        .parse()
        .with_context(|| format!("invalid weight in '{spec}'"))?;

    let criterion = Criterion::new(name, weight);
    match parts.next() {
        None => Ok(criterion),
        Some(range) => {
            let (min, max) = range
                .split_once('-')
                .with_context(|| format!("invalid range in '{spec}'; expected MIN-MAX"))?;
            let min: f64 = min.parse().with_context(|| format!("invalid min in '{spec}'"))?;
            let max: f64 = max.parse().with_context(|| format!("invalid max in '{spec}'"))?;
            Ok(criterion.with_range(min, max))
        }
    }
}

fn print_tender(tender: &Tender) {
    println!("Tender:      {}", tender.id);
    println!("Title:       {}", tender.title);
    if !tender.description.is_empty() {
        println!("Description: {}", tender.description);
    }
    println!("Status:      {}", tender.status);
    println!("Budget:      {}", fmt_money(tender.budget));
    println!("Deadline:    {}", fmt_ts(tender.deadline));
    println!("Window:      {} day(s) after award", tender.dispute_window_days);
    println!("Evaluators:  {}", tender.evaluators.join(", "));
    println!("Approvers:   {}", tender.approvers.join(", "));
    if let Some(winner) = &tender.winning_submission_id {
        println!("Winner:      {} (awarded {})", winner, fmt_opt_ts(tender.awarded_at));
    }

    let mut t = table(&["CRITERION", "WEIGHT", "RANGE"]);
    for criterion in &tender.criteria {
        t.add_row(vec![
            criterion.name.clone(),
            format!("{}%", criterion.weight),
            format!("{}-{}", criterion.min_value, criterion.max_value),
        ]);
    }
    println!("{t}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_criterion() {
        let c = parse_criterion("technical:60").unwrap();
        assert_eq!(c.name, "technical");
        assert_eq!(c.weight, 60);
        assert_eq!((c.min_value, c.max_value), (0.0, 5.0));

        let c = parse_criterion("cost:40:0-10").unwrap();
        assert_eq!((c.min_value, c.max_value), (0.0, 10.0));

        assert!(parse_criterion("noweight").is_err());
        assert!(parse_criterion(":60").is_err());
        assert!(parse_criterion("cost:40:bad").is_err());
    }
}

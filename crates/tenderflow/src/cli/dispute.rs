//! Dispute commands.

use crate::cli::output::{dispute_status_cell, fmt_opt_ts, fmt_ts, table};
use crate::cli::{parse_tender_id, require_principal};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tenderflow_engine::TenderEngine;
use tenderflow_ids::DisputeId;
use tenderflow_protocol::{DisputeStatus, Principal};

#[derive(Subcommand, Debug)]
pub enum DisputeCommand {
    /// File a dispute against an awarded tender (losing vendors only)
    File {
        tender_id: String,

        #[arg(long)]
        reason: String,
    },
    /// Move a pending dispute under investigation
    Investigate { dispute_id: String },
    /// Close a dispute as resolved or dismissed
    Resolve {
        dispute_id: String,

        /// Final status: resolved or dismissed
        #[arg(long)]
        outcome: String,

        #[arg(long)]
        resolution: String,
    },
    /// List the disputes on a tender
    List { tender_id: String },
}

pub async fn run(
    engine: &TenderEngine,
    principal: Option<Principal>,
    command: DisputeCommand,
) -> Result<()> {
    match command {
        DisputeCommand::File { tender_id, reason } => {
            let principal = require_principal(principal)?;
            let tender_id = parse_tender_id(&tender_id)?;
            let dispute = engine
                .file_dispute(&principal, &tender_id, &reason, &[])
                .await?;
            println!("Dispute {} filed", dispute.id);
            Ok(())
        }
        DisputeCommand::Investigate { dispute_id } => {
            let principal = require_principal(principal)?;
            let dispute_id = parse_dispute_id(&dispute_id)?;
            let dispute = engine.begin_investigation(&principal, &dispute_id).await?;
            println!("Dispute {} is {}", dispute.id, dispute.status);
            Ok(())
        }
        DisputeCommand::Resolve {
            dispute_id,
            outcome,
            resolution,
        } => {
            let principal = require_principal(principal)?;
            let dispute_id = parse_dispute_id(&dispute_id)?;
            let outcome: DisputeStatus = outcome
                .parse()
                .with_context(|| format!("unknown outcome '{outcome}'"))?;
            if !matches!(outcome, DisputeStatus::Resolved | DisputeStatus::Dismissed) {
                bail!("outcome must be resolved or dismissed");
            }

            let dispute = engine
                .resolve_dispute(&principal, &dispute_id, outcome, &resolution)
                .await?;
            println!("Dispute {} closed as {}", dispute.id, dispute.status);
            Ok(())
        }
        DisputeCommand::List { tender_id } => {
            let tender_id = parse_tender_id(&tender_id)?;
            let disputes = engine.list_disputes(&tender_id).await?;

            let mut t = table(&["ID", "VENDOR", "STATUS", "FILED", "RESOLVED", "REASON"]);
            for d in &disputes {
                t.add_row(vec![
                    comfy_table::Cell::new(d.id.as_str()),
                    comfy_table::Cell::new(&d.raised_by_vendor_id),
                    dispute_status_cell(d.status),
                    comfy_table::Cell::new(fmt_ts(d.filed_at)),
                    comfy_table::Cell::new(fmt_opt_ts(d.resolved_at)),
                    comfy_table::Cell::new(&d.reason),
                ]);
            }
            println!("{t}");
            println!("{} dispute(s)", disputes.len());
            Ok(())
        }
    }
}

fn parse_dispute_id(raw: &str) -> Result<DisputeId> {
    DisputeId::parse(raw).with_context(|| format!("invalid dispute id '{raw}'"))
}

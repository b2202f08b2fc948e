//! CLI command implementations.

pub mod award;
pub mod dispute;
pub mod output;
pub mod submission;
pub mod tender;

use anyhow::{bail, Context, Result};
use tenderflow_ids::TenderId;
use tenderflow_protocol::{Principal, Role};

/// Parse `<id>:<role>` into a principal.
pub fn parse_principal(raw: &str) -> Result<Principal> {
    let Some((id, role)) = raw.rsplit_once(':') else {
        bail!("expected <id>:<role>, got '{raw}'");
    };
    if id.is_empty() {
        bail!("principal id must not be empty");
    }
    let role: Role = role
        .parse()
        .with_context(|| format!("unknown role '{role}'"))?;
    Ok(Principal::new(id, role))
}

/// Mutating commands need an acting principal.
pub fn require_principal(principal: Option<Principal>) -> Result<Principal> {
    principal.context("this command requires --as <id>:<role>")
}

pub fn parse_tender_id(raw: &str) -> Result<TenderId> {
    TenderId::parse(raw).with_context(|| format!("invalid tender id '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_principal() {
        let p = parse_principal("pm-1:procurement").unwrap();
        assert_eq!(p.id, "pm-1");
        assert_eq!(p.role, Role::Procurement);

        assert!(parse_principal("no-role").is_err());
        assert!(parse_principal("x:director").is_err());
        assert!(parse_principal(":vendor").is_err());
    }
}

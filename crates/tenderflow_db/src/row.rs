//! Boundary parsing helpers for stored values.
//!
//! Timestamps are persisted as RFC3339 text; statuses as their lowercase
//! string forms. Parsing happens here with error propagation, never with
//! silent fallbacks.

use crate::error::{DbError, Result};
use chrono::{DateTime, Utc};
use std::str::FromStr;

pub(crate) fn ts_str(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::type_conversion(format!("Invalid timestamp '{}': {}", raw, e)))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn parse_enum<T>(kind: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| DbError::type_conversion(format!("Invalid {} '{}': {}", kind, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderflow_protocol::TenderStatus;

    #[test]
    fn test_ts_roundtrip() {
        let now = Utc::now();
        let parsed = parse_ts(&ts_str(now)).unwrap();
        assert_eq!(now, parsed);
    }

    #[test]
    fn test_parse_enum_reports_kind() {
        let err = parse_enum::<TenderStatus>("tender status", "bogus").unwrap_err();
        assert!(err.to_string().contains("tender status"));
    }
}

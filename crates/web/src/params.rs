//! Query-string validation for `GET /wallets`.
//!
//! Everything arrives as raw strings so that malformed values produce a JSON
//! 400 from [`ApiError`] instead of axum's plain-text rejection.

use chrono::{DateTime, NaiveDate, Utc};
use common::types::{SnapshotQuery, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct WalletsParams {
    pub min_winrate: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl WalletsParams {
    pub fn into_query(self) -> Result<SnapshotQuery, ApiError> {
        let min_winrate = self
            .min_winrate
            .as_deref()
            .map(parse_min_winrate)
            .transpose()?;
        let limit = self
            .limit
            .as_deref()
            .map(parse_limit)
            .transpose()?
            .unwrap_or(DEFAULT_QUERY_LIMIT);
        let start = self
            .start_date
            .as_deref()
            .map(|s| parse_date("start_date", s, false))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|s| parse_date("end_date", s, true))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ApiError::BadRequest(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        Ok(SnapshotQuery {
            min_winrate,
            start,
            end,
            limit,
        })
    }
}

fn parse_min_winrate(raw: &str) -> Result<f64, ApiError> {
    match raw.trim().parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(ApiError::BadRequest(format!(
            "min_winrate must be a number between 0 and 1, got {raw:?}"
        ))),
    }
}

fn parse_limit(raw: &str) -> Result<u32, ApiError> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v >= 1 => {
            Ok(u32::try_from(v).map_or(MAX_QUERY_LIMIT, |v| v.min(MAX_QUERY_LIMIT)))
        }
        _ => Err(ApiError::BadRequest(format!(
            "limit must be a positive integer, got {raw:?}"
        ))),
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as the start (or, for
/// `end_date`, the last microsecond) of that UTC day.
fn parse_date(field: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let invalid = || {
        ApiError::BadRequest(format!(
            "{field} must be an RFC 3339 timestamp or a YYYY-MM-DD date, got {raw:?}"
        ))
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| {
            if end_of_day {
                day.and_hms_micro_opt(23, 59, 59, 999_999)
            } else {
                day.and_hms_opt(0, 0, 0)
            }
        })
        .map(|dt| dt.and_utc())
        .ok_or_else(invalid)
}

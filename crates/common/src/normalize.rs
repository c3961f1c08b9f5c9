//! Maps raw gmgn wallet rank entries into [`WalletSnapshot`]s.
//!
//! The provider is inconsistent about field names (`winrate_7d` vs `winrate`),
//! number encoding (JSON numbers vs numeric strings) and which fields are
//! present at all. Lookups try the timeframe-suffixed key first, then the
//! bare key, then fall back to a default. The ranking always carries
//! `winrate_7d`, so winrate falls back to it for the other timeframes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::NormalizationError;
use crate::types::{Timeframe, WalletSnapshot};

/// Normalize one raw wallet entry. `collected_at` is the only time input; the
/// result depends on nothing else.
pub fn normalize_wallet(
    raw: &Value,
    timeframe: Timeframe,
    collected_at: DateTime<Utc>,
) -> Result<WalletSnapshot, NormalizationError> {
    let Some(obj) = raw.as_object() else {
        return Err(NormalizationError::invalid("wallet", "expected a JSON object"));
    };
    let mut fields = Fields::new(obj, timeframe);

    let address = fields
        .take_str("wallet_address")
        .or_else(|| fields.take_str("address"))
        .ok_or(NormalizationError::MissingField("address"))?;

    let winrate = fields
        .take_windowed_f64_or("winrate", "winrate_7d")?
        .unwrap_or(0.0);
    if !(0.0..=1.0).contains(&winrate) {
        return Err(NormalizationError::invalid(
            "winrate",
            format!("{winrate} is outside [0, 1]"),
        ));
    }

    let realized_profit = fields.take_windowed_f64("realized_profit")?.unwrap_or(0.0);
    let pnl = fields.take_windowed_f64("pnl")?;
    let buy_count = count(fields.take_windowed_f64("buy")?, "buy")?;
    let sell_count = count(fields.take_windowed_f64("sell")?, "sell")?;

    let last_active = match fields.take_f64("last_active")? {
        Some(secs) if secs > 0.0 => DateTime::from_timestamp(secs as i64, 0),
        _ => None,
    };

    let tag = fields.take_tag();

    Ok(WalletSnapshot {
        address,
        tag,
        winrate,
        realized_profit,
        pnl,
        buy_count,
        sell_count,
        last_active,
        timeframe,
        collected_at,
        raw: Value::Object(fields.rest),
    })
}

/// Working copy of the entry; consumed keys are removed so the remainder can
/// be passed through as `raw`.
struct Fields {
    rest: Map<String, Value>,
    timeframe: Timeframe,
}

impl Fields {
    fn new(obj: &Map<String, Value>, timeframe: Timeframe) -> Self {
        Self {
            rest: obj.clone(),
            timeframe,
        }
    }

    fn take_str(&mut self, key: &str) -> Option<String> {
        match self.rest.remove(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    fn take_f64(&mut self, key: &str) -> Result<Option<f64>, NormalizationError> {
        match self.rest.remove(key) {
            None => Ok(None),
            Some(v) => coerce_f64(key, &v),
        }
    }

    /// `{key}_{timeframe}` wins over `{key}`.
    fn take_windowed_f64(&mut self, key: &str) -> Result<Option<f64>, NormalizationError> {
        let windowed_key = format!("{key}_{}", self.timeframe.as_str());
        self.take_first_f64(&[windowed_key.as_str(), key])
    }

    /// Like [`Self::take_windowed_f64`], with `fallback` tried last.
    fn take_windowed_f64_or(
        &mut self,
        key: &str,
        fallback: &str,
    ) -> Result<Option<f64>, NormalizationError> {
        let windowed_key = format!("{key}_{}", self.timeframe.as_str());
        self.take_first_f64(&[windowed_key.as_str(), key, fallback])
    }

    /// Value of the first key that is present and non-null. Keys after it are
    /// left untouched in `rest`.
    fn take_first_f64(&mut self, keys: &[&str]) -> Result<Option<f64>, NormalizationError> {
        for key in keys {
            if let Some(v) = self.take_f64(key)? {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    fn take_tag(&mut self) -> Option<String> {
        let explicit = self.take_str("tag");
        let first_listed = match self.rest.remove("tags") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|t| !t.is_empty())
                .map(str::to_string),
            _ => None,
        };
        explicit.or(first_listed)
    }
}

fn coerce_f64(field: &str, v: &Value) -> Result<Option<f64>, NormalizationError> {
    let parsed = match v {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok(Some(x)),
        _ => Err(NormalizationError::invalid(
            field,
            format!("expected a number, got {v}"),
        )),
    }
}

fn count(v: Option<f64>, field: &str) -> Result<u64, NormalizationError> {
    match v {
        None => Ok(0),
        Some(x) if x >= 0.0 => Ok(x.round() as u64),
        Some(x) => Err(NormalizationError::invalid(
            field,
            format!("negative count {x}"),
        )),
    }
}

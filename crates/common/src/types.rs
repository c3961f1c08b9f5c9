use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FetchError;

/// Window the upstream ranking metrics cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Timeframe {
    pub const ALL: [Self; 3] = [Self::OneDay, Self::SevenDays, Self::ThirtyDays];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| {
                FetchError::InvalidRequest(format!(
                    "unknown timeframe {s:?} (expected 1d, 7d or 30d)"
                ))
            })
    }
}

/// Wallet category the provider ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTag {
    PumpSmart,
    SmartDegen,
    Reowned,
    SnipeBot,
}

impl WalletTag {
    pub const ALL: [Self; 4] = [
        Self::PumpSmart,
        Self::SmartDegen,
        Self::Reowned,
        Self::SnipeBot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PumpSmart => "pump_smart",
            Self::SmartDegen => "smart_degen",
            Self::Reowned => "reowned",
            Self::SnipeBot => "snipe_bot",
        }
    }
}

impl fmt::Display for WalletTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletTag {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s.trim())
            .ok_or_else(|| FetchError::InvalidRequest(format!("unknown wallet tag {s:?}")))
    }
}

/// One wallet's metrics as of one scrape. At most one exists per address per UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub address: String,
    pub tag: Option<String>,
    pub winrate: f64,
    pub realized_profit: f64,
    pub pnl: Option<f64>,
    pub buy_count: u64,
    pub sell_count: u64,
    pub last_active: Option<DateTime<Utc>>,
    pub timeframe: Timeframe,
    pub collected_at: DateTime<Utc>,
    /// Upstream fields the normalized shape does not model.
    pub raw: serde_json::Value,
}

impl WalletSnapshot {
    pub fn snapshot_day(&self) -> NaiveDate {
        self.collected_at.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub total_records: u64,
    pub distinct_addresses: u64,
    pub average_winrate: f64,
    pub latest_collected_at: Option<DateTime<Utc>>,
}

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Filters for reading snapshots. Every supplied filter must match.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotQuery {
    pub min_winrate: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl Default for SnapshotQuery {
    fn default() -> Self {
        Self {
            min_winrate: None,
            start: None,
            end: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl SnapshotQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_QUERY_LIMIT)
    }
}

/// gmgn response envelope: `{"code": 0, "msg": "success", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GmgnEnvelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankData {
    #[serde(default)]
    pub rank: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPriceData {
    #[serde(default)]
    pub usd_price: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_round_trips_through_str() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn test_unknown_timeframe_is_invalid_request() {
        let err = "2h".parse::<Timeframe>().unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_wallet_tag_parse() {
        assert_eq!(
            "smart_degen".parse::<WalletTag>().unwrap(),
            WalletTag::SmartDegen
        );
        assert!("whales".parse::<WalletTag>().is_err());
    }

    #[test]
    fn test_query_limit_is_clamped() {
        let mut q = SnapshotQuery {
            limit: 0,
            ..SnapshotQuery::default()
        };
        assert_eq!(q.effective_limit(), 1);
        q.limit = 5000;
        assert_eq!(q.effective_limit(), 1000);
        q.limit = 25;
        assert_eq!(q.effective_limit(), 25);
    }

    #[test]
    fn test_parse_rank_envelope() {
        let json = r#"{"code":0,"msg":"success","data":{"rank":[{"wallet_address":"abc"}]}}"#;
        let env: GmgnEnvelope<RankData> = serde_json::from_str(json).unwrap();
        assert_eq!(env.code, 0);
        assert_eq!(env.data.unwrap().rank.len(), 1);
    }

    #[test]
    fn test_snapshot_serializes_timeframe_as_label() {
        let snap = WalletSnapshot {
            address: "abc".to_string(),
            tag: None,
            winrate: 0.5,
            realized_profit: 1.0,
            pnl: None,
            buy_count: 0,
            sell_count: 0,
            last_active: None,
            timeframe: Timeframe::SevenDays,
            collected_at: Utc::now(),
            raw: serde_json::json!({}),
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["timeframe"], "7d");
    }
}

//! Active-wallet analysis over stored snapshots.

use chrono::{DateTime, Duration, Utc};
use common::types::WalletSnapshot;
use serde_json::Value;

/// Wallets idle for longer than this are left out.
pub const ACTIVE_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWallet {
    pub address: String,
    pub realized_profit: f64,
    pub winrate: f64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub last_active: DateTime<Utc>,
    pub honeypot_ratio: f64,
    pub fast_tx_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Highest realized profit first.
    pub wallets: Vec<ActiveWallet>,
    pub total_profit: f64,
    pub average_winrate: f64,
}

/// Keep wallets active within [`ACTIVE_WINDOW_DAYS`] of `now` that traded at
/// least once, ranked by realized profit.
pub fn analyze(snapshots: Vec<WalletSnapshot>, now: DateTime<Utc>) -> Analysis {
    let cutoff = now - Duration::days(ACTIVE_WINDOW_DAYS);

    let mut wallets: Vec<ActiveWallet> = snapshots
        .into_iter()
        .filter(|s| s.buy_count > 0 || s.sell_count > 0)
        .filter_map(|s| {
            let last_active = s.last_active.filter(|ts| *ts >= cutoff)?;
            Some(ActiveWallet {
                honeypot_ratio: risk_ratio(&s.raw, "token_honeypot_ratio"),
                fast_tx_ratio: risk_ratio(&s.raw, "fast_tx_ratio"),
                address: s.address,
                realized_profit: s.realized_profit,
                winrate: s.winrate,
                buy_count: s.buy_count,
                sell_count: s.sell_count,
                last_active,
            })
        })
        .collect();

    wallets.sort_by(|a, b| {
        b.realized_profit
            .total_cmp(&a.realized_profit)
            .then_with(|| a.address.cmp(&b.address))
    });

    let total_profit = wallets.iter().map(|w| w.realized_profit).sum();
    let average_winrate = if wallets.is_empty() {
        0.0
    } else {
        wallets.iter().map(|w| w.winrate).sum::<f64>() / wallets.len() as f64
    };

    Analysis {
        wallets,
        total_profit,
        average_winrate,
    }
}

/// `raw.risk.<key>` as a fraction; missing or malformed reads as 0.
fn risk_ratio(raw: &Value, key: &str) -> f64 {
    match raw.get("risk").and_then(|risk| risk.get(key)) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn format_active_row(rank: usize, w: &ActiveWallet) -> String {
    format!(
        "{rank:>3}  {profit:>12.2}  {winrate:>5.1}%  {buys}/{sells}  {last}  HP:{hp:.1}% FT:{ft:.1}%  {address}",
        profit = w.realized_profit,
        winrate = w.winrate * 100.0,
        buys = w.buy_count,
        sells = w.sell_count,
        last = w.last_active.format("%Y-%m-%d %H:%M"),
        hp = w.honeypot_ratio * 100.0,
        ft = w.fast_tx_ratio * 100.0,
        address = w.address,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::types::Timeframe;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn snapshot(address: &str, profit: f64, winrate: f64, days_idle: i64) -> WalletSnapshot {
        WalletSnapshot {
            address: address.to_string(),
            tag: Some("smart_degen".to_string()),
            winrate,
            realized_profit: profit,
            pnl: None,
            buy_count: 3,
            sell_count: 2,
            last_active: Some(now() - Duration::days(days_idle)),
            timeframe: Timeframe::SevenDays,
            collected_at: now(),
            raw: json!({"risk": {"token_honeypot_ratio": 0.05, "fast_tx_ratio": "0.2"}}),
        }
    }

    #[test]
    fn test_ranks_active_wallets_by_profit() {
        let analysis = analyze(
            vec![
                snapshot("low", 10.0, 0.6, 1),
                snapshot("high", 500.0, 0.8, 2),
                snapshot("mid", 120.0, 0.7, 7),
            ],
            now(),
        );

        let order: Vec<_> = analysis.wallets.iter().map(|w| w.address.as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert!((analysis.total_profit - 630.0).abs() < 1e-9);
        assert!((analysis.average_winrate - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_skips_idle_and_untraded_wallets() {
        let untraded = WalletSnapshot {
            buy_count: 0,
            sell_count: 0,
            ..snapshot("untraded", 50.0, 0.9, 1)
        };
        let never_seen = WalletSnapshot {
            last_active: None,
            ..snapshot("never", 50.0, 0.9, 1)
        };
        let sell_only = WalletSnapshot {
            buy_count: 0,
            ..snapshot("sells", 5.0, 0.5, 0)
        };

        let analysis = analyze(
            vec![
                snapshot("stale", 900.0, 0.9, 8),
                untraded,
                never_seen,
                sell_only,
            ],
            now(),
        );

        let order: Vec<_> = analysis.wallets.iter().map(|w| w.address.as_str()).collect();
        assert_eq!(order, vec!["sells"]);
    }

    #[test]
    fn test_risk_ratios_read_from_raw() {
        let analysis = analyze(vec![snapshot("a", 1.0, 0.5, 0)], now());
        let w = &analysis.wallets[0];
        assert!((w.honeypot_ratio - 0.05).abs() < 1e-9);
        assert!((w.fast_tx_ratio - 0.2).abs() < 1e-9);

        let bare = WalletSnapshot {
            raw: json!({"risk": {"fast_tx_ratio": null}}),
            ..snapshot("b", 1.0, 0.5, 0)
        };
        let w = &analyze(vec![bare], now()).wallets[0];
        assert_eq!(w.honeypot_ratio, 0.0);
        assert_eq!(w.fast_tx_ratio, 0.0);
    }

    #[test]
    fn test_empty_analysis() {
        let analysis = analyze(Vec::new(), now());
        assert_eq!(analysis, Analysis::default());
    }

    #[test]
    fn test_format_active_row() {
        let analysis = analyze(vec![snapshot("7xKX", 1234.5, 0.75, 0)], now());
        let row = format_active_row(1, &analysis.wallets[0]);
        assert!(row.contains("1234.50"));
        assert!(row.contains("75.0%"));
        assert!(row.contains("3/2"));
        assert!(row.contains("2025-03-10 12:00"));
        assert!(row.contains("HP:5.0% FT:20.0%"));
        assert!(row.ends_with("7xKX"));
    }
}

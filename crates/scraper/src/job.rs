//! One scrape batch: fetch the ranking, normalize, filter, upsert.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::error::{FetchError, NormalizationError, StoreError};
use common::normalize::normalize_wallet;
use common::store::WalletStore;
use common::types::{Timeframe, UpsertOutcome, WalletSnapshot, WalletTag};
use serde_json::Value;
use thiserror::Error;

use crate::source::WalletSource;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Partial,
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 2,
            Self::Failed => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub timeframe: Timeframe,
    pub tag: WalletTag,
    pub min_winrate: f64,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl ScrapeSettings {
    pub fn from_config(cfg: &common::config::Scraper) -> Result<Self, FetchError> {
        Ok(Self {
            timeframe: cfg.timeframe.parse()?,
            tag: cfg.wallet_tag.parse()?,
            min_winrate: cfg.min_winrate,
            max_retries: cfg.max_retries,
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        })
    }

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub normalized: usize,
    pub filtered_out: usize,
    pub normalization_failures: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub store_failures: usize,
    pub attempts: u32,
    pub duration: Duration,
}

impl RunReport {
    pub fn stored(&self) -> usize {
        self.inserted + self.replaced
    }

    pub fn failures(&self) -> usize {
        self.normalization_failures + self.store_failures
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.fetched == 0 {
            RunOutcome::Failed
        } else if self.failures() == 0 {
            RunOutcome::Success
        } else if self.stored() > 0 || self.filtered_out > 0 {
            RunOutcome::Partial
        } else {
            RunOutcome::Failed
        }
    }

    pub fn record_metrics(&self) {
        metrics::counter!("smart_money_wallets_fetched_total").increment(self.fetched as u64);
        metrics::counter!("smart_money_normalization_failures_total")
            .increment(self.normalization_failures as u64);
        metrics::counter!("smart_money_wallets_filtered_total")
            .increment(self.filtered_out as u64);
        metrics::counter!("smart_money_snapshots_upserted_total", "outcome" => "inserted")
            .increment(self.inserted as u64);
        metrics::counter!("smart_money_snapshots_upserted_total", "outcome" => "replaced")
            .increment(self.replaced as u64);
        metrics::counter!("smart_money_store_failures_total")
            .increment(self.store_failures as u64);
        metrics::histogram!("smart_money_run_duration_ms")
            .record(self.duration.as_secs_f64() * 1000.0);
        metrics::counter!("smart_money_runs_total", "outcome" => self.outcome().as_str())
            .increment(1);
    }
}

/// Fetch the ranking, retrying transient failures with exponential backoff.
/// Returns the wallets and the number of attempts made.
pub async fn fetch_with_retry<S: WalletSource>(
    source: &S,
    settings: &ScrapeSettings,
) -> Result<(Vec<Value>, u32), FetchError> {
    let mut attempt = 0u32;
    loop {
        match source
            .fetch_top_wallets(settings.timeframe, settings.tag)
            .await
        {
            Ok(wallets) => return Ok((wallets, attempt + 1)),
            Err(err) if err.is_retryable() && attempt < settings.max_retries => {
                let wait = settings.backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = settings.max_retries,
                    wait = ?wait,
                    error = %err,
                    "wallet ranking fetch failed; retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Normalize every entry against one `collected_at`, splitting successes from
/// failures. Failures carry a best-effort label for logging.
pub fn normalize_batch(
    raw: &[Value],
    timeframe: Timeframe,
    collected_at: DateTime<Utc>,
) -> (Vec<WalletSnapshot>, Vec<(String, NormalizationError)>) {
    raw.iter().fold(
        (Vec::new(), Vec::new()),
        |(mut ok, mut failed), entry| {
            match normalize_wallet(entry, timeframe, collected_at) {
                Ok(snapshot) => ok.push(snapshot),
                Err(err) => failed.push((entry_label(entry), err)),
            }
            (ok, failed)
        },
    )
}

fn entry_label(entry: &Value) -> String {
    entry
        .get("wallet_address")
        .or_else(|| entry.get("address"))
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}

/// Run one batch. Per-wallet failures are counted in the report; only fetch
/// failures and an unavailable store end the batch early.
pub async fn scrape_once<S: WalletSource>(
    store: &WalletStore,
    source: &S,
    settings: &ScrapeSettings,
    collected_at: DateTime<Utc>,
) -> Result<RunReport, ScrapeError> {
    let started = Instant::now();
    let (raw, attempts) = fetch_with_retry(source, settings).await?;
    let mut report = RunReport {
        fetched: raw.len(),
        attempts,
        ..RunReport::default()
    };

    if raw.is_empty() {
        tracing::warn!(
            timeframe = %settings.timeframe,
            tag = %settings.tag,
            "upstream returned no wallets"
        );
        report.duration = started.elapsed();
        return Ok(report);
    }

    let (snapshots, failures) = normalize_batch(&raw, settings.timeframe, collected_at);
    report.normalized = snapshots.len();
    report.normalization_failures = failures.len();
    for (wallet, err) in &failures {
        tracing::warn!(wallet = %wallet, error = %err, "skipping wallet");
    }

    for snapshot in snapshots {
        if snapshot.winrate < settings.min_winrate {
            tracing::debug!(
                address = %snapshot.address,
                winrate = snapshot.winrate,
                min_winrate = settings.min_winrate,
                "below winrate threshold"
            );
            report.filtered_out += 1;
            continue;
        }

        let address = snapshot.address.clone();
        match store.upsert(snapshot).await {
            Ok(UpsertOutcome::Inserted) => report.inserted += 1,
            Ok(UpsertOutcome::Replaced) => report.replaced += 1,
            Err(err) if err.is_unavailable() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "failed to store snapshot");
                report.store_failures += 1;
            }
        }
    }

    report.duration = started.elapsed();
    Ok(report)
}

/// [`scrape_once`] plus logging and metrics; maps the batch to an outcome.
pub async fn run_scrape<S: WalletSource>(
    store: &WalletStore,
    source: &S,
    settings: &ScrapeSettings,
    collected_at: DateTime<Utc>,
) -> RunOutcome {
    match scrape_once(store, source, settings, collected_at).await {
        Ok(report) => {
            report.record_metrics();
            let outcome = report.outcome();
            tracing::info!(
                outcome = %outcome,
                fetched = report.fetched,
                normalized = report.normalized,
                filtered_out = report.filtered_out,
                normalization_failures = report.normalization_failures,
                inserted = report.inserted,
                replaced = report.replaced,
                store_failures = report.store_failures,
                attempts = report.attempts,
                duration_ms = report.duration.as_millis() as u64,
                "scrape run finished"
            );
            outcome
        }
        Err(err) => {
            metrics::counter!("smart_money_runs_total", "outcome" => RunOutcome::Failed.as_str())
                .increment(1);
            tracing::error!(error = %err, "scrape run failed");
            RunOutcome::Failed
        }
    }
}

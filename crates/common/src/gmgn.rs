use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::types::{GmgnEnvelope, RankData, Timeframe, TokenPriceData, WalletTag};

pub const DEFAULT_BASE_URL: &str = "https://gmgn.ai";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Client for the gmgn.ai quotation API (Solana).
///
/// Each call maps failures onto [`FetchError`]; retrying is the caller's job.
pub struct GmgnClient {
    base_url: String,
    client: reqwest::Client,
}

impl GmgnClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn top_wallets_url(&self, timeframe: Timeframe, tag: WalletTag) -> Result<Url, FetchError> {
        let mut url = self.parse_url(&format!(
            "{}/defi/quotation/v1/rank/sol/wallets/{timeframe}",
            self.base_url
        ))?;
        url.query_pairs_mut()
            .append_pair("tag", tag.as_str())
            .append_pair("orderby", &format!("pnl_{timeframe}"))
            .append_pair("direction", "desc");
        Ok(url)
    }

    pub fn token_price_url(&self, token_id: &str) -> Result<Url, FetchError> {
        let mut url = self.parse_url(&format!(
            "{}/defi/quotation/v1/sol/tokens/realtime_token_price",
            self.base_url
        ))?;
        url.query_pairs_mut().append_pair("address", token_id);
        Ok(url)
    }

    /// Ranked wallets for one timeframe and tag, as raw JSON objects.
    pub async fn fetch_top_wallets(
        &self,
        timeframe: Timeframe,
        tag: WalletTag,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let url = self.top_wallets_url(timeframe, tag)?;
        let data: Option<RankData> = self.get_envelope(url).await?;
        let rank = data.unwrap_or_default().rank;
        debug!(%timeframe, %tag, count = rank.len(), "fetched wallet ranking");
        Ok(rank)
    }

    /// USD price of a token, or `None` when the provider has no price for it.
    pub async fn fetch_token_price(&self, token_id: &str) -> Result<Option<f64>, FetchError> {
        let token_id = token_id.trim();
        if token_id.is_empty() {
            return Err(FetchError::InvalidRequest("token id is empty".to_string()));
        }
        let url = self.token_price_url(token_id)?;
        let data: Option<TokenPriceData> = self.get_envelope(url).await?;
        Ok(data.and_then(|d| d.usd_price).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }))
    }

    async fn get_envelope<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, FetchError> {
        debug!(url = %url, "gmgn request");
        let started = std::time::Instant::now();
        let resp = self.client.get(url).send().await;
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("smart_money_upstream_latency_ms").record(ms);

        let resp = resp.map_err(|e| FetchError::Transient(format!("request failed: {e}")))?;
        let status = resp.status();
        metrics::counter!("smart_money_upstream_requests_total", "status" => status.as_u16().to_string())
            .increment(1);

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read response body: {e}")))?;
        parse_envelope(&body)
    }

    fn parse_url(&self, raw: &str) -> Result<Url, FetchError> {
        Url::parse(raw).map_err(|e| FetchError::InvalidRequest(format!("bad url {raw}: {e}")))
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FetchError::Transient(format!("gmgn returned {status}: {snippet}"))
    } else {
        FetchError::InvalidRequest(format!("gmgn returned {status}: {snippet}"))
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, FetchError> {
    let envelope: GmgnEnvelope<T> = serde_json::from_slice(body)
        .map_err(|e| FetchError::Transient(format!("undecodable gmgn response: {e}")))?;
    if envelope.code != 0 {
        return Err(FetchError::InvalidRequest(format!(
            "gmgn error code {}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        )));
    }
    Ok(envelope.data)
}

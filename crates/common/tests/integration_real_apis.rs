use common::gmgn::{GmgnClient, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use common::normalize::normalize_wallet;
use common::types::{Timeframe, WalletTag};
use std::time::Duration;

fn client() -> GmgnClient {
    GmgnClient::new(DEFAULT_BASE_URL, Duration::from_secs(30), DEFAULT_USER_AGENT).unwrap()
}

#[tokio::test]
#[ignore] // requires network
async fn test_fetch_real_ranking_normalizes() {
    let wallets = client()
        .fetch_top_wallets(Timeframe::SevenDays, WalletTag::SmartDegen)
        .await
        .unwrap();
    assert!(!wallets.is_empty());

    let now = chrono::Utc::now();
    let ok = wallets
        .iter()
        .filter(|w| normalize_wallet(w, Timeframe::SevenDays, now).is_ok())
        .count();
    assert!(ok > 0, "no wallet in the live ranking normalized");
}

#[tokio::test]
#[ignore] // requires network
async fn test_fetch_real_token_price() {
    // Wrapped SOL always has a price.
    let price = client()
        .fetch_token_price("So11111111111111111111111111111111111111112")
        .await
        .unwrap();
    assert!(price.is_some_and(|p| p > 0.0));
}

use common::error::FetchError;
use common::gmgn::GmgnClient;
use common::types::{Timeframe, WalletTag};
use serde_json::Value;

/// Where a scrape run gets its ranked wallets from.
pub trait WalletSource {
    fn fetch_top_wallets(
        &self,
        timeframe: Timeframe,
        tag: WalletTag,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, FetchError>> + Send;
}

impl WalletSource for GmgnClient {
    fn fetch_top_wallets(
        &self,
        timeframe: Timeframe,
        tag: WalletTag,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, FetchError>> + Send {
        GmgnClient::fetch_top_wallets(self, timeframe, tag)
    }
}

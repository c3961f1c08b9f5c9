use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "smart_money_wallets_fetched_total",
        "Wallet entries returned by the upstream ranking."
    );
    describe_counter!(
        "smart_money_normalization_failures_total",
        "Wallet entries skipped because they could not be normalized."
    );
    describe_counter!(
        "smart_money_wallets_filtered_total",
        "Wallets dropped below the winrate threshold."
    );
    describe_counter!(
        "smart_money_snapshots_upserted_total",
        "Snapshots written, by insert/replace outcome."
    );
    describe_counter!(
        "smart_money_store_failures_total",
        "Snapshots the store rejected."
    );
    describe_counter!("smart_money_runs_total", "Scrape runs, by outcome.");
    describe_histogram!(
        "smart_money_run_duration_ms",
        "Wall-clock duration of one scrape run in milliseconds."
    );
    describe_counter!(
        "smart_money_upstream_requests_total",
        "Upstream API requests, by HTTP status."
    );
    describe_histogram!(
        "smart_money_upstream_latency_ms",
        "Upstream API request latency in milliseconds."
    );
    describe_histogram!(
        "smart_money_store_query_latency_ms",
        "Store operation latency in milliseconds."
    );
    describe_counter!(
        "smart_money_store_query_errors_total",
        "Store operations that returned an error."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}

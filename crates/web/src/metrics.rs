use anyhow::Result;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn describe() {
    describe_gauge!(
        "smart_money_web_build_info",
        "Build info for the query service (value is always 1)."
    );
    describe_counter!(
        "smart_money_http_requests_total",
        "HTTP requests served, by route and status."
    );
    describe_histogram!(
        "smart_money_http_request_latency_ms",
        "HTTP request latency in milliseconds, by route."
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

/// Install a global Prometheus recorder once and return a handle for rendering `/metrics`.
///
/// `install_recorder` leaves upkeep to the caller; the `/metrics` handler runs it per scrape.
pub fn init_global() -> Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    describe();
    let installed = PrometheusBuilder::new().install_recorder()?;
    let handle = PROM_HANDLE.get_or_init(|| installed).clone();

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    ::metrics::gauge!(
        "smart_money_web_build_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "git_sha" => git_sha,
    )
    .set(1.0);

    Ok(handle)
}

/// Per-route request counter and latency histogram. Label by matched route
/// template so wallet addresses do not explode cardinality.
pub async fn track_http(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    let ms = started.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16().to_string();
    ::metrics::histogram!("smart_money_http_request_latency_ms", "route" => route.clone())
        .record(ms);
    ::metrics::counter!(
        "smart_money_http_requests_total",
        "route" => route,
        "status" => status,
    )
    .increment(1);

    response
}

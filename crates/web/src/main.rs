mod error;
mod metrics;
mod params;
mod tls;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::config::Config;
use common::error::StoreError;
use common::store::WalletStore;
use common::types::{SnapshotStats, WalletSnapshot};
use error::ApiError;
use metrics_exporter_prometheus::PrometheusHandle;
use params::WalletsParams;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    db_path: String,
    /// Opened on first use and shared; cleared when the store reports itself unavailable.
    store: Mutex<Option<WalletStore>>,
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(db_path: impl Into<String>, prometheus: Option<PrometheusHandle>) -> Self {
        Self {
            db_path: db_path.into(),
            store: Mutex::new(None),
            prometheus,
        }
    }

    /// Shared read-only store handle. A failed open is retried on the next call.
    pub async fn store(&self) -> Result<WalletStore, StoreError> {
        let mut slot = self.store.lock().await;
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = WalletStore::open_readonly(&self.db_path).await?;
        tracing::info!(path = %self.db_path, "store connected");
        *slot = Some(store.clone());
        Ok(store)
    }

    /// Pass `res` through, dropping the cached handle if the store went away.
    async fn observe<T>(&self, res: Result<T, StoreError>) -> Result<T, StoreError> {
        if matches!(&res, Err(err) if err.is_unavailable()) {
            *self.store.lock().await = None;
        }
        res
    }
}

// --- Handlers ---

async fn list_wallets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WalletsParams>,
) -> Result<Json<Vec<WalletSnapshot>>, ApiError> {
    let query = params.into_query()?;
    let store = state.store().await?;
    let rows = state.observe(store.query(query).await).await?;
    Ok(Json(rows))
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let store = state.store().await?;
    let snapshot = state.observe(store.get_by_address(&address).await).await?;
    Ok(Json(snapshot))
}

async fn wallet_stats(State(state): State<Arc<AppState>>) -> Result<Json<SnapshotStats>, ApiError> {
    let store = state.store().await?;
    let stats = state.observe(store.stats().await).await?;
    Ok(Json(stats))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let probe = match state.store().await {
        Ok(store) => state.observe(store.ping().await).await,
        Err(err) => Err(err),
    };

    match probe {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded" }),
            )
        }
    }
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = &state.prometheus else {
        return StatusCode::NOT_FOUND.into_response();
    };
    handle.run_upkeep();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

// --- Router ---

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/wallets", get(list_wallets))
        .route("/wallets/stats", get(wallet_stats))
        .route("/wallets/{address}", get(get_wallet))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route_layer(middleware::from_fn(metrics::track_http))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn config_path_arg<I>(mut args: I) -> std::result::Result<Option<String>, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                path = Some(
                    args.next()
                        .ok_or_else(|| "usage: web [--config <path>]".to_string())?,
                );
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path_arg(std::env::args()).map_err(anyhow::Error::msg)?;
    let config = Config::load(config_path.as_deref())?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("web", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let prometheus = metrics::init_global()?;
    let state = Arc::new(AppState::new(config.store.path.clone(), Some(prometheus)));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    if let Some((cert_path, key_path)) = config.server.tls_paths() {
        let tls = tls::rustls_config_from_paths(cert_path, key_path)?;
        tracing::info!(%addr, "query service listening (https)");
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await?;
    } else {
        tracing::warn!(%addr, "TLS not configured; serving plain HTTP");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use common::db::Database;
    use common::store::upsert_snapshot;
    use common::types::Timeframe;
    use tower::ServiceExt;

    fn snapshot(address: &str, winrate: f64, hour: u32) -> WalletSnapshot {
        WalletSnapshot {
            address: address.to_string(),
            tag: Some("smart_degen".to_string()),
            winrate,
            realized_profit: 100.0,
            pnl: Some(0.4),
            buy_count: 10,
            sell_count: 8,
            last_active: None,
            timeframe: Timeframe::SevenDays,
            collected_at: Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap(),
            raw: serde_json::json!({ "twitter_username": "degen" }),
        }
    }

    /// App over a temp-file store seeded with `rows`. Keep the `TempDir` alive.
    fn seeded_app(rows: &[WalletSnapshot]) -> (Router, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshots.db");
        let path = path.to_str().unwrap().to_string();

        let mut db = Database::open(&path).unwrap();
        db.run_migrations().unwrap();
        for row in rows {
            upsert_snapshot(&mut db.conn, row).unwrap();
        }
        drop(db);

        (create_router(Arc::new(AppState::new(path, None))), tmp)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_list_wallets_newest_first() {
        let (app, _tmp) = seeded_app(&[
            snapshot("a", 0.6, 8),
            snapshot("b", 0.8, 10),
            snapshot("c", 0.9, 9),
        ]);

        let (status, json) = get_json(app, "/wallets").await;

        assert_eq!(status, StatusCode::OK);
        let addresses: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["address"].as_str().unwrap())
            .collect();
        assert_eq!(addresses, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_list_wallets_min_winrate_is_inclusive() {
        let (app, _tmp) = seeded_app(&[
            snapshot("low", 0.69, 8),
            snapshot("edge", 0.7, 9),
            snapshot("high", 0.95, 10),
        ]);

        let (status, json) = get_json(app, "/wallets?min_winrate=0.7").await;

        assert_eq!(status, StatusCode::OK);
        let rows: Vec<WalletSnapshot> = serde_json::from_value(json).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|w| w.winrate >= 0.7));
    }

    #[tokio::test]
    async fn test_list_wallets_limit() {
        let (app, _tmp) = seeded_app(&[
            snapshot("a", 0.6, 8),
            snapshot("b", 0.7, 9),
            snapshot("c", 0.8, 10),
        ]);

        let (_, json) = get_json(app.clone(), "/wallets?limit=2").await;
        assert_eq!(json.as_array().unwrap().len(), 2);

        let (status, json) = get_json(app, "/wallets?limit=5000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_wallets_date_range() {
        let (app, _tmp) = seeded_app(&[snapshot("a", 0.6, 8), snapshot("b", 0.7, 23)]);

        let (_, json) = get_json(
            app.clone(),
            "/wallets?start_date=2025-03-01&end_date=2025-03-01",
        )
        .await;
        assert_eq!(json.as_array().unwrap().len(), 2);

        let (_, json) = get_json(app, "/wallets?end_date=2025-03-01T12:00:00Z").await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["address"], "a");
    }

    #[tokio::test]
    async fn test_invalid_params_are_400() {
        let (app, _tmp) = seeded_app(&[]);

        for uri in [
            "/wallets?min_winrate=abc",
            "/wallets?min_winrate=1.5",
            "/wallets?limit=0",
            "/wallets?start_date=last-week",
            "/wallets?start_date=2025-03-02&end_date=2025-03-01",
        ] {
            let (status, json) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(json["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_get_wallet_returns_latest() {
        let (app, _tmp) = seeded_app(&[snapshot("a", 0.6, 8)]);

        let (status, json) = get_json(app, "/wallets/a").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["address"], "a");
        assert_eq!(json["timeframe"], "7d");
        assert_eq!(json["raw"]["twitter_username"], "degen");
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_404() {
        let (app, _tmp) = seeded_app(&[snapshot("a", 0.6, 8)]);

        let (status, json) = get_json(app, "/wallets/unknown").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("unknown"));
    }

    #[tokio::test]
    async fn test_stats_route_is_not_an_address() {
        let (app, _tmp) = seeded_app(&[
            snapshot("a", 0.6, 8),
            snapshot("b", 0.8, 9),
        ]);

        let (status, json) = get_json(app, "/wallets/stats").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_records"], 2);
        assert_eq!(json["distinct_addresses"], 2);
        assert!((json["average_winrate"].as_f64().unwrap() - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_health_ok_with_store() {
        let (app, _tmp) = seeded_app(&[]);

        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_health_degraded_then_recovers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshots.db");
        let path = path.to_str().unwrap().to_string();
        let app = create_router(Arc::new(AppState::new(path.clone(), None)));

        let (status, json) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "degraded");

        let (status, _) = get_json(app.clone(), "/wallets").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let db = Database::open(&path).unwrap();
        db.run_migrations().unwrap();
        drop(db);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let path = tmp.path().join("snapshots.db");
        let app = create_router(Arc::new(AppState::new(
            path.to_str().unwrap(),
            Some(handle),
        )));

        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let (app, _tmp) = seeded_app(&[]);
        let req = Request::builder()
            .uri("/wallets")
            .header(header::ORIGIN, "https://dashboard.example")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[test]
    fn test_config_path_arg() {
        let args = |list: &[&str]| {
            std::iter::once("web".to_string())
                .chain(list.iter().map(ToString::to_string))
                .collect::<Vec<_>>()
                .into_iter()
        };
        assert_eq!(config_path_arg(args(&[])).unwrap(), None);
        assert_eq!(
            config_path_arg(args(&["--config", "prod.toml"])).unwrap(),
            Some("prod.toml".to_string())
        );
        assert!(config_path_arg(args(&["--config"])).is_err());
        assert!(config_path_arg(args(&["serve"])).is_err());
    }
}

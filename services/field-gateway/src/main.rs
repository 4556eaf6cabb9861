//! Dataverse Field Service Gateway
//!
//! Single-binary Rust service that:
//! 1. Acquires app-only tokens for a Dataverse environment (client credentials)
//! 2. Serves a small JSON API for contractors, bookings, work orders and photos
//! 3. Forwards each call to the Dataverse Web API with the OData headers
//! 4. Follows `@odata.nextLink` up to a page cap for collection queries

mod api;
mod config;
mod error;
mod field_service;
mod metrics;
mod schema;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::get;
use dataverse_auth::{AccessTokenSource, ClientCredentials, TokenCache};
use dataverse_client::DataverseClient;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::ApiState;
use crate::config::Config;
use crate::field_service::FieldService;
use crate::metrics::ServiceMetrics;

/// Maximum time to wait for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state for the operational endpoints
#[derive(Clone)]
struct AppState {
    api: ApiState,
    tokens: Arc<TokenCache>,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Every response passes through request tracking. The concurrency limit
/// queues requests beyond `max_connections`.
fn build_router(state: AppState, max_connections: usize, cors: Option<CorsLayer>) -> Router {
    let metrics = state.metrics.clone();
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone())
        .merge(api::build_api_router(state.api))
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            metrics::track_requests,
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections));
    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for a browser front end: `*` or a single origin.
fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(origin.trim())
            .with_context(|| format!("invalid cors_allow_origin: {origin}"))?;
        AllowOrigin::exact(value)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::PATCH, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::HeaderName::from_static(metrics::REQUEST_ID_HEADER)]))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting dataverse-field-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let dv = &config.dataverse;
    let gw = &config.gateway;
    info!(
        listen_addr = %gw.listen_addr,
        base_url = %dv.base_url,
        api_version = %dv.api_version,
        tenant_id = %dv.tenant_id,
        client_id = %dv.client_id,
        max_pages = dv.max_pages,
        allow_writes = gw.allow_writes,
        "configuration loaded"
    );
    if !gw.allow_writes {
        info!("writes disabled, PATCH and photo upload will return 403");
    }

    let cors = gw.cors_allow_origin.as_deref().map(cors_layer).transpose()?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("dataverse-field-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let credentials = ClientCredentials::for_resource(
        dv.tenant_id.clone(),
        dv.client_id.clone(),
        dv.client_secret.clone(),
        &dv.base_url,
    );
    let tokens = Arc::new(TokenCache::new(
        http.clone(),
        &dv.authority_host,
        credentials,
    ));
    let token_source: Arc<dyn AccessTokenSource> = tokens.clone();
    let dataverse = DataverseClient::new(http, &dv.base_url, &dv.api_version, token_source)
        .with_max_pages(dv.max_pages);

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        api: ApiState {
            service: Arc::new(FieldService::new(dataverse, gw.allow_writes)),
            max_upload_bytes: gw.max_upload_bytes,
        },
        tokens,
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, gw.max_connections, cors);

    let listener = TcpListener::bind(gw.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", gw.listen_addr))?;
    info!(addr = %gw.listen_addr, "accepting requests");

    let in_flight = metrics.in_flight.clone();

    // The drain deadline starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus counters and token cache state. The token itself is never included.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);
    let token = state.tokens.status().await;

    (
        axum::http::StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": uptime,
            "requests_served": requests,
            "errors_total": errors,
            "writes_enabled": state.api.service.writes_enabled(),
            "token": token,
        })
        .to_string(),
    )
}

/// Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

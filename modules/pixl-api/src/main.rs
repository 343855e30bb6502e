//! The Control API (§4.8): the one HTTP surface an operator or the CLI
//! talks to while a run is live — rate limits and export triggering. The
//! queue consumers (`pixl-coordinator`, `pixl-exporter`) run as separate
//! processes and pick up rate changes by polling the Registry rather than
//! sharing this process's memory.

mod rest;

use std::path::PathBuf;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use pixl_anon::HasherClient;
use pixl_common::Config;
use pixl_export::ReportClient;
use pixl_registry::Registry;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub registry: Registry,
    pub export_root: PathBuf,
    pub hasher: HasherClient,
    pub report_client: Option<ReportClient>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pixl=info".parse()?))
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let registry = Registry::connect(&config.database_url).await?;
    registry.migrate().await?;

    let report_client = (!config.radiology_service_url.is_empty())
        .then(|| ReportClient::new(config.radiology_service_url.clone()));

    let state = std::sync::Arc::new(AppState {
        registry,
        export_root: PathBuf::from(config.export_root.clone()),
        hasher: HasherClient::new(config.hasher_url.clone()),
        report_client,
    });

    let app = Router::new()
        .route("/heart-beat", get(rest::heart_beat))
        .route(
            "/token-bucket-refresh-rate",
            get(rest::get_rate).post(rest::set_rate),
        )
        .route("/export-patient-data", post(rest::export_patient_data))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("pixl-api starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

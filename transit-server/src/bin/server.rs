use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use transit_core::geo_client::{GeoClient, HttpGeoClient, NoopGeoClient};
use transit_core::topology_client::{ContentApiTopologyClient, TopologyClient};
use transit_server::config::AppConfig;
use transit_server::routes::{manifest, spawn, telemetry};
use transit_server::state::AppState;
use transit_server::telemetry::DeviceTelemetryStore;
use transit_store::config_loader::{ConfigLoader, ContentApiConfigSource};
use transit_store::content_client::create_client;
use transit_store::passenger_repository::{ContentApiPassengerRepository, PassengerRepositoryTrait};

fn build_cors(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let parsed = origins.split(',').filter_map(|o| o.trim().parse().ok()).collect::<Vec<_>>();

    CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        manifest::list_manifest,
        manifest::barchart,
        manifest::table,
        manifest::stats,
        manifest::delete_manifest,
        telemetry::devices,
        telemetry::health,
    ),
    components(schemas(
        transit_server::model::ManifestResponse,
        transit_server::model::BarchartResponse,
        transit_server::model::BarchartBucket,
        transit_server::model::StatsResponse,
        transit_server::model::DeleteManifestResponse,
        transit_server::model::DeviceRow,
        transit_server::model::TelemetryHealthResponse,
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env();
    tracing_subscriber::registry().with(fmt::layer()).with(env_filter).try_init().ok();

    let config = AppConfig::parse();
    config.validate()?;

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let content_api_client = create_client(config.strapi_token.clone());

    let repository: Arc<dyn PassengerRepositoryTrait> =
        Arc::new(ContentApiPassengerRepository::new(content_api_client.clone(), config.strapi_url.clone()));

    let topology_client: Arc<dyn TopologyClient> =
        Arc::new(ContentApiTopologyClient::new(content_api_client.clone(), config.strapi_url.clone()));

    let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(ContentApiConfigSource::new(
        content_api_client.clone(),
        config.strapi_url.clone(),
    ))));

    let geo_client: Arc<dyn GeoClient> = match config.geospatial_base_url() {
        Some(url) => Arc::new(HttpGeoClient::new(url)),
        None => {
            tracing::warn!("no GEOSPATIAL_URL/GEO_URL configured, spatial queries will return empty results");
            Arc::new(NoopGeoClient)
        }
    };

    let device_telemetry = Arc::new(DeviceTelemetryStore::seeded(Utc::now(), 52.52, 13.405));

    let state = AppState {
        repository: repository.clone(),
        geo_client,
        topology_client,
        config_loader,
        device_telemetry,
        auth_token: config.auth_token.clone(),
        stale_after_sec: config.stale_after_sec,
        geocode_concurrency: config.geocode_concurrency,
    };

    tokio::spawn(transit_server::janitor::run(repository));

    let app = Router::new()
        .route("/api/manifest", get(manifest::list_manifest).delete(manifest::delete_manifest))
        .route("/api/manifest/visualization/barchart", get(manifest::barchart))
        .route("/api/manifest/visualization/table", get(manifest::table))
        .route("/api/manifest/stats", get(manifest::stats))
        .route("/spawn/route/:route_id", get(spawn::spawn_route))
        .route("/api/telemetry/devices", get(telemetry::devices))
        .route("/api/telemetry/health", get(telemetry::health))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.cors_origins))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "transit-server listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

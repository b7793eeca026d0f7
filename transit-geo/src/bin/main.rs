use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use transit_geo::routes::{geocode, geofence, spatial};
use transit_geo::store::SpatialStore;
use transit_geo::{InMemorySpatialStore, PostgisSpatialStore};

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
struct AppConfig {
    #[arg(long, env("DATABASE_URL"))]
    database_url: Option<String>,

    #[arg(long, env("PORT"), default_value_t = 8082)]
    port: u16,

    #[arg(long, env("CORS_ORIGINS"), default_value = "*")]
    cors_origins: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    latency_ms: f64,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        latency_ms: 0.0,
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(
        spatial::route_geometry,
        spatial::nearby_buildings,
        spatial::depot_catchment,
        spatial::buildings_along_route,
        geocode::reverse_geocode,
        geofence::geofence_check,
    ),
    components(schemas(
        transit_geo::model::RouteGeometryResponse,
        transit_geo::model::NearbyBuildingsResponse,
        transit_geo::model::BuildingHit,
        transit_geo::model::BuildingsAlongRouteRequest,
        transit_geo::model::ReverseGeocodeRequest,
        transit_geo::model::ReverseGeocodeResponse,
        transit_geo::model::GeofenceCheckRequest,
        transit_geo::model::GeofenceCheckResponse,
        transit_geo::model::ErrorBody,
    ))
)]
struct ApiDoc;

fn build_cors(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let parsed = origins
        .split(',')
        .filter_map(|o| o.trim().parse().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env();
    tracing_subscriber::registry().with(fmt::layer()).with(env_filter).try_init().ok();

    let config = AppConfig::parse();

    let store: Arc<dyn SpatialStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("connecting to PostGIS backend");
            let pool = sqlx::PgPool::connect(url).await?;
            Arc::new(PostgisSpatialStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory spatial store (no persistence)");
            Arc::new(InMemorySpatialStore::new())
        }
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/spatial/route-geometry/:route_id", get(spatial::route_geometry))
        .route("/spatial/nearby-buildings", get(spatial::nearby_buildings))
        .route("/spatial/depot-catchment", get(spatial::depot_catchment))
        .route("/spatial/buildings-along-route", post(spatial::buildings_along_route))
        .route("/geocode/reverse", post(geocode::reverse_geocode))
        .route("/geofence/check", post(geofence::geofence_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.cors_origins))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "transit-geo listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

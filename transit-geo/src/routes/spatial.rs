use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use transit_domain::{LatLon, RouteId, SpawnError};

use crate::error::ApiError;
use crate::model::{
    BuildingHit, BuildingsAlongRouteRequest, DepotCatchmentQuery, NearbyBuildingsQuery, NearbyBuildingsResponse, RouteGeometryResponse,
};
use crate::store::SpatialStore;

pub type SharedStore = Arc<dyn SpatialStore>;

#[utoipa::path(
    get,
    path = "/spatial/route-geometry/{routeId}",
    params(("routeId" = String, Path, description = "Route identifier")),
    responses((status = 200, body = RouteGeometryResponse), (status = 404, description = "route not found"))
)]
pub async fn route_geometry(State(store): State<SharedStore>, Path(route_id): Path<String>) -> Result<Json<RouteGeometryResponse>, ApiError> {
    let route = store
        .route_geometry(&RouteId(route_id.clone()))
        .await?
        .ok_or_else(|| SpawnError::Geometry(format!("unknown route: {route_id}")))?;

    let length_m = route.total_length_m();
    let coordinates = route.polyline.iter().map(|p| (*p).into()).collect();

    Ok(Json(RouteGeometryResponse { coordinates, length_m }))
}

#[utoipa::path(
    get,
    path = "/spatial/nearby-buildings",
    params(NearbyBuildingsQuery),
    responses((status = 200, body = NearbyBuildingsResponse))
)]
pub async fn nearby_buildings(
    State(store): State<SharedStore>,
    Query(query): Query<NearbyBuildingsQuery>,
) -> Result<Json<NearbyBuildingsResponse>, ApiError> {
    let start = Instant::now();
    let point = LatLon::new(query.lat, query.lon);
    let hits = store.nearby_buildings(point, query.radius_meters, query.limit).await?;

    let buildings = hits
        .into_iter()
        .map(|(b, d)| BuildingHit {
            id: b.id,
            lat: b.location.lat,
            lon: b.location.lon,
            distance_m: d,
        })
        .collect();

    Ok(Json(NearbyBuildingsResponse {
        buildings,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

#[utoipa::path(
    get,
    path = "/spatial/depot-catchment",
    params(DepotCatchmentQuery),
    responses((status = 200, body = NearbyBuildingsResponse))
)]
pub async fn depot_catchment(
    State(store): State<SharedStore>,
    Query(query): Query<DepotCatchmentQuery>,
) -> Result<Json<NearbyBuildingsResponse>, ApiError> {
    let start = Instant::now();
    let point = LatLon::new(query.lat, query.lon);
    let buildings = store.depot_catchment(point, query.radius_meters, query.limit).await?;

    let hits = buildings
        .into_iter()
        .map(|b| {
            let distance_m = transit_domain::geometry::haversine_m(point, b.location);
            BuildingHit {
                id: b.id,
                lat: b.location.lat,
                lon: b.location.lon,
                distance_m,
            }
        })
        .collect();

    Ok(Json(NearbyBuildingsResponse {
        buildings: hits,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

/// Accepts the caller's own polyline rather than a route identifier —
/// spawners already hold the geometry in hand (§4.2 "Buildings along
/// route | polyline, buffer, limit"), and route-registration would be a
/// needless round trip back through `route_geometry`.
#[utoipa::path(
    post,
    path = "/spatial/buildings-along-route",
    request_body = BuildingsAlongRouteRequest,
    responses((status = 200, body = NearbyBuildingsResponse), (status = 400, description = "empty polyline"))
)]
pub async fn buildings_along_route(
    State(store): State<SharedStore>,
    Json(body): Json<BuildingsAlongRouteRequest>,
) -> Result<Json<NearbyBuildingsResponse>, ApiError> {
    let start = Instant::now();

    if body.coordinates.is_empty() {
        return Err(SpawnError::Validation("coordinates must not be empty".into()).into());
    }

    let polyline: Vec<LatLon> = body.coordinates.iter().map(|[lon, lat]| LatLon::new(*lat, *lon)).collect();
    let buildings = store.buildings_along_route(&polyline, body.buffer_meters, body.limit).await?;

    let hits = buildings
        .into_iter()
        .map(|b| {
            let distance_m = polyline
                .iter()
                .map(|v| transit_domain::geometry::haversine_m(*v, b.location))
                .fold(f64::INFINITY, f64::min);
            BuildingHit {
                id: b.id,
                lat: b.location.lat,
                lon: b.location.lon,
                distance_m,
            }
        })
        .collect();

    Ok(Json(NearbyBuildingsResponse {
        buildings: hits,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

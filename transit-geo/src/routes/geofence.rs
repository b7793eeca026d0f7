use std::time::Instant;

use axum::extract::State;
use axum::Json;
use transit_domain::LatLon;

use crate::error::ApiError;
use crate::model::{GeofenceCheckRequest, GeofenceCheckResponse};
use crate::routes::spatial::SharedStore;

#[utoipa::path(
    post,
    path = "/geofence/check",
    request_body = GeofenceCheckRequest,
    responses((status = 200, body = GeofenceCheckResponse))
)]
pub async fn geofence_check(
    State(store): State<SharedStore>,
    Json(req): Json<GeofenceCheckRequest>,
) -> Result<Json<GeofenceCheckResponse>, ApiError> {
    let start = Instant::now();
    let point = LatLon::new(req.latitude, req.longitude);

    let result = store.geofence_check(point).await?;

    Ok(Json(GeofenceCheckResponse {
        inside_region: result.inside_region,
        inside_landuse: result.inside_landuse,
        region_name: result.region_name,
        landuse_kind: result.landuse_kind,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

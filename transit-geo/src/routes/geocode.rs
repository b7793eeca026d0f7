use std::time::Instant;

use axum::extract::State;
use axum::Json;
use transit_domain::LatLon;

use crate::error::ApiError;
use crate::model::{ReverseGeocodeRequest, ReverseGeocodeResponse};
use crate::routes::spatial::SharedStore;

#[utoipa::path(
    post,
    path = "/geocode/reverse",
    request_body = ReverseGeocodeRequest,
    responses((status = 200, body = ReverseGeocodeResponse))
)]
pub async fn reverse_geocode(
    State(store): State<SharedStore>,
    Json(req): Json<ReverseGeocodeRequest>,
) -> Result<Json<ReverseGeocodeResponse>, ApiError> {
    let start = Instant::now();
    let point = LatLon::new(req.latitude, req.longitude);

    let result = store
        .reverse_geocode(point, req.highway_radius_meters, req.poi_radius_meters)
        .await?;

    Ok(Json(ReverseGeocodeResponse {
        address: result.address,
        nearest_highway: result.nearest_highway,
        nearest_poi: result.nearest_poi,
        parish: result.parish,
        latency_ms: start.elapsed().as_secs_f64() * 1000.0,
    }))
}

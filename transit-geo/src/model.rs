//! Wire DTOs for the geospatial service's HTTP surface. Kept distinct from
//! `transit_domain::model` because these shapes are the external contract
//! (`lon,lat` coordinate pairs, flat query params) rather than the internal
//! domain representation.

use serde::{Deserialize, Serialize};
use transit_domain::{BuildingId, LatLon};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteGeometryResponse {
    /// `[lon, lat]` pairs, matching GeoJSON coordinate order.
    pub coordinates: Vec<[f64; 2]>,
    pub length_m: f64,
}

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct NearbyBuildingsQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_meters: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
pub struct DepotCatchmentQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_meters: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BuildingsAlongRouteRequest {
    /// `[lon, lat]` pairs, matching GeoJSON coordinate order.
    pub coordinates: Vec<[f64; 2]>,
    pub buffer_meters: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BuildingHit {
    pub id: BuildingId,
    pub lat: f64,
    pub lon: f64,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NearbyBuildingsResponse {
    pub buildings: Vec<BuildingHit>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReverseGeocodeRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_highway_radius")]
    pub highway_radius_meters: f64,
    #[serde(default = "default_poi_radius")]
    pub poi_radius_meters: f64,
}

fn default_highway_radius() -> f64 {
    200.0
}

fn default_poi_radius() -> f64 {
    100.0
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReverseGeocodeResponse {
    pub address: String,
    pub nearest_highway: Option<String>,
    pub nearest_poi: Option<String>,
    pub parish: Option<String>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GeofenceCheckRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeofenceCheckResponse {
    pub inside_region: bool,
    pub inside_landuse: bool,
    pub region_name: Option<String>,
    pub landuse_kind: Option<String>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<LatLon> for [f64; 2] {
    fn from(value: LatLon) -> Self {
        [value.lon, value.lat]
    }
}

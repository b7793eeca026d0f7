//! Request/response DTOs for the HTTP surfaces in [`crate::routes`] (§6).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use transit_core::manifest::ManifestRow;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ManifestQuery {
    pub route: Option<String>,
    pub depot: Option<String>,
    pub status: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    /// `asc` (default) or `desc`, ordering by `route_position_m`.
    pub sort: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManifestResponse {
    pub rows: Vec<ManifestRow>,
    pub total: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BarchartQuery {
    pub date: NaiveDate,
    pub route: String,
    pub start_hour: Option<u32>,
    pub end_hour: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BarchartBucket {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BarchartResponse {
    pub buckets: Vec<BarchartBucket>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TableQuery {
    pub date: NaiveDate,
    pub route: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsQuery {
    pub date: NaiveDate,
    pub route: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_passengers: usize,
    pub avg_travel_distance_m: f64,
    pub by_status: HashMap<String, usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteManifestQuery {
    pub route: String,
    pub confirm: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteManifestResponse {
    pub cancelled: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SpawnQuery {
    /// `HH:MM:SS`; defaults to the current time when omitted.
    pub time: Option<String>,
    /// Weekday name, e.g. `Monday`; defaults to today when omitted.
    pub day: Option<String>,
    /// Time window in minutes the spawn calculation covers.
    pub window: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceRow {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub stale: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TelemetryHealthResponse {
    pub device_count: usize,
    pub stale_count: usize,
    pub stale_after_sec: u64,
}

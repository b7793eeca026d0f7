use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::cumulative_arc_length_m;
use crate::ids::{BuildingId, DepotId, PassengerId, RouteId};

/// A `(lat, lon)` point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A route's polyline geometry plus its derived, monotonically non-decreasing
/// cumulative arc-length table (first element is always `0.0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub short_name: String,
    pub polyline: Vec<LatLon>,
}

impl Route {
    pub fn new(id: RouteId, short_name: impl Into<String>, polyline: Vec<LatLon>) -> Self {
        Self {
            id,
            short_name: short_name.into(),
            polyline,
        }
    }

    /// Cumulative arc-length in meters from the first vertex to every vertex.
    /// Invariant: monotonically non-decreasing, first element is `0.0`.
    pub fn cumulative_lengths_m(&self) -> Vec<f64> {
        cumulative_arc_length_m(&self.polyline)
    }

    pub fn total_length_m(&self) -> f64 {
        self.cumulative_lengths_m().last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depot {
    pub id: DepotId,
    pub name: String,
    pub location: LatLon,
    pub served_routes: Vec<RouteId>,
}

/// Opaque building identifier plus its location. Treated as a population proxy;
/// whether a building falls inside a buffer or catchment is decided by the
/// geospatial service, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub location: LatLon,
}

/// Which base rate a [`SpawnConfig`] lookup should use — route-scoped
/// `spatial_base` or the depot-specific rate, when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnerKind {
    Route,
    Depot,
}

/// A versioned, route- or country-scoped bundle of spawn-tuning options.
/// Every lookup helper documents its default so callers never need to
/// special-case a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub version: u32,
    /// Base passengers per building per hour for route-context spawning.
    pub spatial_base: f64,
    /// Base passengers per building per hour for depot-context spawning.
    /// Falls back to `spatial_base` when absent, per the original's
    /// route/depot rate split.
    pub depot_passengers_per_building_per_hour: Option<f64>,
    /// Per-hour multiplier, index 0..=23. Default 1.0 when missing.
    pub hourly_rates: [Option<f64>; 24],
    /// Per-weekday multiplier, index 0..=6 (0 = Monday, 6 = Sunday). Default 1.0.
    pub day_multipliers: [Option<f64>; 7],
    pub spawn_radius_meters: f64,
    pub depot_catchment_radius_meters: f64,
    pub min_spawn_interval_seconds: u32,
    pub max_spawns_per_cycle: u32,
}

impl SpawnConfig {
    /// A config with every rate defaulted to 1.0/sane values, used when a
    /// route or depot has no bundle of its own (original's embedded default
    /// dict in `DepotSpawner._load_spawn_config`).
    pub fn defaults() -> Self {
        Self {
            version: 0,
            spatial_base: 0.3,
            depot_passengers_per_building_per_hour: None,
            hourly_rates: [None; 24],
            day_multipliers: [None; 7],
            spawn_radius_meters: 500.0,
            depot_catchment_radius_meters: 800.0,
            min_spawn_interval_seconds: 60,
            max_spawns_per_cycle: 500,
        }
    }

    pub fn hourly_rate(&self, hour: u8) -> f64 {
        self.hourly_rates
            .get(hour as usize)
            .copied()
            .flatten()
            .unwrap_or(1.0)
    }

    pub fn day_multiplier(&self, weekday: u8) -> f64 {
        self.day_multipliers
            .get(weekday as usize)
            .copied()
            .flatten()
            .unwrap_or(1.0)
    }

    pub fn base_rate(&self, kind: SpawnerKind) -> f64 {
        match kind {
            SpawnerKind::Route => self.spatial_base,
            SpawnerKind::Depot => self
                .depot_passengers_per_building_per_hour
                .unwrap_or(self.spatial_base),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpawnContext {
    Route,
    Depot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Produced by a spawner, consumed by a [`crate::ids`]-keyed reservoir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub passenger_id: Option<PassengerId>,
    pub spawn_location: LatLon,
    pub destination_location: LatLon,
    pub route_id: RouteId,
    pub depot_id: Option<DepotId>,
    pub direction: Option<Direction>,
    pub spawn_time: DateTime<Utc>,
    pub spawn_context: SpawnContext,
    pub generation_method: String,
    pub priority: f64,
}

impl SpawnRequest {
    /// Returns a copy with `passenger_id` filled in if it was absent — the
    /// reservoir's `push` contract (spec ownership rule: a request is
    /// materialized with an id before it is ever persisted).
    pub fn with_generated_id(mut self) -> Self {
        if self.passenger_id.is_none() {
            self.passenger_id = Some(PassengerId::generate());
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassengerStatus {
    Waiting,
    Boarded,
    Alighted,
    Expired,
    Cancelled,
}

impl PassengerStatus {
    /// WAITING -> BOARDED -> ALIGHTED is the only monotonic chain; EXPIRED and
    /// CANCELLED are terminal and reachable only from WAITING.
    pub fn can_transition_to(self, next: PassengerStatus) -> bool {
        use PassengerStatus::*;
        matches!(
            (self, next),
            (Waiting, Boarded) | (Boarded, Alighted) | (Waiting, Expired) | (Waiting, Cancelled)
        )
    }
}

pub const DEFAULT_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: PassengerId,
    pub route_id: RouteId,
    pub depot_id: Option<DepotId>,
    pub spawn_location: LatLon,
    pub destination_location: LatLon,
    pub destination_name: String,
    pub spawn_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PassengerStatus,
    pub priority: i32,
    pub route_position_m: Option<f64>,
    pub direction: Option<Direction>,
}

impl Passenger {
    pub fn from_request(req: SpawnRequest, destination_name: impl Into<String>, ttl_minutes: i64) -> Self {
        let req = req.with_generated_id();
        let spawn_time = req.spawn_time;
        Passenger {
            id: req.passenger_id.expect("generated above"),
            route_id: req.route_id,
            depot_id: req.depot_id,
            spawn_location: req.spawn_location,
            destination_location: req.destination_location,
            destination_name: destination_name.into(),
            spawn_time,
            expires_at: spawn_time + chrono::Duration::minutes(ttl_minutes),
            status: PassengerStatus::Waiting,
            priority: req.priority.round() as i32,
            route_position_m: None,
            direction: req.direction,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

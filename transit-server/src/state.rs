//! Shared application state, built once at startup and cloned (cheaply,
//! via `Arc` fields) into every axum handler — the same shape
//! `transit-geo`'s `SharedStore` extractor uses, generalized to the
//! several collaborators this server wires together.

use std::sync::Arc;

use transit_core::geo_client::GeoClient;
use transit_core::reservoir::{Reservoir, ReservoirScope};
use transit_core::spawner::depot_spawner::DepotSpawner;
use transit_core::spawner::route_spawner::RouteSpawner;
use transit_core::topology_client::TopologyClient;
use transit_domain::{DepotId, LatLon, RouteId};
use transit_store::{ConfigLoader, PassengerRepositoryTrait};

use crate::telemetry::DeviceTelemetryStore;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn PassengerRepositoryTrait>,
    pub geo_client: Arc<dyn GeoClient>,
    pub topology_client: Arc<dyn TopologyClient>,
    pub config_loader: Arc<ConfigLoader>,
    pub device_telemetry: Arc<DeviceTelemetryStore>,
    pub auth_token: Option<String>,
    pub stale_after_sec: u64,
    pub geocode_concurrency: usize,
}

impl AppState {
    /// A fresh [`RouteSpawner`] scoped to `route_id`. Cheap: the spawner's
    /// own caches start empty and every collaborator is a shared `Arc`, so
    /// building one per request costs an allocation, not a connection.
    pub fn route_spawner(&self, route_id: RouteId) -> RouteSpawner {
        let reservoir = Reservoir::new(ReservoirScope::Route(route_id.clone()), self.repository.clone());
        RouteSpawner::new(route_id, self.config_loader.clone(), self.geo_client.clone(), self.topology_client.clone(), reservoir)
    }

    pub fn depot_spawner(&self, depot_id: DepotId, depot_location: LatLon) -> DepotSpawner {
        let reservoir = Reservoir::new(ReservoirScope::Depot(depot_id.clone()), self.repository.clone());
        DepotSpawner::new(
            depot_id,
            depot_location,
            self.config_loader.clone(),
            self.geo_client.clone(),
            self.topology_client.clone(),
            reservoir,
        )
    }
}

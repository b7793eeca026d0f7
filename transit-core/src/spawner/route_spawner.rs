//! Generates passengers along a transit route using the hybrid spawn model
//! (§4.6 RouteSpawner). Ported from
//! `original_source/commuter_simulator/core/domain/spawner_engine/route_spawner.py`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use transit_domain::spawn_calculator::calculate_hybrid_spawn;
use transit_domain::{LatLon, PassengerId, Route, RouteId, SpawnConfig, SpawnContext, SpawnRequest, SpawnerKind};
use transit_store::{ConfigLoader, Ctx};

use crate::geo_client::GeoClient;
use crate::reservoir::Reservoir;
use crate::spawner::{Spawner, SpawnerState, SpawnerStats};
use crate::topology_client::TopologyClient;

/// Caches that live for the spawner's lifetime, not per-cycle — mirrors the
/// original's `self._route_geometry_cache`/`self._depot_catchment_cache`/
/// `self._total_buildings_all_routes_cache`, none of which expire on their
/// own (§4.6 step 1: "Load (or read cached)").
#[derive(Default)]
struct RouteSpawnerCaches {
    route_geometry: Option<Route>,
    depot_catchment_buildings: Option<u32>,
    total_buildings_all_routes: Option<u32>,
}

#[derive(Debug)]
pub struct RouteSpawner {
    route_id: RouteId,
    config_loader: Arc<ConfigLoader>,
    geo_client: Arc<dyn GeoClient>,
    topology_client: Arc<dyn TopologyClient>,
    reservoir: Reservoir,
    caches: Mutex<RouteSpawnerCaches>,
    state: Mutex<SpawnerState>,
    total_spawned: AtomicU64,
    spawn_errors: AtomicU64,
}

impl std::fmt::Debug for RouteSpawnerCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSpawnerCaches").finish()
    }
}

impl RouteSpawner {
    pub fn new(
        route_id: RouteId,
        config_loader: Arc<ConfigLoader>,
        geo_client: Arc<dyn GeoClient>,
        topology_client: Arc<dyn TopologyClient>,
        reservoir: Reservoir,
    ) -> Self {
        Self {
            route_id,
            config_loader,
            geo_client,
            topology_client,
            reservoir,
            caches: Mutex::new(RouteSpawnerCaches::default()),
            state: Mutex::new(SpawnerState::Idle),
            total_spawned: AtomicU64::new(0),
            spawn_errors: AtomicU64::new(0),
        }
    }

    async fn set_state(&self, state: SpawnerState) {
        *self.state.lock().await = state;
    }

    async fn route_geometry(&self) -> anyhow::Result<Option<Route>> {
        let mut caches = self.caches.lock().await;
        if let Some(route) = &caches.route_geometry {
            return Ok(Some(route.clone()));
        }
        let fetched = self.geo_client.route_geometry(&self.route_id).await?;
        if let Some(route) = &fetched {
            caches.route_geometry = Some(route.clone());
        }
        Ok(fetched)
    }

    /// Buildings in the depot's catchment, plus the total across every
    /// route sharing that depot — used to compute zero-sum route
    /// attractiveness (§4.1). Returns `(0, 0)` when no depot is associated
    /// with this route, the caller's cue to fall back to route-only mode.
    async fn depot_context(&self, config: &SpawnConfig) -> anyhow::Result<(u32, u32)> {
        {
            let caches = self.caches.lock().await;
            if let (Some(depot), Some(total)) = (caches.depot_catchment_buildings, caches.total_buildings_all_routes) {
                return Ok((depot, total));
            }
        }

        let Some(depot) = self.topology_client.depot_for_route(&self.route_id).await? else {
            warn!(route_id = %self.route_id, "no depot found for route, using route-only mode");
            return Ok((0, 0));
        };

        let depot_buildings = self
            .geo_client
            .depot_catchment(depot.location, config.depot_catchment_radius_meters, 5000)
            .await?
            .len() as u32;

        let route_ids = self.topology_client.routes_for_depot(&depot.id).await?;
        if route_ids.is_empty() {
            warn!(depot_id = %depot.id, "no routes found for depot");
            return Ok((0, 0));
        }

        let mut total_buildings = 0u32;
        for route_id in &route_ids {
            let Some(route) = self.geo_client.route_geometry(route_id).await? else {
                continue;
            };
            let count = self
                .geo_client
                .buildings_along_route(&route.polyline, config.spawn_radius_meters, 5000)
                .await?
                .len() as u32;
            total_buildings += count;
        }

        let mut caches = self.caches.lock().await;
        caches.depot_catchment_buildings = Some(depot_buildings);
        caches.total_buildings_all_routes = Some(total_buildings);
        Ok((depot_buildings, total_buildings))
    }

    fn materialize(&self, spawn_count: u32, route: &Route, current_time: DateTime<Utc>) -> Vec<SpawnRequest> {
        let mut rng = rand::thread_rng();
        let last_idx = route.polyline.len().saturating_sub(1);
        if last_idx == 0 {
            return Vec::new();
        }

        (0..spawn_count)
            .map(|_| {
                let board_idx = rng.gen_range(0..=last_idx);
                let alight_idx = rng.gen_range(board_idx..=last_idx);

                SpawnRequest {
                    passenger_id: Some(PassengerId::generate()),
                    spawn_location: route.polyline[board_idx],
                    destination_location: route.polyline[alight_idx],
                    route_id: self.route_id.clone(),
                    depot_id: None,
                    direction: None,
                    spawn_time: current_time,
                    spawn_context: SpawnContext::Route,
                    generation_method: "poisson".into(),
                    priority: 1.0,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Spawner for RouteSpawner {
    fn name(&self) -> &'static str {
        "routespawner"
    }

    async fn spawn(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<Vec<SpawnRequest>> {
        let result = self.spawn_inner(current_time, time_window_minutes).await;

        match &result {
            Ok(reqs) => {
                self.set_state(SpawnerState::Idle).await;
                self.total_spawned.fetch_add(reqs.len() as u64, Ordering::SeqCst);
            }
            Err(err) => {
                self.set_state(SpawnerState::Failed).await;
                self.spawn_errors.fetch_add(1, Ordering::SeqCst);
                warn!(route_id = %self.route_id, error = %err, "route spawner cycle failed");
                self.set_state(SpawnerState::Idle).await;
            }
        }

        result
    }

    async fn spawn_and_store(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<usize> {
        let reqs = self.spawn(current_time, time_window_minutes).await?;
        let result = self.reservoir.push_batch(reqs).await?;
        Ok(result.ok)
    }

    async fn stats(&self) -> SpawnerStats {
        SpawnerStats {
            total_spawned: self.total_spawned.load(Ordering::SeqCst),
            spawn_errors: self.spawn_errors.load(Ordering::SeqCst),
        }
    }
}

impl RouteSpawner {
    async fn spawn_inner(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<Vec<SpawnRequest>> {
        self.set_state(SpawnerState::LoadingConfig).await;
        let key = transit_domain::ConfigKey::Route(self.route_id.clone());
        let config = self.config_loader.get(&Ctx::Anonymous, &key).await?;

        self.set_state(SpawnerState::LoadingGeometry).await;
        let Some(route) = self.route_geometry().await? else {
            return Err(transit_domain::SpawnError::Geometry(format!("no route geometry for {}", self.route_id)).into());
        };
        if route.polyline.is_empty() {
            return Err(transit_domain::SpawnError::Geometry(format!("empty polyline for {}", self.route_id)).into());
        }

        self.set_state(SpawnerState::QueryingSpatial).await;
        let buildings_along_route = self
            .geo_client
            .buildings_along_route(&route.polyline, config.spawn_radius_meters, 5000)
            .await?
            .len() as u32;

        let (depot_buildings, total_buildings) = self.depot_context(&config).await?;

        let (b_depot, b_route, b_total) = if depot_buildings == 0 || total_buildings == 0 {
            info!(route_id = %self.route_id, "depot data unavailable, using route-only mode (attractiveness=1.0)");
            (buildings_along_route, buildings_along_route, buildings_along_route)
        } else {
            (depot_buildings, buildings_along_route, total_buildings)
        };

        self.set_state(SpawnerState::Calculating).await;
        let mut rng = rand::thread_rng();
        let result = calculate_hybrid_spawn(
            &mut rng,
            b_depot,
            b_route,
            b_total,
            &config,
            config.base_rate(SpawnerKind::Route),
            current_time,
            time_window_minutes,
        )
        .map_err(anyhow::Error::from)?;

        info!(
            route_id = %self.route_id,
            spawn_count = result.spawn_count.unwrap_or(0),
            lambda = result.lambda_param.unwrap_or(0.0),
            "route spawn kernel result"
        );

        self.set_state(SpawnerState::Materializing).await;
        Ok(self.materialize(result.spawn_count.unwrap_or(0), &route, current_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_domain::{Building, BuildingId, SpawnConfig};
    use transit_store::InMemoryConfigSource;
    use transit_store::InMemoryPassengerRepository;

    use crate::geo_client::InMemoryGeoClient;
    use crate::reservoir::ReservoirScope;
    use crate::topology_client::InMemoryTopologyClient;

    fn route_with_vertices(id: &str, n: usize) -> Route {
        let polyline = (0..n).map(|i| LatLon::new(52.0 + i as f64 * 0.001, 13.0)).collect();
        Route::new(RouteId(id.to_string()), id, polyline)
    }

    fn make_spawner(route: Route, config: SpawnConfig, geo: Arc<InMemoryGeoClient>) -> RouteSpawner {
        let route_id = route.id.clone();
        geo.seed_route(route);

        let mut configs = std::collections::HashMap::new();
        configs.insert(transit_domain::ConfigKey::Route(route_id.clone()), config);
        let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(configs))));

        let topology = Arc::new(InMemoryTopologyClient::new());
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Route(route_id.clone()), repo);

        RouteSpawner::new(route_id, config_loader, geo, topology, reservoir)
    }

    #[tokio::test]
    async fn empty_route_polyline_yields_geometry_error() {
        let spawner = make_spawner(route_with_vertices("ghost", 0), SpawnConfig::defaults(), Arc::new(InMemoryGeoClient::new()));
        let err = spawner.spawn(Utc::now(), 60).await.unwrap_err();
        assert!(err.downcast_ref::<transit_domain::SpawnError>().is_some());
        assert_eq!(spawner.stats().await.spawn_errors, 1);
    }

    #[tokio::test]
    async fn unseeded_route_yields_geometry_error() {
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let route_id = RouteId("missing".into());
        let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(
            [(transit_domain::ConfigKey::Route(route_id.clone()), SpawnConfig::defaults())].into(),
        ))));
        let spawner = RouteSpawner::new(
            route_id.clone(),
            config_loader,
            Arc::new(InMemoryGeoClient::new()),
            Arc::new(InMemoryTopologyClient::new()),
            Reservoir::new(ReservoirScope::Route(route_id), repo),
        );

        let err = spawner.spawn(Utc::now(), 60).await.unwrap_err();
        assert!(err.downcast_ref::<transit_domain::SpawnError>().is_some());
    }

    #[tokio::test]
    async fn zero_buildings_yields_zero_passengers() {
        let route = route_with_vertices("r1", 5);
        let mut config = SpawnConfig::defaults();
        config.spatial_base = 0.3;
        let spawner = make_spawner(route, config, Arc::new(InMemoryGeoClient::new()));

        let reqs = spawner.spawn(Utc::now(), 60).await.unwrap();
        assert!(reqs.is_empty());
    }

    #[tokio::test]
    async fn route_only_mode_used_when_no_depot_is_associated() {
        let route = route_with_vertices("r1", 3);
        let mut config = SpawnConfig::defaults();
        config.spatial_base = 10.0;
        config.spawn_radius_meters = 2000.0;

        let geo = Arc::new(InMemoryGeoClient::new());
        for i in 0..20 {
            geo.seed_building(Building {
                id: BuildingId(format!("b{i}")),
                location: route.polyline[0],
            });
        }

        let spawner = make_spawner(route, config, geo);

        // No depot is associated with this route, so depot_context returns
        // (0, 0) and the spawner falls back to route-only mode instead of
        // erroring or silently producing zero passengers.
        let _reqs = spawner.spawn(Utc::now(), 60).await.unwrap();
        assert_eq!(spawner.stats().await.spawn_errors, 0);
    }
}

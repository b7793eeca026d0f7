//! Generates passengers at a depot and assigns each one to a route weighted
//! by a (currently equal-weight) attractiveness score (§4.6 DepotSpawner).
//! Ported from
//! `original_source/commuter_simulator/core/domain/spawner_engine/depot_spawner.py`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use transit_domain::spawn_calculator::calculate_hybrid_spawn;
use transit_domain::{DepotId, Direction, PassengerId, RouteId, SpawnConfig, SpawnContext, SpawnRequest, SpawnerKind};
use transit_store::{ConfigLoader, Ctx};

use crate::geo_client::GeoClient;
use crate::reservoir::Reservoir;
use crate::spawner::{Spawner, SpawnerState, SpawnerStats};
use crate::topology_client::TopologyClient;

/// Attractiveness is currently equal-weight across every associated route —
/// ported verbatim from `_calculate_route_attractiveness`'s placeholder in
/// the original, which comments that a demand-model-driven weighting is a
/// follow-up, not yet implemented there either.
fn route_attractiveness_weights(route_count: usize) -> Vec<f64> {
    vec![1.0; route_count]
}

#[derive(Default)]
struct DepotSpawnerCaches {
    associated_routes: Option<Vec<RouteId>>,
    catchment_buildings: Option<u32>,
}

impl std::fmt::Debug for DepotSpawnerCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepotSpawnerCaches").finish()
    }
}

#[derive(Debug)]
pub struct DepotSpawner {
    depot_id: DepotId,
    depot_location: transit_domain::LatLon,
    config_loader: Arc<ConfigLoader>,
    geo_client: Arc<dyn GeoClient>,
    topology_client: Arc<dyn TopologyClient>,
    reservoir: Reservoir,
    caches: Mutex<DepotSpawnerCaches>,
    state: Mutex<SpawnerState>,
    total_spawned: AtomicU64,
    spawn_errors: AtomicU64,
}

impl DepotSpawner {
    /// `depot_location` is resolved once by the caller (the depot record
    /// itself, not the route-depots junction) and held for the spawner's
    /// lifetime — depots don't move, so there is nothing to re-fetch.
    pub fn new(
        depot_id: DepotId,
        depot_location: transit_domain::LatLon,
        config_loader: Arc<ConfigLoader>,
        geo_client: Arc<dyn GeoClient>,
        topology_client: Arc<dyn TopologyClient>,
        reservoir: Reservoir,
    ) -> Self {
        Self {
            depot_id,
            depot_location,
            config_loader,
            geo_client,
            topology_client,
            reservoir,
            caches: Mutex::new(DepotSpawnerCaches::default()),
            state: Mutex::new(SpawnerState::Idle),
            total_spawned: AtomicU64::new(0),
            spawn_errors: AtomicU64::new(0),
        }
    }

    async fn set_state(&self, state: SpawnerState) {
        *self.state.lock().await = state;
    }

    async fn associated_routes(&self) -> anyhow::Result<Vec<RouteId>> {
        let mut caches = self.caches.lock().await;
        if let Some(routes) = &caches.associated_routes {
            return Ok(routes.clone());
        }
        let routes = self.topology_client.routes_for_depot(&self.depot_id).await?;
        caches.associated_routes = Some(routes.clone());
        Ok(routes)
    }

    async fn catchment_buildings(&self, depot_location: transit_domain::LatLon, config: &SpawnConfig) -> anyhow::Result<u32> {
        let mut caches = self.caches.lock().await;
        if let Some(count) = caches.catchment_buildings {
            return Ok(count);
        }
        let count = self
            .geo_client
            .depot_catchment(depot_location, config.depot_catchment_radius_meters, 5000)
            .await?
            .len() as u32;
        caches.catchment_buildings = Some(count);
        Ok(count)
    }

    /// Samples `spawn_count` route assignments from a multinomial distribution
    /// over `routes`, weighted by `route_attractiveness_weights` — equivalent
    /// to the original's single `np.random.multinomial` call, expressed as
    /// repeated draws from a [`WeightedIndex`] since `rand` has no multinomial
    /// distribution of its own (documented Open Question resolution).
    fn assign_routes<R: Rng + ?Sized>(rng: &mut R, routes: &[RouteId], spawn_count: u32) -> Vec<RouteId> {
        if routes.is_empty() || spawn_count == 0 {
            return Vec::new();
        }
        let weights = route_attractiveness_weights(routes.len());
        let dist = WeightedIndex::new(&weights).expect("at least one positive weight");
        (0..spawn_count).map(|_| routes[dist.sample(rng)].clone()).collect()
    }

    fn materialize(&self, assignments: Vec<RouteId>, depot_location: transit_domain::LatLon, current_time: DateTime<Utc>) -> Vec<SpawnRequest> {
        assignments
            .into_iter()
            .map(|route_id| SpawnRequest {
                passenger_id: Some(PassengerId::generate()),
                // The original spawns passengers at the depot's own location
                // for both origin and destination, with the route trip itself
                // resolving the eventual destination (`dest_name=f"Depot {id}"`
                // placeholder in `depot_reservoir.py::push`).
                spawn_location: depot_location,
                destination_location: depot_location,
                route_id,
                depot_id: Some(self.depot_id.clone()),
                direction: Some(Direction::Outbound),
                spawn_time: current_time,
                spawn_context: SpawnContext::Depot,
                generation_method: "poisson".into(),
                priority: 1.0,
            })
            .collect()
    }

    async fn spawn_inner(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<Vec<SpawnRequest>> {
        self.set_state(SpawnerState::LoadingConfig).await;
        let key = transit_domain::ConfigKey::Route(RouteId(self.depot_id.0.clone()));
        let config = self.config_loader.get(&Ctx::Anonymous, &key).await?;

        self.set_state(SpawnerState::QueryingSpatial).await;
        let routes = self.associated_routes().await?;
        if routes.is_empty() {
            warn!(depot_id = %self.depot_id, "no routes associated with depot, skipping cycle");
            return Ok(Vec::new());
        }

        let buildings_near_depot = self.catchment_buildings(self.depot_location, &config).await?;

        self.set_state(SpawnerState::Calculating).await;
        let mut rng = rand::thread_rng();
        let result = calculate_hybrid_spawn(
            &mut rng,
            buildings_near_depot,
            buildings_near_depot,
            buildings_near_depot,
            &config,
            config.base_rate(SpawnerKind::Depot),
            current_time,
            time_window_minutes,
        )
        .map_err(anyhow::Error::from)?;

        info!(
            depot_id = %self.depot_id,
            spawn_count = result.spawn_count.unwrap_or(0),
            routes = routes.len(),
            "depot spawn kernel result"
        );

        self.set_state(SpawnerState::Materializing).await;
        let assignments = Self::assign_routes(&mut rng, &routes, result.spawn_count.unwrap_or(0));
        Ok(self.materialize(assignments, self.depot_location, current_time))
    }
}

#[async_trait]
impl Spawner for DepotSpawner {
    fn name(&self) -> &'static str {
        "depotspawner"
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
                warn!(depot_id = %self.depot_id, error = %err, "depot spawner cycle failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use transit_domain::{Building, BuildingId, Depot, LatLon};
    use transit_store::{InMemoryConfigSource, InMemoryPassengerRepository};

    use crate::geo_client::InMemoryGeoClient;
    use crate::reservoir::ReservoirScope;
    use crate::topology_client::InMemoryTopologyClient;

    fn depot_at(lat: f64, lon: f64) -> Depot {
        Depot {
            id: DepotId("d1".into()),
            name: "Main Depot".into(),
            location: LatLon::new(lat, lon),
            served_routes: Vec::new(),
        }
    }

    fn make_spawner(config: SpawnConfig, building_count: usize) -> (DepotSpawner, Arc<InMemoryTopologyClient>) {
        let depot = depot_at(52.0, 13.0);
        let depot_id = depot.id.clone();

        let topology = Arc::new(InMemoryTopologyClient::new());
        topology.associate(RouteId("r1".into()), depot.clone());
        topology.associate(RouteId("r2".into()), depot.clone());

        let geo = Arc::new(InMemoryGeoClient::new());
        for i in 0..building_count {
            geo.seed_building(Building {
                id: BuildingId(format!("b{i}")),
                location: depot.location,
            });
        }

        let mut configs = std::collections::HashMap::new();
        configs.insert(transit_domain::ConfigKey::Route(RouteId(depot_id.0.clone())), config);
        let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(configs))));

        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Depot(depot_id.clone()), repo);

        let spawner = DepotSpawner::new(depot_id, depot.location, config_loader, geo, topology.clone(), reservoir);
        (spawner, topology)
    }

    #[tokio::test]
    async fn no_associated_routes_yields_empty_cycle_without_error() {
        let depot = depot_at(52.0, 13.0);
        let depot_id = DepotId("lonely".into());
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(
            [(transit_domain::ConfigKey::Route(RouteId(depot_id.0.clone())), SpawnConfig::defaults())].into(),
        ))));
        let lonely = DepotSpawner::new(
            depot_id.clone(),
            depot.location,
            config_loader,
            Arc::new(InMemoryGeoClient::new()),
            Arc::new(InMemoryTopologyClient::new()),
            Reservoir::new(ReservoirScope::Depot(depot_id), repo),
        );

        let reqs = lonely.spawn(Utc::now(), 60).await.unwrap();
        assert!(reqs.is_empty());
        assert_eq!(lonely.stats().await.spawn_errors, 0);
    }

    #[tokio::test]
    async fn spawned_passengers_are_assigned_across_both_routes() {
        let mut config = SpawnConfig::defaults();
        config.spatial_base = 50.0;
        let (spawner, _topology) = make_spawner(config, 40);

        let reqs = spawner.spawn(Utc::now(), 60).await.unwrap();
        // not every run produces passengers, but when it does every request
        // must be assigned to one of the two routes associated with the depot.
        for req in &reqs {
            assert!(req.route_id == RouteId("r1".into()) || req.route_id == RouteId("r2".into()));
            assert_eq!(req.depot_id, Some(DepotId("d1".into())));
        }
    }

    #[test]
    fn assign_routes_returns_empty_for_zero_spawn_count() {
        let mut rng = rand::thread_rng();
        let routes = vec![RouteId("r1".into()), RouteId("r2".into())];
        assert!(DepotSpawner::assign_routes(&mut rng, &routes, 0).is_empty());
    }

    #[test]
    fn assign_routes_only_picks_from_the_given_routes() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let routes = vec![RouteId("r1".into()), RouteId("r2".into()), RouteId("r3".into())];
        let assignments = DepotSpawner::assign_routes(&mut rng, &routes, 10);
        assert_eq!(assignments.len(), 10);
        assert!(assignments.iter().all(|r| routes.contains(r)));
    }
}

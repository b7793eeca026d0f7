//! Reservoir (§4.5): the boundary object between a spawner's output and the
//! passenger store. One instance per scope (one per route, one per depot).
//! Grounded on `cargo_transfer_manager.rs`/`transfer_cargo_manager.rs`'s
//! "wrap a resource, expose a small focused capability surface" shape.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use mockall::automock;
use transit_domain::{Passenger, PassengerId, RouteId, SpawnRequest};
use transit_store::{Ctx, PassengerRepositoryTrait};

/// Optional L1 cache in front of the repository. Write-through
/// invalidation only, never write-through update (§4.5 cache policy) —
/// the trait has no `set`, only `invalidate`, so an implementation cannot
/// accidentally grow a stale-write path.
#[automock]
#[async_trait]
pub trait ReservoirCache: Send + Sync + Debug {
    async fn invalidate(&self, scope_key: &str);
}

/// Default injected cache: every call is a no-op, matching spec.md §9's
/// "nullable dependency, not a conditional branch on a pointer" rule and
/// §4.5's "correctness must hold with cache disabled" invariant.
#[derive(Debug, Default)]
pub struct NoopReservoirCache;

#[async_trait]
impl ReservoirCache for NoopReservoirCache {
    async fn invalidate(&self, _scope_key: &str) {}
}

/// Bound on concurrent writes inside [`Reservoir::push_batch`] (§5 default 10).
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchResult {
    pub ok: usize,
    pub failed: usize,
}

/// Scope a reservoir mediates for: one route, or one depot. Used only to
/// build the cache-invalidation key and the destination name.
#[derive(Debug, Clone)]
pub enum ReservoirScope {
    Route(RouteId),
    Depot(transit_domain::DepotId),
}

impl ReservoirScope {
    fn cache_key(&self) -> String {
        match self {
            ReservoirScope::Route(id) => format!("route_reservoir:{id}:passengers"),
            ReservoirScope::Depot(id) => format!("depot_reservoir:{id}:passengers"),
        }
    }

    fn destination_name(&self) -> String {
        match self {
            ReservoirScope::Route(id) => format!("Route {id}"),
            ReservoirScope::Depot(id) => format!("Depot {id}"),
        }
    }
}

pub struct Reservoir {
    scope: ReservoirScope,
    repository: Arc<dyn PassengerRepositoryTrait>,
    cache: Arc<dyn ReservoirCache>,
    ttl_minutes: i64,
}

impl Reservoir {
    pub fn new(scope: ReservoirScope, repository: Arc<dyn PassengerRepositoryTrait>) -> Self {
        Self {
            scope,
            repository,
            cache: Arc::new(NoopReservoirCache),
            ttl_minutes: transit_domain::DEFAULT_TTL_MINUTES,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ReservoirCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_ttl_minutes(mut self, ttl_minutes: i64) -> Self {
        self.ttl_minutes = ttl_minutes;
        self
    }

    /// Ensures `passenger_id` exists, normalizes destination fields,
    /// persists, and invalidates the cache key on success (§4.5 `push`).
    pub async fn push(&self, req: SpawnRequest) -> Result<Passenger> {
        let passenger = Passenger::from_request(req, self.scope.destination_name(), self.ttl_minutes);
        let created = self.repository.create(&Ctx::Anonymous, passenger).await?;
        self.cache.invalidate(&self.scope.cache_key()).await;
        Ok(created)
    }

    /// Delegates to `Repository.bulk_create` with the reservoir's
    /// concurrency bound (§4.5 `pushBatch`); returns `(ok, failed)`.
    /// `bulk_create([])` short-circuits without contacting the store
    /// (§8 round-trip law).
    pub async fn push_batch(&self, reqs: Vec<SpawnRequest>) -> Result<BatchResult> {
        if reqs.is_empty() {
            return Ok(BatchResult::default());
        }

        let dest_name = self.scope.destination_name();
        let ttl = self.ttl_minutes;
        let passengers: Vec<Passenger> = reqs.into_iter().map(|r| Passenger::from_request(r, dest_name.clone(), ttl)).collect();
        let total = passengers.len();

        let created = self.repository.bulk_create(&Ctx::Anonymous, passengers).await?;
        let ok = created.len();
        let failed = total.saturating_sub(ok);

        if ok > 0 {
            self.cache.invalidate(&self.scope.cache_key()).await;
        }

        let scope_label = self.scope.cache_key();
        metrics::counter!("reservoir_passengers_pushed_total", "scope" => scope_label.clone()).increment(ok as u64);
        if failed > 0 {
            metrics::counter!("reservoir_passengers_failed_total", "scope" => scope_label).increment(failed as u64);
        }

        Ok(BatchResult { ok, failed })
    }

    /// WAITING passengers for this scope, optionally filtered by
    /// destination route (§4.5 `available`).
    pub async fn available(&self, route_filter: Option<&RouteId>, limit: usize) -> Result<Vec<Passenger>> {
        let mut rows = self.repository.query_waiting(&Ctx::Anonymous, route_filter).await?;
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn mark_picked_up(&self, id: PassengerId) -> Result<()> {
        self.repository.mark_boarded(&Ctx::Anonymous, id, Utc::now()).await?;
        self.cache.invalidate(&self.scope.cache_key()).await;
        Ok(())
    }

    pub async fn mark_dropped_off(&self, id: PassengerId) -> Result<()> {
        self.repository.mark_alighted(&Ctx::Anonymous, id, Utc::now()).await?;
        self.cache.invalidate(&self.scope.cache_key()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use transit_domain::{LatLon, RouteId, SpawnContext};
    use transit_store::InMemoryPassengerRepository;

    fn request(route: &str) -> SpawnRequest {
        SpawnRequest {
            passenger_id: None,
            spawn_location: LatLon::new(52.0, 13.0),
            destination_location: LatLon::new(52.01, 13.01),
            route_id: RouteId(route.to_string()),
            depot_id: None,
            direction: None,
            spawn_time: Utc::now(),
            spawn_context: SpawnContext::Route,
            generation_method: "test".into(),
            priority: 1.0,
        }
    }

    #[tokio::test]
    async fn push_generates_an_id_and_persists() {
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Route(RouteId("r1".into())), repo.clone());

        let created = reservoir.push(request("r1")).await.unwrap();
        let waiting = reservoir.available(None, 10).await.unwrap();

        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, created.id);
    }

    #[tokio::test]
    async fn push_batch_of_empty_vec_short_circuits() {
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Route(RouteId("r1".into())), repo);

        let result = reservoir.push_batch(Vec::new()).await.unwrap();
        assert_eq!(result.ok, 0);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test]
    async fn push_batch_persists_every_request() {
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Route(RouteId("r1".into())), repo);

        let result = reservoir.push_batch(vec![request("r1"), request("r1"), request("r1")]).await.unwrap();
        assert_eq!(result.ok, 3);
        assert_eq!(result.failed, 0);

        let waiting = reservoir.available(None, 10).await.unwrap();
        assert_eq!(waiting.len(), 3);
    }

    #[tokio::test]
    async fn mark_picked_up_removes_passenger_from_waiting() {
        let repo = Arc::new(InMemoryPassengerRepository::new());
        let reservoir = Reservoir::new(ReservoirScope::Route(RouteId("r1".into())), repo);

        let created = reservoir.push(request("r1")).await.unwrap();
        reservoir.mark_picked_up(created.id).await.unwrap();

        assert!(reservoir.available(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_invalidation_is_observed_when_a_cache_is_installed() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Debug, Default)]
        struct CountingCache(AtomicUsize);

        #[async_trait]
        impl ReservoirCache for CountingCache {
            async fn invalidate(&self, _scope_key: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let repo = Arc::new(InMemoryPassengerRepository::new());
        let cache = Arc::new(CountingCache::default());
        let reservoir = Reservoir::new(ReservoirScope::Route(RouteId("r1".into())), repo).with_cache(cache.clone());

        reservoir.push(request("r1")).await.unwrap();
        assert_eq!(cache.0.load(Ordering::SeqCst), 1);
    }
}

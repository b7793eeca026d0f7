//! Passenger persistence, backed by the Content API. Grounded directly on
//! `st-store/src/bmc/contract_bmc.rs`'s two-implementation shape
//! (`XxxBmcTrait` + `DbXxxBmc`/`InMemoryXxxBmc`), generalized to the
//! Content API instead of Postgres since `transit-store` has no database
//! of its own in this system (the Content API is the system of record,
//! per spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest_middleware::ClientWithMiddleware;
use transit_domain::geometry::haversine_m;
use transit_domain::{DepotId, LatLon, Passenger, PassengerId, PassengerStatus, RouteId};

use crate::content_client::{fetch_all_pages, PaginationInput};
use crate::ctx::Ctx;

/// Bounded concurrency for `bulk_create`, mirroring
/// `original_source/passenger_repository.py`'s `asyncio.Semaphore(10)` +
/// `asyncio.gather`.
pub const BULK_CREATE_CONCURRENCY: usize = 10;

#[async_trait]
pub trait PassengerRepositoryTrait: Send + Sync + std::fmt::Debug {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;

    async fn create(&self, ctx: &Ctx, passenger: Passenger) -> Result<Passenger>;
    async fn bulk_create(&self, ctx: &Ctx, passengers: Vec<Passenger>) -> Result<Vec<Passenger>>;

    async fn mark_boarded(&self, ctx: &Ctx, id: PassengerId, at: DateTime<Utc>) -> Result<()>;
    async fn mark_alighted(&self, ctx: &Ctx, id: PassengerId, at: DateTime<Utc>) -> Result<()>;
    async fn mark_cancelled(&self, ctx: &Ctx, id: PassengerId) -> Result<()>;

    async fn query_waiting(&self, ctx: &Ctx, route_id: Option<&RouteId>) -> Result<Vec<Passenger>>;
    /// WAITING passengers spawned at `depot_id`, independent of route — the
    /// depot-scoped counterpart to `query_waiting`'s route filter.
    async fn query_waiting_by_depot(&self, ctx: &Ctx, depot_id: &DepotId) -> Result<Vec<Passenger>>;
    async fn query_nearby(&self, ctx: &Ctx, center: LatLon, radius_m: f64) -> Result<Vec<Passenger>>;

    /// Returns the number of passengers transitioned to `EXPIRED`.
    async fn delete_expired(&self, ctx: &Ctx, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug)]
pub struct ContentApiPassengerRepository {
    client: ClientWithMiddleware,
    content_api_base_url: String,
}

impl ContentApiPassengerRepository {
    pub fn new(client: ClientWithMiddleware, content_api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            content_api_base_url: content_api_base_url.into(),
        }
    }

    fn passengers_url(&self) -> String {
        format!("{}/api/active-passengers", self.content_api_base_url)
    }

    /// Pages through `/api/active-passengers` filtered to
    /// `status = WAITING`, plus an optional extra `filters[<field>][$eq]`
    /// (used for the route and depot scoping in `query_waiting`/
    /// `query_waiting_by_depot`), per §4.4 `queryWaiting`.
    async fn fetch_waiting_passengers(&self, extra_filter: Option<(&str, String)>) -> Result<Vec<Passenger>> {
        fetch_all_pages(|pagination: PaginationInput| {
            let extra_filter = extra_filter.clone();
            async move {
                let mut query = vec![
                    ("filters[status][$eq]".to_string(), "WAITING".to_string()),
                    ("pagination[page]".to_string(), pagination.page.to_string()),
                    ("pagination[pageSize]".to_string(), pagination.limit.to_string()),
                ];
                if let Some((field, value)) = extra_filter {
                    query.push((format!("filters[{field}][$eq]"), value));
                }

                let response = self
                    .client
                    .get(self.passengers_url())
                    .query(&query)
                    .send()
                    .await
                    .context("fetching waiting passengers")?
                    .error_for_status()
                    .context("content api rejected active-passengers query")?;

                response.json().await.context("decoding active-passengers page")
            }
        })
        .await
    }

    async fn patch_status(&self, id: PassengerId, status: PassengerStatus, at: Option<DateTime<Utc>>) -> Result<()> {
        let mut body = serde_json::json!({ "status": status });
        if let Some(at) = at {
            body["status_changed_at"] = serde_json::Value::String(at.to_rfc3339());
        }

        self.client
            .put(format!("{}/{}", self.passengers_url(), id))
            .json(&serde_json::json!({ "data": body }))
            .send()
            .await
            .with_context(|| format!("patching passenger {id} status"))?
            .error_for_status()
            .with_context(|| format!("content api rejected status update for passenger {id}"))?;

        Ok(())
    }
}

#[async_trait]
impl PassengerRepositoryTrait for ContentApiPassengerRepository {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn create(&self, _ctx: &Ctx, passenger: Passenger) -> Result<Passenger> {
        let response = self
            .client
            .post(self.passengers_url())
            .json(&serde_json::json!({ "data": &passenger }))
            .send()
            .await
            .context("creating passenger")?
            .error_for_status()
            .context("content api rejected passenger creation")?;

        let created = response
            .json::<crate::content_client::SingleResponse<Passenger>>()
            .await
            .map(|r| r.data)
            .unwrap_or(passenger);

        Ok(created)
    }

    async fn bulk_create(&self, ctx: &Ctx, passengers: Vec<Passenger>) -> Result<Vec<Passenger>> {
        stream::iter(passengers.into_iter().map(|p| self.create(ctx, p)))
            .buffer_unordered(BULK_CREATE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    async fn mark_boarded(&self, _ctx: &Ctx, id: PassengerId, at: DateTime<Utc>) -> Result<()> {
        self.patch_status(id, PassengerStatus::Boarded, Some(at)).await
    }

    async fn mark_alighted(&self, _ctx: &Ctx, id: PassengerId, at: DateTime<Utc>) -> Result<()> {
        self.patch_status(id, PassengerStatus::Alighted, Some(at)).await
    }

    async fn mark_cancelled(&self, _ctx: &Ctx, id: PassengerId) -> Result<()> {
        self.patch_status(id, PassengerStatus::Cancelled, None).await
    }

    async fn query_waiting(&self, _ctx: &Ctx, route_id: Option<&RouteId>) -> Result<Vec<Passenger>> {
        self.fetch_waiting_passengers(route_id.map(|r| ("route_id", r.0.clone())))
            .await
    }

    async fn query_waiting_by_depot(&self, _ctx: &Ctx, depot_id: &DepotId) -> Result<Vec<Passenger>> {
        self.fetch_waiting_passengers(Some(("depot_id", depot_id.0.clone()))).await
    }

    async fn query_nearby(&self, ctx: &Ctx, center: LatLon, radius_m: f64) -> Result<Vec<Passenger>> {
        // The Content API has no spatial index; fall back to fetching every
        // waiting passenger and filtering with the same haversine formula
        // `transit-geo` uses, per spec §4.4.
        let waiting = self.query_waiting(ctx, None).await?;
        Ok(waiting
            .into_iter()
            .filter(|p| haversine_m(center, p.spawn_location) <= radius_m)
            .collect())
    }

    async fn delete_expired(&self, ctx: &Ctx, now: DateTime<Utc>) -> Result<u64> {
        let waiting = self.query_waiting(ctx, None).await?;
        let expired: Vec<_> = waiting.into_iter().filter(|p| p.is_expired(now)).collect();
        let count = expired.len() as u64;

        stream::iter(expired.into_iter().map(|p| self.patch_status(p.id, PassengerStatus::Expired, Some(now))))
            .buffer_unordered(BULK_CREATE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        Ok(count)
    }
}

/// Test double, grounded on `InMemoryContractBmc`/`InMemoryStatusBmc`.
#[derive(Debug, Default)]
pub struct InMemoryPassengerRepository {
    passengers: Arc<tokio::sync::RwLock<HashMap<PassengerId, Passenger>>>,
}

impl InMemoryPassengerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PassengerRepositoryTrait for InMemoryPassengerRepository {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn create(&self, _ctx: &Ctx, passenger: Passenger) -> Result<Passenger> {
        self.passengers.write().await.insert(passenger.id, passenger.clone());
        Ok(passenger)
    }

    async fn bulk_create(&self, ctx: &Ctx, passengers: Vec<Passenger>) -> Result<Vec<Passenger>> {
        let mut created = Vec::with_capacity(passengers.len());
        for p in passengers {
            created.push(self.create(ctx, p).await?);
        }
        Ok(created)
    }

    async fn mark_boarded(&self, _ctx: &Ctx, id: PassengerId, _at: DateTime<Utc>) -> Result<()> {
        if let Some(p) = self.passengers.write().await.get_mut(&id) {
            p.status = PassengerStatus::Boarded;
        }
        Ok(())
    }

    async fn mark_alighted(&self, _ctx: &Ctx, id: PassengerId, _at: DateTime<Utc>) -> Result<()> {
        if let Some(p) = self.passengers.write().await.get_mut(&id) {
            p.status = PassengerStatus::Alighted;
        }
        Ok(())
    }

    async fn mark_cancelled(&self, _ctx: &Ctx, id: PassengerId) -> Result<()> {
        if let Some(p) = self.passengers.write().await.get_mut(&id) {
            p.status = PassengerStatus::Cancelled;
        }
        Ok(())
    }

    async fn query_waiting(&self, _ctx: &Ctx, route_id: Option<&RouteId>) -> Result<Vec<Passenger>> {
        Ok(self
            .passengers
            .read()
            .await
            .values()
            .filter(|p| p.status == PassengerStatus::Waiting)
            .filter(|p| route_id.map_or(true, |rid| &p.route_id == rid))
            .cloned()
            .collect())
    }

    async fn query_waiting_by_depot(&self, _ctx: &Ctx, depot_id: &DepotId) -> Result<Vec<Passenger>> {
        Ok(self
            .passengers
            .read()
            .await
            .values()
            .filter(|p| p.status == PassengerStatus::Waiting)
            .filter(|p| p.depot_id.as_ref() == Some(depot_id))
            .cloned()
            .collect())
    }

    async fn query_nearby(&self, _ctx: &Ctx, center: LatLon, radius_m: f64) -> Result<Vec<Passenger>> {
        Ok(self
            .passengers
            .read()
            .await
            .values()
            .filter(|p| p.status == PassengerStatus::Waiting)
            .filter(|p| haversine_m(center, p.spawn_location) <= radius_m)
            .cloned()
            .collect())
    }

    async fn delete_expired(&self, _ctx: &Ctx, now: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.passengers.write().await;
        let mut count = 0;
        for p in guard.values_mut() {
            if p.status == PassengerStatus::Waiting && p.is_expired(now) {
                p.status = PassengerStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_domain::{SpawnContext, SpawnRequest};

    fn sample_request(route: &str) -> SpawnRequest {
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
            priority: 0.5,
        }
    }

    #[tokio::test]
    async fn create_then_query_waiting_round_trips() {
        let repo = InMemoryPassengerRepository::new();
        let passenger = Passenger::from_request(sample_request("r1"), "Main St", 30);
        repo.create(&Ctx::Anonymous, passenger.clone()).await.unwrap();

        let waiting = repo.query_waiting(&Ctx::Anonymous, None).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, passenger.id);
    }

    #[tokio::test]
    async fn query_waiting_filters_by_route() {
        let repo = InMemoryPassengerRepository::new();
        repo.create(&Ctx::Anonymous, Passenger::from_request(sample_request("r1"), "A", 30))
            .await
            .unwrap();
        repo.create(&Ctx::Anonymous, Passenger::from_request(sample_request("r2"), "B", 30))
            .await
            .unwrap();

        let waiting = repo.query_waiting(&Ctx::Anonymous, Some(&RouteId("r1".into()))).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].route_id, RouteId("r1".into()));
    }

    #[tokio::test]
    async fn mark_boarded_transitions_status() {
        let repo = InMemoryPassengerRepository::new();
        let passenger = Passenger::from_request(sample_request("r1"), "A", 30);
        repo.create(&Ctx::Anonymous, passenger.clone()).await.unwrap();

        repo.mark_boarded(&Ctx::Anonymous, passenger.id, Utc::now()).await.unwrap();

        let waiting = repo.query_waiting(&Ctx::Anonymous, None).await.unwrap();
        assert!(waiting.is_empty());
    }

    #[tokio::test]
    async fn delete_expired_only_touches_waiting_passengers_past_their_ttl() {
        let repo = InMemoryPassengerRepository::new();
        let mut request = sample_request("r1");
        request.spawn_time = Utc::now() - chrono::Duration::hours(1);
        let passenger = Passenger::from_request(request, "A", 1);
        repo.create(&Ctx::Anonymous, passenger).await.unwrap();

        let count = repo.delete_expired(&Ctx::Anonymous, Utc::now()).await.unwrap();
        assert_eq!(count, 1);
        assert!(repo.query_waiting(&Ctx::Anonymous, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_waiting_by_depot_filters_by_depot() {
        let repo = InMemoryPassengerRepository::new();
        let mut at_d1 = sample_request("r1");
        at_d1.depot_id = Some(DepotId("d1".into()));
        let mut at_d2 = sample_request("r1");
        at_d2.depot_id = Some(DepotId("d2".into()));

        let p1 = Passenger::from_request(at_d1, "A", 30);
        repo.create(&Ctx::Anonymous, p1.clone()).await.unwrap();
        repo.create(&Ctx::Anonymous, Passenger::from_request(at_d2, "B", 30)).await.unwrap();

        let waiting = repo.query_waiting_by_depot(&Ctx::Anonymous, &DepotId("d1".into())).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, p1.id);
    }

    #[tokio::test]
    async fn query_nearby_filters_by_radius() {
        let repo = InMemoryPassengerRepository::new();
        let near = Passenger::from_request(sample_request("r1"), "A", 30);
        let mut far_request = sample_request("r1");
        far_request.spawn_location = LatLon::new(60.0, 30.0);
        let far = Passenger::from_request(far_request, "B", 30);

        repo.create(&Ctx::Anonymous, near.clone()).await.unwrap();
        repo.create(&Ctx::Anonymous, far).await.unwrap();

        let nearby = repo.query_nearby(&Ctx::Anonymous, LatLon::new(52.0, 13.0), 5_000.0).await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, near.id);
    }
}

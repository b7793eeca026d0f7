//! Manifest enrichment (§4.8): turns raw waiting passengers into ranked,
//! geocoded rows for the dashboard/CLI surfaces. Grounded on
//! `original_source/commuter_simulator/application/queries/manifest_query.py`'s
//! `enrich_manifest_rows`/`reverse_geocode`/`fetch_passengers` pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use ordered_float::OrderedFloat;
use tokio::sync::Mutex;
use transit_domain::geometry::{compute_route_positions, haversine_m};
use transit_domain::{LatLon, Passenger, RouteId};
use transit_store::{Ctx, PassengerRepositoryTrait};

use crate::geo_client::GeoClient;

/// Bound on concurrent reverse-geocode calls, matching the original's
/// `asyncio.Semaphore(GEOCODE_CONCURRENCY)` (env-configurable, default 5).
pub const DEFAULT_GEOCODE_CONCURRENCY: usize = 5;

/// Geocode results are placed on a rounded-coordinate key (5 decimal places,
/// ~1.1m of precision) so that nearby requests share a cache entry instead
/// of hitting the geocoder once per passenger — the original rounds with
/// `round(lat, 5)`/`round(lon, 5)` before using a `dict` as the cache.
fn geocode_cache_key(point: LatLon) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
    let round5 = |v: f64| (v * 1e5).round() / 1e5;
    (OrderedFloat(round5(point.lat)), OrderedFloat(round5(point.lon)))
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ManifestRow {
    pub rank: u32,
    pub passenger: Passenger,
    pub route_position_m: f64,
    pub travel_distance_m: f64,
    /// Reverse-geocoded address for the spawn location, or `"-"` when the
    /// lookup failed — the original swallows geocoder errors so one bad
    /// lookup never fails the whole manifest request.
    pub address: String,
    /// Reverse-geocoded address for the destination location, same `"-"`
    /// fallback on lookup failure.
    pub stop_address: String,
}

#[derive(Default)]
struct GeocodeCache {
    entries: Mutex<HashMap<(OrderedFloat<f64>, OrderedFloat<f64>), String>>,
}

impl GeocodeCache {
    async fn get_or_fetch(&self, geo_client: &dyn GeoClient, point: LatLon) -> String {
        let key = geocode_cache_key(point);
        if let Some(hit) = self.entries.lock().await.get(&key).cloned() {
            return hit;
        }

        let address = match geo_client.reverse_geocode(point).await {
            Ok(result) => result.address,
            Err(err) => {
                tracing::warn!(lat = point.lat, lon = point.lon, error = %err, "reverse geocode failed");
                "-".to_string()
            }
        };

        self.entries.lock().await.insert(key, address.clone());
        address
    }
}

/// Fetches every WAITING passenger for `route_id` (or every route when
/// `None`), matching the original's Strapi `active-passengers` query with
/// `filters[status][$eq]=WAITING` plus an optional route filter.
pub async fn fetch_passengers(repository: &dyn PassengerRepositoryTrait, route_id: Option<&RouteId>) -> anyhow::Result<Vec<Passenger>> {
    Ok(repository.query_waiting(&Ctx::Anonymous, route_id).await?)
}

/// Projects each passenger onto its route, computes straight-line travel
/// distance, reverse-geocodes its spawn location under a bounded-concurrency
/// cache, sorts by `route_position_m`, and reindexes `rank` from 1 (§4.8
/// `enrich_manifest_rows`).
pub async fn enrich_manifest_rows(
    geo_client: Arc<dyn GeoClient>,
    route_id: &RouteId,
    passengers: Vec<Passenger>,
    geocode_concurrency: usize,
) -> anyhow::Result<Vec<ManifestRow>> {
    if passengers.is_empty() {
        return Ok(Vec::new());
    }

    let route = geo_client.route_geometry(route_id).await?;
    let polyline = route.as_ref().map(|r| r.polyline.clone()).unwrap_or_default();

    let points: Vec<Option<LatLon>> = passengers.iter().map(|p| Some(p.spawn_location)).collect();
    let positions = compute_route_positions(&polyline, &points);

    let cache = Arc::new(GeocodeCache::default());

    let rows: Vec<(Passenger, f64, f64, String, String)> = stream::iter(passengers.into_iter().zip(positions))
        .map(|(passenger, route_position_m)| {
            let geo_client = geo_client.clone();
            let cache = cache.clone();
            async move {
                let travel_distance_m = haversine_m(passenger.spawn_location, passenger.destination_location);
                let (address, stop_address) = tokio::join!(
                    cache.get_or_fetch(geo_client.as_ref(), passenger.spawn_location),
                    cache.get_or_fetch(geo_client.as_ref(), passenger.destination_location),
                );
                (passenger, route_position_m, travel_distance_m, address, stop_address)
            }
        })
        .buffer_unordered(geocode_concurrency.max(1))
        .collect()
        .await;

    let mut rows = rows;
    rows.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, (passenger, route_position_m, travel_distance_m, address, stop_address))| ManifestRow {
            rank: i as u32 + 1,
            passenger,
            route_position_m,
            travel_distance_m,
            address,
            stop_address,
        })
        .collect())
}

/// Convenience wrapper combining [`fetch_passengers`] and
/// [`enrich_manifest_rows`] behind the default geocode concurrency, used by
/// `transit-server`'s manifest HTTP surface.
pub async fn build_manifest(
    repository: &dyn PassengerRepositoryTrait,
    geo_client: Arc<dyn GeoClient>,
    route_id: &RouteId,
) -> anyhow::Result<Vec<ManifestRow>> {
    let passengers = fetch_passengers(repository, Some(route_id)).await?;
    enrich_manifest_rows(geo_client, route_id, passengers, DEFAULT_GEOCODE_CONCURRENCY).await
}

/// Reads `GEOCODE_CONCURRENCY` from the environment, falling back to
/// [`DEFAULT_GEOCODE_CONCURRENCY`] when unset or invalid.
pub fn geocode_concurrency_from_env() -> usize {
    std::env::var("GEOCODE_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_GEOCODE_CONCURRENCY)
}

//! HTTP client to the `transit-geo` service (C2), consumed by spawners
//! (§4.6) and manifest enrichment (§4.8). Modeled as a small capability
//! trait rather than a concrete struct so callers can inject a no-op when
//! the geospatial service is unavailable (spec.md §9 "nullable
//! dependencies" design note) instead of branching on an `Option<Client>`
//! everywhere a query is made.
//!
//! Grounded on `st_client.rs`'s `StClientTrait` shape: an
//! `#[async_trait] pub trait ...: Send + Sync + Debug`, `#[automock]`-able
//! for unit tests, with a single `reqwest_middleware::ClientWithMiddleware`
//! implementation built the same way `reqwest_helpers::create_client` does.

use std::fmt::Debug;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::Deserialize;
use transit_domain::{Building, BuildingId, LatLon, Route, RouteId};

/// Per spec §5: geospatial calls carry a 30s timeout, geocoding 10s.
pub const GEOSPATIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct GeocodeResult {
    pub address: String,
}

#[automock]
#[async_trait]
pub trait GeoClient: Send + Sync + Debug {
    async fn route_geometry(&self, route_id: &RouteId) -> Result<Option<Route>>;

    async fn buildings_along_route(&self, polyline: &[LatLon], buffer_m: f64, limit: usize) -> Result<Vec<Building>>;

    async fn depot_catchment(&self, point: LatLon, radius_m: f64, limit: usize) -> Result<Vec<Building>>;

    async fn reverse_geocode(&self, point: LatLon) -> Result<GeocodeResult>;
}

#[derive(Deserialize)]
struct RouteGeometryResponse {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct BuildingHit {
    id: String,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct NearbyBuildingsResponse {
    buildings: Vec<BuildingHit>,
}

#[derive(Deserialize)]
struct ReverseGeocodeResponse {
    address: String,
}

#[derive(Debug)]
pub struct HttpGeoClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpGeoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let reqwest_client = Client::builder().timeout(GEOSPATIAL_TIMEOUT).build().expect("building reqwest client");

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(50), Duration::from_secs(2))
            .build_with_total_retry_duration_and_max_retries(Duration::from_secs(5));

        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GeoClient for HttpGeoClient {
    async fn route_geometry(&self, route_id: &RouteId) -> Result<Option<Route>> {
        let url = format!("{}/spatial/route-geometry/{}", self.base_url, route_id.0);
        let response = self.client.get(&url).send().await.with_context(|| format!("fetching route geometry for {route_id}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: RouteGeometryResponse = response
            .error_for_status()
            .with_context(|| format!("transit-geo rejected route geometry request for {route_id}"))?
            .json()
            .await
            .context("decoding route geometry response")?;

        let polyline = body.coordinates.into_iter().map(|[lon, lat]| LatLon::new(lat, lon)).collect();
        Ok(Some(Route::new(route_id.clone(), route_id.0.clone(), polyline)))
    }

    async fn buildings_along_route(&self, polyline: &[LatLon], buffer_m: f64, limit: usize) -> Result<Vec<Building>> {
        if polyline.is_empty() {
            return Ok(Vec::new());
        }

        // transit-geo exposes buildings-along-route keyed by a known route,
        // but spawners already hold the polyline in hand; querying by a
        // bounding vertex keeps this client usable without re-registering
        // the route, matching the original's direct `buildings_along_route`
        // call with raw coordinates.
        let query = serde_json::json!({
            "coordinates": polyline.iter().map(|p| [p.lon, p.lat]).collect::<Vec<_>>(),
            "buffer_meters": buffer_m,
            "limit": limit,
        });

        let url = format!("{}/spatial/buildings-along-route", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&query)
            .send()
            .await
            .context("querying buildings along route")?
            .error_for_status()
            .context("transit-geo rejected buildings-along-route query")?;

        let body: NearbyBuildingsResponse = response.json().await.context("decoding buildings-along-route response")?;
        Ok(body
            .buildings
            .into_iter()
            .map(|b| Building {
                id: BuildingId(b.id),
                location: LatLon::new(b.lat, b.lon),
            })
            .collect())
    }

    async fn depot_catchment(&self, point: LatLon, radius_m: f64, limit: usize) -> Result<Vec<Building>> {
        let url = format!("{}/spatial/depot-catchment", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", point.lat.to_string()),
                ("lon", point.lon.to_string()),
                ("radius_meters", radius_m.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("querying depot catchment")?
            .error_for_status()
            .context("transit-geo rejected depot-catchment query")?;

        let body: NearbyBuildingsResponse = response.json().await.context("decoding depot-catchment response")?;
        Ok(body
            .buildings
            .into_iter()
            .map(|b| Building {
                id: BuildingId(b.id),
                location: LatLon::new(b.lat, b.lon),
            })
            .collect())
    }

    async fn reverse_geocode(&self, point: LatLon) -> Result<GeocodeResult> {
        let url = format!("{}/geocode/reverse", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(GEOCODE_TIMEOUT)
            .json(&serde_json::json!({
                "latitude": point.lat,
                "longitude": point.lon,
            }))
            .send()
            .await
            .context("reverse geocoding point")?
            .error_for_status()
            .context("transit-geo rejected reverse-geocode request")?;

        let body: ReverseGeocodeResponse = response.json().await.context("decoding reverse-geocode response")?;
        Ok(GeocodeResult { address: body.address })
    }
}

/// Injected when no geospatial service is configured. Every query returns
/// an empty set rather than an error, so a spawner falls back to its
/// route-only mode (§4.6) purely because the numbers come back zero —
/// no `if geo_client.is_some()` branch anywhere in the spawner bodies.
#[derive(Debug, Default)]
pub struct NoopGeoClient;

#[async_trait]
impl GeoClient for NoopGeoClient {
    async fn route_geometry(&self, _route_id: &RouteId) -> Result<Option<Route>> {
        Ok(None)
    }

    async fn buildings_along_route(&self, _polyline: &[LatLon], _buffer_m: f64, _limit: usize) -> Result<Vec<Building>> {
        Ok(Vec::new())
    }

    async fn depot_catchment(&self, _point: LatLon, _radius_m: f64, _limit: usize) -> Result<Vec<Building>> {
        Ok(Vec::new())
    }

    async fn reverse_geocode(&self, _point: LatLon) -> Result<GeocodeResult> {
        Ok(GeocodeResult::default())
    }
}

/// In-memory test double: seeded directly with routes/buildings instead of
/// standing up `transit-geo` over HTTP.
#[derive(Debug, Default)]
pub struct InMemoryGeoClient {
    pub routes: std::sync::Mutex<std::collections::HashMap<RouteId, Route>>,
    pub buildings: std::sync::Mutex<Vec<Building>>,
}

impl InMemoryGeoClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_route(&self, route: Route) {
        self.routes.lock().unwrap().insert(route.id.clone(), route);
    }

    pub fn seed_building(&self, building: Building) {
        self.buildings.lock().unwrap().push(building);
    }
}

#[async_trait]
impl GeoClient for InMemoryGeoClient {
    async fn route_geometry(&self, route_id: &RouteId) -> Result<Option<Route>> {
        Ok(self.routes.lock().unwrap().get(route_id).cloned())
    }

    async fn buildings_along_route(&self, polyline: &[LatLon], buffer_m: f64, limit: usize) -> Result<Vec<Building>> {
        use transit_domain::geometry::haversine_m;
        let buildings = self.buildings.lock().unwrap();
        let mut seen = std::collections::HashSet::new();
        let mut hits = Vec::new();
        for b in buildings.iter() {
            if hits.len() >= limit {
                break;
            }
            if polyline.iter().any(|v| haversine_m(*v, b.location) <= buffer_m) && seen.insert(b.id.clone()) {
                hits.push(b.clone());
            }
        }
        Ok(hits)
    }

    async fn depot_catchment(&self, point: LatLon, radius_m: f64, limit: usize) -> Result<Vec<Building>> {
        use transit_domain::geometry::haversine_m;
        let buildings = self.buildings.lock().unwrap();
        let mut hits: Vec<Building> = buildings.iter().filter(|b| haversine_m(point, b.location) <= radius_m).cloned().collect();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn reverse_geocode(&self, point: LatLon) -> Result<GeocodeResult> {
        Ok(GeocodeResult {
            address: format!("Lat {:.5}, Lon {:.5}", point.lat, point.lon),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transit_domain::Route;

    #[tokio::test]
    async fn noop_client_returns_empty_sets_for_every_query() {
        let client = NoopGeoClient;
        assert!(client.route_geometry(&RouteId("r1".into())).await.unwrap().is_none());
        assert!(client.buildings_along_route(&[LatLon::new(52.0, 13.0)], 100.0, 10).await.unwrap().is_empty());
        assert!(client.depot_catchment(LatLon::new(52.0, 13.0), 100.0, 10).await.unwrap().is_empty());
        assert_eq!(client.reverse_geocode(LatLon::new(52.0, 13.0)).await.unwrap().address, "");
    }

    #[tokio::test]
    async fn in_memory_client_finds_buildings_within_buffer_and_dedupes() {
        let client = InMemoryGeoClient::new();
        let polyline = vec![LatLon::new(52.0, 13.0), LatLon::new(52.01, 13.01)];
        client.seed_route(Route::new(RouteId("r1".into()), "R1".into(), polyline.clone()));
        client.seed_building(Building {
            id: BuildingId("b1".into()),
            location: LatLon::new(52.0001, 13.0001),
        });
        client.seed_building(Building {
            id: BuildingId("b2".into()),
            location: LatLon::new(10.0, 10.0),
        });

        let route = client.route_geometry(&RouteId("r1".into())).await.unwrap();
        assert!(route.is_some());
        assert!(client.route_geometry(&RouteId("missing".into())).await.unwrap().is_none());

        let hits = client.buildings_along_route(&polyline, 50.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, BuildingId("b1".into()));
    }

    #[tokio::test]
    async fn in_memory_client_depot_catchment_respects_radius_and_limit() {
        let client = InMemoryGeoClient::new();
        for i in 0..5 {
            client.seed_building(Building {
                id: BuildingId(format!("b{i}")),
                location: LatLon::new(52.0 + i as f64 * 0.0001, 13.0),
            });
        }
        client.seed_building(Building {
            id: BuildingId("far".into()),
            location: LatLon::new(0.0, 0.0),
        });

        let hits = client.depot_catchment(LatLon::new(52.0, 13.0), 200.0, 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|b| b.id.0 != "far"));
    }
}

//! Spatial data access, grounded on the Bmc-trait-plus-two-impls pattern in
//! `st-store/src/bmc/*.rs`: a single async trait, one real implementation
//! and one in-memory test double.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use transit_domain::geometry::haversine_m;
use transit_domain::{Building, BuildingId, LatLon, Route, RouteId, SpawnError};

#[derive(Debug, Clone)]
pub struct GeocodeResult {
    pub address: String,
    pub nearest_highway: Option<String>,
    pub nearest_poi: Option<String>,
    pub parish: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeofenceResult {
    pub inside_region: bool,
    pub inside_landuse: bool,
    pub region_name: Option<String>,
    pub landuse_kind: Option<String>,
}

#[async_trait]
pub trait SpatialStore: Send + Sync + std::fmt::Debug {
    async fn route_geometry(&self, route_id: &RouteId) -> Result<Option<Route>, SpawnError>;

    async fn nearby_buildings(
        &self,
        point: LatLon,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<(Building, f64)>, SpawnError>;

    /// Buildings within `buffer_m` of any polyline vertex, deduplicated by
    /// identifier (spec §4.2 "no duplicates by identifier").
    async fn buildings_along_route(
        &self,
        polyline: &[LatLon],
        buffer_m: f64,
        limit: usize,
    ) -> Result<Vec<Building>, SpawnError>;

    async fn depot_catchment(&self, point: LatLon, radius_m: f64, limit: usize) -> Result<Vec<Building>, SpawnError>;

    async fn reverse_geocode(&self, point: LatLon, highway_radius_m: f64, poi_radius_m: f64) -> Result<GeocodeResult, SpawnError>;

    async fn geofence_check(&self, point: LatLon) -> Result<GeofenceResult, SpawnError>;
}

#[derive(Debug, Clone)]
struct NamedPoint {
    name: String,
    location: LatLon,
}

#[derive(Debug, Clone)]
struct Region {
    name: String,
    center: LatLon,
    radius_m: f64,
    landuse_kind: String,
}

#[derive(Debug, Default)]
struct InMemoryData {
    routes: HashMap<RouteId, Route>,
    buildings: Vec<Building>,
    highways: Vec<NamedPoint>,
    pois: Vec<NamedPoint>,
    regions: Vec<Region>,
}

/// Reference implementation sufficient to satisfy the operation contracts
/// and tests without a real PostGIS instance. Regions/landuse zones are
/// modeled as circles rather than true polygons — a deliberate
/// simplification documented in DESIGN.md, since no geometry-in-polygon
/// crate is present anywhere in the corpus.
#[derive(Debug, Default)]
pub struct InMemorySpatialStore {
    data: Arc<RwLock<InMemoryData>>,
}

impl InMemorySpatialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_route(&self, route: Route) {
        self.data.write().await.routes.insert(route.id.clone(), route);
    }

    pub async fn seed_building(&self, building: Building) {
        self.data.write().await.buildings.push(building);
    }

    pub async fn seed_highway(&self, name: impl Into<String>, location: LatLon) {
        self.data.write().await.highways.push(NamedPoint {
            name: name.into(),
            location,
        });
    }

    pub async fn seed_poi(&self, name: impl Into<String>, location: LatLon) {
        self.data.write().await.pois.push(NamedPoint {
            name: name.into(),
            location,
        });
    }

    pub async fn seed_region(&self, name: impl Into<String>, center: LatLon, radius_m: f64, landuse_kind: impl Into<String>) {
        self.data.write().await.regions.push(Region {
            name: name.into(),
            center,
            radius_m,
            landuse_kind: landuse_kind.into(),
        });
    }
}

#[async_trait]
impl SpatialStore for InMemorySpatialStore {
    async fn route_geometry(&self, route_id: &RouteId) -> Result<Option<Route>, SpawnError> {
        Ok(self.data.read().await.routes.get(route_id).cloned())
    }

    async fn nearby_buildings(
        &self,
        point: LatLon,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<(Building, f64)>, SpawnError> {
        let data = self.data.read().await;
        let mut hits: Vec<(Building, f64)> = data
            .buildings
            .iter()
            .filter_map(|b| {
                let d = haversine_m(point, b.location);
                (d <= radius_m).then(|| (b.clone(), d))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn buildings_along_route(
        &self,
        polyline: &[LatLon],
        buffer_m: f64,
        limit: usize,
    ) -> Result<Vec<Building>, SpawnError> {
        let data = self.data.read().await;
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();

        for building in &data.buildings {
            if result.len() >= limit {
                break;
            }
            let within_buffer = polyline.iter().any(|v| haversine_m(*v, building.location) <= buffer_m);
            if within_buffer && seen.insert(building.id.clone()) {
                result.push(building.clone());
            }
        }

        Ok(result)
    }

    async fn depot_catchment(&self, point: LatLon, radius_m: f64, limit: usize) -> Result<Vec<Building>, SpawnError> {
        Ok(self
            .nearby_buildings(point, radius_m, limit)
            .await?
            .into_iter()
            .map(|(b, _)| b)
            .collect())
    }

    async fn reverse_geocode(&self, point: LatLon, highway_radius_m: f64, poi_radius_m: f64) -> Result<GeocodeResult, SpawnError> {
        let data = self.data.read().await;

        let nearest_highway = data
            .highways
            .iter()
            .map(|h| (h, haversine_m(point, h.location)))
            .filter(|(_, d)| *d <= highway_radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h.name.clone());

        let nearest_poi = data
            .pois
            .iter()
            .map(|p| (p, haversine_m(point, p.location)))
            .filter(|(_, d)| *d <= poi_radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p.name.clone());

        let parish = data
            .regions
            .iter()
            .find(|r| haversine_m(point, r.center) <= r.radius_m)
            .map(|r| r.name.clone());

        let address = match (&nearest_highway, &parish) {
            (Some(highway), Some(parish)) => format!("{highway}, {parish}"),
            (Some(highway), None) => highway.clone(),
            (None, Some(parish)) => parish.clone(),
            (None, None) => format!("Lat {:.5}, Lon {:.5}", point.lat, point.lon),
        };

        Ok(GeocodeResult {
            address,
            nearest_highway,
            nearest_poi,
            parish,
        })
    }

    async fn geofence_check(&self, point: LatLon) -> Result<GeofenceResult, SpawnError> {
        let data = self.data.read().await;

        let region = data.regions.iter().find(|r| haversine_m(point, r.center) <= r.radius_m);

        Ok(GeofenceResult {
            inside_region: region.is_some(),
            inside_landuse: region.is_some(),
            region_name: region.map(|r| r.name.clone()),
            landuse_kind: region.map(|r| r.landuse_kind.clone()),
        })
    }
}

/// PostGIS-backed implementation for a real deployment. Declared behind the
/// same trait as [`InMemorySpatialStore`] but left unimplemented: the spec
/// leaves the storage backend as an Open Question (resolved in DESIGN.md as
/// "ship the trait and the in-memory reference implementation; a concrete
/// deployment fills in the PostGIS queries against its own schema").
#[derive(Debug, Clone)]
pub struct PostgisSpatialStore {
    pool: sqlx::PgPool,
}

impl PostgisSpatialStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn unimplemented(op: &str) -> SpawnError {
        SpawnError::Internal(anyhow::anyhow!(
            "PostgisSpatialStore::{op} is not implemented; this deployment must supply PostGIS queries against its own schema"
        ))
    }
}

#[async_trait]
impl SpatialStore for PostgisSpatialStore {
    async fn route_geometry(&self, _route_id: &RouteId) -> Result<Option<Route>, SpawnError> {
        let _ = &self.pool;
        Err(Self::unimplemented("route_geometry"))
    }

    async fn nearby_buildings(&self, _point: LatLon, _radius_m: f64, _limit: usize) -> Result<Vec<(Building, f64)>, SpawnError> {
        Err(Self::unimplemented("nearby_buildings"))
    }

    async fn buildings_along_route(&self, _polyline: &[LatLon], _buffer_m: f64, _limit: usize) -> Result<Vec<Building>, SpawnError> {
        Err(Self::unimplemented("buildings_along_route"))
    }

    async fn depot_catchment(&self, _point: LatLon, _radius_m: f64, _limit: usize) -> Result<Vec<Building>, SpawnError> {
        Err(Self::unimplemented("depot_catchment"))
    }

    async fn reverse_geocode(&self, _point: LatLon, _highway_radius_m: f64, _poi_radius_m: f64) -> Result<GeocodeResult, SpawnError> {
        Err(Self::unimplemented("reverse_geocode"))
    }

    async fn geofence_check(&self, _point: LatLon) -> Result<GeofenceResult, SpawnError> {
        Err(Self::unimplemented("geofence_check"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn building(id: &str, lat: f64, lon: f64) -> Building {
        Building {
            id: BuildingId(id.to_string()),
            location: LatLon::new(lat, lon),
        }
    }

    #[tokio::test]
    async fn nearby_buildings_sorts_ascending_and_respects_radius() {
        let store = InMemorySpatialStore::new();
        store.seed_building(building("near", 52.0001, 13.0)).await;
        store.seed_building(building("far", 53.0, 13.0)).await;

        let hits = store.nearby_buildings(LatLon::new(52.0, 13.0), 1000.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, BuildingId("near".into()));
    }

    #[tokio::test]
    async fn buildings_along_route_deduplicates_by_id() {
        let store = InMemorySpatialStore::new();
        store.seed_building(building("b1", 52.0, 13.0)).await;

        let polyline = vec![LatLon::new(52.0, 13.0), LatLon::new(52.0001, 13.0)];
        let hits = store.buildings_along_route(&polyline, 50.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn reverse_geocode_falls_back_to_coordinates_when_nothing_nearby() {
        let store = InMemorySpatialStore::new();
        let result = store.reverse_geocode(LatLon::new(10.0, 10.0), 100.0, 100.0).await.unwrap();
        assert!(result.address.starts_with("Lat "));
    }

    #[tokio::test]
    async fn geofence_check_detects_region_membership() {
        let store = InMemorySpatialStore::new();
        store.seed_region("Central", LatLon::new(52.0, 13.0), 1000.0, "residential").await;

        let inside = store.geofence_check(LatLon::new(52.0, 13.0)).await.unwrap();
        assert!(inside.inside_region);

        let outside = store.geofence_check(LatLon::new(10.0, 10.0)).await.unwrap();
        assert!(!outside.inside_region);
    }

    #[tokio::test]
    async fn postgis_store_reports_unimplemented_rather_than_panicking() {
        let store = PostgisSpatialStore::new(sqlx::PgPool::connect_lazy("postgres://localhost/doesnotmatter").unwrap());
        let err = store.route_geometry(&RouteId("r1".into())).await.unwrap_err();
        assert!(matches!(err, SpawnError::Internal(_)));
    }
}

//! Route↔depot junction lookups against the Content API's `route-depots`
//! resource (§6). Modeled with identifiers and a lookup trait rather than a
//! bidirectional pointer graph, per spec.md §9's "cyclic references" design
//! note. Grounded on `route_spawner.py::_get_depot_info`/`_get_total_buildings_all_routes`
//! and `depot_spawner.py::_load_associated_routes`, which both walk this
//! same junction table from opposite ends.

use std::fmt::Debug;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mockall::automock;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use transit_domain::{Depot, DepotId, LatLon, RouteId};

#[automock]
#[async_trait]
pub trait TopologyClient: Send + Sync + Debug {
    /// The depot serving `route_id`, if the route is associated with one.
    async fn depot_for_route(&self, route_id: &RouteId) -> Result<Option<Depot>>;

    /// Every route associated with `depot_id` via the junction table.
    async fn routes_for_depot(&self, depot_id: &DepotId) -> Result<Vec<RouteId>>;
}

#[derive(Deserialize)]
struct RouteDepotRow {
    route: Option<RouteRef>,
    depot: Option<DepotRef>,
}

#[derive(Deserialize)]
struct RouteRef {
    #[serde(rename = "documentId")]
    document_id: String,
}

#[derive(Deserialize)]
struct DepotRef {
    #[serde(rename = "documentId")]
    document_id: String,
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct RouteDepotsResponse {
    data: Vec<RouteDepotRow>,
}

#[derive(Debug)]
pub struct ContentApiTopologyClient {
    client: ClientWithMiddleware,
    content_api_base_url: String,
}

impl ContentApiTopologyClient {
    pub fn new(client: ClientWithMiddleware, content_api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            content_api_base_url: content_api_base_url.into(),
        }
    }
}

#[async_trait]
impl TopologyClient for ContentApiTopologyClient {
    async fn depot_for_route(&self, route_id: &RouteId) -> Result<Option<Depot>> {
        let url = format!("{}/api/route-depots", self.content_api_base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("filters[route][documentId][$eq]", route_id.0.as_str()),
                ("populate", "depot"),
            ])
            .send()
            .await
            .with_context(|| format!("fetching depot association for route {route_id}"))?
            .error_for_status()
            .with_context(|| format!("content api rejected route-depots query for {route_id}"))?;

        let body: RouteDepotsResponse = response.json().await.context("decoding route-depots response")?;

        let Some(depot_ref) = body.data.into_iter().find_map(|r| r.depot) else {
            return Ok(None);
        };

        let (Some(lat), Some(lon)) = (depot_ref.latitude, depot_ref.longitude) else {
            return Ok(None);
        };

        Ok(Some(Depot {
            id: DepotId(depot_ref.document_id),
            name: depot_ref.name.unwrap_or_default(),
            location: LatLon::new(lat, lon),
            served_routes: Vec::new(),
        }))
    }

    async fn routes_for_depot(&self, depot_id: &DepotId) -> Result<Vec<RouteId>> {
        let url = format!("{}/api/route-depots", self.content_api_base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("filters[depot][documentId][$eq]", depot_id.0.as_str()),
                ("populate", "route"),
                ("pagination[pageSize]", "100"),
            ])
            .send()
            .await
            .with_context(|| format!("fetching routes for depot {depot_id}"))?
            .error_for_status()
            .with_context(|| format!("content api rejected route-depots query for {depot_id}"))?;

        let body: RouteDepotsResponse = response.json().await.context("decoding route-depots response")?;

        Ok(body.data.into_iter().filter_map(|r| r.route).map(|r| RouteId(r.document_id)).collect())
    }
}

/// Test double seeded directly, grounded on the teacher's `InMemoryXxxBmc` convention.
#[derive(Debug, Default)]
pub struct InMemoryTopologyClient {
    depot_by_route: std::sync::Mutex<std::collections::HashMap<RouteId, Depot>>,
    routes_by_depot: std::sync::Mutex<std::collections::HashMap<DepotId, Vec<RouteId>>>,
}

impl InMemoryTopologyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn associate(&self, route_id: RouteId, depot: Depot) {
        self.routes_by_depot
            .lock()
            .unwrap()
            .entry(depot.id.clone())
            .or_default()
            .push(route_id.clone());
        self.depot_by_route.lock().unwrap().insert(route_id, depot);
    }
}

#[async_trait]
impl TopologyClient for InMemoryTopologyClient {
    async fn depot_for_route(&self, route_id: &RouteId) -> Result<Option<Depot>> {
        Ok(self.depot_by_route.lock().unwrap().get(route_id).cloned())
    }

    async fn routes_for_depot(&self, depot_id: &DepotId) -> Result<Vec<RouteId>> {
        Ok(self.routes_by_depot.lock().unwrap().get(depot_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depot(id: &str) -> Depot {
        Depot {
            id: DepotId(id.to_string()),
            name: format!("Depot {id}"),
            location: LatLon::new(52.0, 13.0),
            served_routes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn associate_is_queryable_from_both_ends() {
        let client = InMemoryTopologyClient::new();
        client.associate(RouteId("r1".into()), depot("d1"));
        client.associate(RouteId("r2".into()), depot("d1"));

        let found = client.depot_for_route(&RouteId("r1".into())).await.unwrap();
        assert_eq!(found.unwrap().id, DepotId("d1".into()));

        let mut routes = client.routes_for_depot(&DepotId("d1".into())).await.unwrap();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(routes, vec![RouteId("r1".into()), RouteId("r2".into())]);
    }

    #[tokio::test]
    async fn unknown_route_or_depot_resolves_to_empty() {
        let client = InMemoryTopologyClient::new();
        assert!(client.depot_for_route(&RouteId("missing".into())).await.unwrap().is_none());
        assert!(client.routes_for_depot(&DepotId("missing".into())).await.unwrap().is_empty());
    }
}

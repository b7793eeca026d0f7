//! Manifest service (§6 "Manifest service (provided)"), backed by
//! `transit_core::manifest`. Grounded on
//! `original_source/.../manifest_api.py`'s route surface.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use transit_core::manifest::build_manifest;
use transit_domain::{PassengerStatus, RouteId, SpawnError};

use crate::error::ApiError;
use crate::model::{
    BarchartBucket, BarchartQuery, BarchartResponse, DeleteManifestQuery, DeleteManifestResponse, ManifestQuery, ManifestResponse,
    StatsQuery, StatsResponse, TableQuery,
};
use crate::state::AppState;

fn require_route(route: &Option<String>) -> Result<RouteId, ApiError> {
    route
        .clone()
        .map(RouteId)
        .ok_or_else(|| SpawnError::Validation("a route query parameter is required".into()).into())
}

fn status_label(status: PassengerStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[utoipa::path(get, path = "/api/manifest", params(ManifestQuery), responses((status = 200, body = ManifestResponse)))]
pub async fn list_manifest(State(state): State<AppState>, Query(params): Query<ManifestQuery>) -> Result<Json<ManifestResponse>, ApiError> {
    let route_id = require_route(&params.route)?;
    let mut rows = build_manifest(state.repository.as_ref(), state.geo_client.clone(), &route_id).await?;

    if let Some(depot) = &params.depot {
        rows.retain(|r| r.passenger.depot_id.as_ref().map(|d| d.0 == *depot).unwrap_or(false));
    }
    if let Some(status) = &params.status {
        let wanted = status.to_uppercase();
        rows.retain(|r| status_label(r.passenger.status) == wanted);
    }
    if let Some(start) = params.start {
        rows.retain(|r| r.passenger.spawn_time >= start);
    }
    if let Some(end) = params.end {
        rows.retain(|r| r.passenger.spawn_time <= end);
    }
    if params.sort.as_deref() == Some("desc") {
        rows.reverse();
    }

    let total = rows.len();
    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }

    Ok(Json(ManifestResponse { rows, total }))
}

#[utoipa::path(
    get,
    path = "/api/manifest/visualization/barchart",
    params(BarchartQuery),
    responses((status = 200, body = BarchartResponse))
)]
pub async fn barchart(State(state): State<AppState>, Query(params): Query<BarchartQuery>) -> Result<Json<BarchartResponse>, ApiError> {
    let route_id = RouteId(params.route);
    let rows = build_manifest(state.repository.as_ref(), state.geo_client.clone(), &route_id).await?;

    let start_hour = params.start_hour.unwrap_or(0);
    let end_hour = params.end_hour.unwrap_or(23);

    let mut counts: HashMap<u32, usize> = HashMap::new();
    for row in &rows {
        if row.passenger.spawn_time.date_naive() != params.date {
            continue;
        }
        let hour = row.passenger.spawn_time.format("%H").to_string().parse::<u32>().unwrap_or(0);
        if hour < start_hour || hour > end_hour {
            continue;
        }
        *counts.entry(hour).or_insert(0) += 1;
    }

    let mut buckets: Vec<BarchartBucket> = (start_hour..=end_hour)
        .map(|hour| BarchartBucket {
            hour,
            count: counts.get(&hour).copied().unwrap_or(0),
        })
        .collect();
    buckets.sort_by_key(|b| b.hour);

    Ok(Json(BarchartResponse { buckets }))
}

#[utoipa::path(get, path = "/api/manifest/visualization/table", params(TableQuery), responses((status = 200, body = ManifestResponse)))]
pub async fn table(State(state): State<AppState>, Query(params): Query<TableQuery>) -> Result<Json<ManifestResponse>, ApiError> {
    let route_id = RouteId(params.route);
    let mut rows = build_manifest(state.repository.as_ref(), state.geo_client.clone(), &route_id).await?;
    rows.retain(|r| r.passenger.spawn_time.date_naive() == params.date);
    let total = rows.len();
    Ok(Json(ManifestResponse { rows, total }))
}

#[utoipa::path(get, path = "/api/manifest/stats", params(StatsQuery), responses((status = 200, body = StatsResponse)))]
pub async fn stats(State(state): State<AppState>, Query(params): Query<StatsQuery>) -> Result<Json<StatsResponse>, ApiError> {
    let route_id = RouteId(params.route);
    let rows = build_manifest(state.repository.as_ref(), state.geo_client.clone(), &route_id).await?;
    let rows: Vec<_> = rows.into_iter().filter(|r| r.passenger.spawn_time.date_naive() == params.date).collect();

    let total_passengers = rows.len();
    let avg_travel_distance_m = if total_passengers == 0 {
        0.0
    } else {
        rows.iter().map(|r| r.travel_distance_m).sum::<f64>() / total_passengers as f64
    };

    let mut by_status: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        *by_status.entry(status_label(row.passenger.status)).or_insert(0) += 1;
    }

    Ok(Json(StatsResponse {
        total_passengers,
        avg_travel_distance_m,
        by_status,
    }))
}

/// Requires `confirm=true` (§6 "confirm must be true to delete") and, when
/// this server is configured with an `AUTH_TOKEN`, a matching
/// `Authorization: Bearer <token>` header.
#[utoipa::path(
    delete,
    path = "/api/manifest",
    params(DeleteManifestQuery),
    responses((status = 200, body = DeleteManifestResponse), (status = 400), (status = 401))
)]
pub async fn delete_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DeleteManifestQuery>,
) -> Result<Json<DeleteManifestResponse>, ApiError> {
    check_auth(&state, &headers)?;

    if params.confirm != Some(true) {
        return Err(SpawnError::Validation("confirm=true is required to delete a manifest".into()).into());
    }

    let route_id = RouteId(params.route);
    let waiting = state.repository.query_waiting(&transit_store::Ctx::Anonymous, Some(&route_id)).await?;

    let mut cancelled = 0;
    for passenger in waiting {
        state.repository.mark_cancelled(&transit_store::Ctx::Anonymous, passenger.id).await?;
        cancelled += 1;
    }

    Ok(Json(DeleteManifestResponse { cancelled }))
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.auth_token else {
        return Ok(());
    };

    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(SpawnError::Authorization("missing or invalid bearer token".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use chrono::Utc;
    use transit_core::geo_client::InMemoryGeoClient;
    use transit_core::topology_client::InMemoryTopologyClient;
    use transit_domain::{DepotId, LatLon, PassengerId, Route, SpawnRequest};
    use transit_store::config_loader::{ConfigLoader, InMemoryConfigSource};
    use transit_store::{Ctx, InMemoryPassengerRepository, PassengerRepositoryTrait};

    use crate::telemetry::DeviceTelemetryStore;

    use super::*;

    fn test_state(auth_token: Option<&str>) -> AppState {
        test_state_with_geo(auth_token, Arc::new(InMemoryGeoClient::new()))
    }

    fn test_state_with_geo(auth_token: Option<&str>, geo_client: Arc<InMemoryGeoClient>) -> AppState {
        AppState {
            repository: Arc::new(InMemoryPassengerRepository::new()),
            geo_client,
            topology_client: Arc::new(InMemoryTopologyClient::new()),
            config_loader: Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(Default::default())))),
            device_telemetry: Arc::new(DeviceTelemetryStore::seeded(Utc::now(), 52.0, 13.0)),
            auth_token: auth_token.map(str::to_string),
            stale_after_sec: 120,
            geocode_concurrency: 5,
        }
    }

    async fn seed_passenger(state: &AppState, route: &str, depot: Option<&str>, spawn_time: chrono::DateTime<Utc>) {
        let req = SpawnRequest {
            passenger_id: Some(PassengerId::generate()),
            spawn_location: LatLon::new(52.0, 13.0),
            destination_location: LatLon::new(52.01, 13.01),
            route_id: RouteId(route.to_string()),
            depot_id: depot.map(|d| DepotId(d.to_string())),
            direction: None,
            spawn_time,
            spawn_context: transit_domain::SpawnContext::Route,
            generation_method: "test".to_string(),
            priority: 1.0,
        };
        let passenger = transit_domain::Passenger::from_request(req, "Somewhere", 30);
        state.repository.create(&Ctx::Anonymous, passenger).await.unwrap();
    }

    #[tokio::test]
    async fn list_manifest_requires_a_route() {
        let state = test_state(None);
        let err = list_manifest(State(state), Query(ManifestQuery { route: None, depot: None, status: None, start: None, end: None, limit: None, sort: None }))
            .await
            .unwrap_err();
        assert!(matches!(err.0, SpawnError::Validation(_)));
    }

    #[tokio::test]
    async fn list_manifest_filters_by_depot_and_status() {
        let state = test_state(None);
        seed_passenger(&state, "route-1", Some("depot-a"), Utc::now()).await;
        seed_passenger(&state, "route-1", Some("depot-b"), Utc::now()).await;

        let params = ManifestQuery {
            route: Some("route-1".to_string()),
            depot: Some("depot-a".to_string()),
            status: Some("waiting".to_string()),
            start: None,
            end: None,
            limit: None,
            sort: None,
        };
        let Json(resp) = list_manifest(State(state), Query(params)).await.unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.rows[0].passenger.depot_id, Some(DepotId("depot-a".to_string())));
    }

    #[tokio::test]
    async fn list_manifest_applies_limit_after_computing_total() {
        let state = test_state(None);
        for _ in 0..3 {
            seed_passenger(&state, "route-1", None, Utc::now()).await;
        }

        let params = ManifestQuery {
            route: Some("route-1".to_string()),
            depot: None,
            status: None,
            start: None,
            end: None,
            limit: Some(1),
            sort: None,
        };
        let Json(resp) = list_manifest(State(state), Query(params)).await.unwrap();
        assert_eq!(resp.rows.len(), 1);
        assert_eq!(resp.total, 3);
    }

    #[tokio::test]
    async fn delete_manifest_requires_confirm_true() {
        let state = test_state(None);
        let params = DeleteManifestQuery {
            route: "route-1".to_string(),
            confirm: None,
        };
        let err = delete_manifest(State(state), axum::http::HeaderMap::new(), Query(params)).await.unwrap_err();
        assert!(matches!(err.0, SpawnError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_manifest_cancels_waiting_passengers_for_the_route() {
        let state = test_state(None);
        seed_passenger(&state, "route-1", None, Utc::now()).await;
        seed_passenger(&state, "route-2", None, Utc::now()).await;

        let params = DeleteManifestQuery {
            route: "route-1".to_string(),
            confirm: Some(true),
        };
        let Json(resp) = delete_manifest(State(state.clone()), axum::http::HeaderMap::new(), Query(params)).await.unwrap();
        assert_eq!(resp.cancelled, 1);

        let remaining = state.repository.query_waiting(&Ctx::Anonymous, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].route_id, RouteId("route-2".to_string()));
    }

    #[test]
    fn check_auth_rejects_missing_bearer_token() {
        let state = test_state(Some("secret-token"));
        let err = check_auth(&state, &axum::http::HeaderMap::new()).unwrap_err();
        assert!(matches!(err.0, SpawnError::Authorization(_)));
    }

    #[test]
    fn check_auth_accepts_matching_bearer_token() {
        let state = test_state(Some("secret-token"));
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer secret-token".parse().unwrap());
        assert!(check_auth(&state, &headers).is_ok());
    }

    #[test]
    fn check_auth_is_a_no_op_when_no_token_is_configured() {
        let state = test_state(None);
        assert!(check_auth(&state, &axum::http::HeaderMap::new()).is_ok());
    }

    #[tokio::test]
    async fn barchart_buckets_counts_by_hour_within_the_requested_range() {
        let geo = Arc::new(InMemoryGeoClient::new());
        geo.seed_route(Route::new(RouteId("route-1".to_string()), "One", vec![LatLon::new(52.0, 13.0)]));
        let state = test_state_with_geo(None, geo);

        let morning = Utc::now().date_naive().and_hms_opt(8, 0, 0).unwrap().and_utc();
        let evening = Utc::now().date_naive().and_hms_opt(18, 0, 0).unwrap().and_utc();
        seed_passenger(&state, "route-1", None, morning).await;
        seed_passenger(&state, "route-1", None, evening).await;

        let params = BarchartQuery {
            date: Utc::now().date_naive(),
            route: "route-1".to_string(),
            start_hour: Some(0),
            end_hour: Some(12),
        };
        let Json(resp) = barchart(State(state), Query(params)).await.unwrap();
        let total: usize = resp.buckets.iter().map(|b| b.count).sum();
        assert_eq!(total, 1);
        assert_eq!(resp.buckets.iter().find(|b| b.hour == 8).unwrap().count, 1);
    }
}

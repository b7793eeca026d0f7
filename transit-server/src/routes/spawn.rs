//! Spawner streaming endpoint (§6 "Spawner streaming endpoint (provided)").
//! `GET /spawn/route/{routeId}` runs one spawn cycle and streams the
//! resulting `SpawnRequest`s back as newline-delimited JSON.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use futures::stream;
use transit_core::spawner::Spawner;
use transit_domain::{RouteId, SpawnError};

use crate::error::ApiError;
use crate::model::SpawnQuery;
use crate::state::AppState;

const DEFAULT_WINDOW_MINUTES: u32 = 60;

fn resolve_current_time(query: &SpawnQuery) -> Result<DateTime<Utc>, ApiError> {
    let now = Utc::now();

    let date = match &query.day {
        Some(day) => {
            let weekday: Weekday = day
                .parse()
                .map_err(|_| SpawnError::Validation(format!("invalid day: {day}")))?;
            let today_idx = now.weekday().num_days_from_monday() as i64;
            let wanted_idx = weekday.num_days_from_monday() as i64;
            now.date_naive() + chrono::Duration::days(wanted_idx - today_idx)
        }
        None => now.date_naive(),
    };

    let time = match &query.time {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S").map_err(|_| SpawnError::Validation(format!("invalid time: {t}")))?,
        None => now.time(),
    };

    Ok(DateTime::<Utc>::from_naive_utc_and_offset(NaiveDateTime::new(date, time), Utc))
}

/// Not part of the documented OpenAPI schema set: the response is a raw
/// newline-delimited JSON stream rather than a single JSON body, which
/// `utoipa`'s schema derivation doesn't model well — the route is still
/// registered directly on the router in `main`.
pub async fn spawn_route(State(state): State<AppState>, Path(route_id): Path<String>, Query(query): Query<SpawnQuery>) -> Result<Response, ApiError> {
    let current_time = resolve_current_time(&query)?;
    let window = query.window.unwrap_or(DEFAULT_WINDOW_MINUTES);

    let spawner = state.route_spawner(RouteId(route_id));
    let requests = spawner.spawn(current_time, window).await?;

    let lines = stream::iter(requests.into_iter().map(|req| {
        let mut line = serde_json::to_vec(&req).expect("SpawnRequest always serializes");
        line.push(b'\n');
        Ok::<_, std::io::Error>(line)
    }));

    let body = Body::from_stream(lines);

    Ok((
        [(CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;
    use transit_core::geo_client::InMemoryGeoClient;
    use transit_core::topology_client::InMemoryTopologyClient;
    use transit_domain::{ConfigKey, LatLon, Route, SpawnConfig};
    use transit_store::config_loader::{ConfigLoader, InMemoryConfigSource};
    use transit_store::InMemoryPassengerRepository;

    use crate::telemetry::DeviceTelemetryStore;

    use super::*;

    fn query(day: Option<&str>, time: Option<&str>) -> SpawnQuery {
        SpawnQuery {
            time: time.map(str::to_string),
            day: day.map(str::to_string),
            window: None,
        }
    }

    #[test]
    fn resolves_explicit_day_and_time() {
        let resolved = resolve_current_time(&query(Some("Monday"), Some("08:30:00"))).unwrap();
        assert_eq!(resolved.weekday(), chrono::Weekday::Mon);
        assert_eq!(resolved.format("%H:%M:%S").to_string(), "08:30:00");
    }

    #[test]
    fn falls_back_to_now_when_day_and_time_are_absent() {
        let before = Utc::now();
        let resolved = resolve_current_time(&query(None, None)).unwrap();
        assert!((resolved - before).num_seconds().abs() < 5);
    }

    #[test]
    fn rejects_an_unrecognized_weekday() {
        let err = resolve_current_time(&query(Some("Someday"), None)).unwrap_err();
        assert!(matches!(err.0, SpawnError::Validation(_)));
    }

    #[test]
    fn rejects_a_malformed_time() {
        let err = resolve_current_time(&query(None, Some("not-a-time"))).unwrap_err();
        assert!(matches!(err.0, SpawnError::Validation(_)));
    }

    #[tokio::test]
    async fn spawn_route_streams_ndjson_with_zero_passengers_at_zero_rate() {
        let geo = Arc::new(InMemoryGeoClient::new());
        let route_id = RouteId("route-1".to_string());
        geo.seed_route(Route::new(route_id.clone(), "One", vec![LatLon::new(52.0, 13.0), LatLon::new(52.01, 13.0)]));

        let mut configs = HashMap::new();
        configs.insert(
            ConfigKey::Route(route_id.clone()),
            SpawnConfig {
                spatial_base: 0.0,
                ..SpawnConfig::defaults()
            },
        );

        let state = AppState {
            repository: Arc::new(InMemoryPassengerRepository::new()),
            geo_client: geo,
            topology_client: Arc::new(InMemoryTopologyClient::new()),
            config_loader: Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(configs)))),
            device_telemetry: Arc::new(DeviceTelemetryStore::seeded(Utc::now(), 52.0, 13.0)),
            auth_token: None,
            stale_after_sec: 120,
            geocode_concurrency: 5,
        };

        let response = spawn_route(
            State(state),
            Path("route-1".to_string()),
            Query(SpawnQuery { time: None, day: None, window: Some(60) }),
        )
        .await
        .unwrap();

        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/x-ndjson")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty(), "zero spatial_base must draw zero passengers");
    }
}

//! Device-telemetry facade (§6 added surface backing C9). Read-only view
//! over [`crate::telemetry::DeviceTelemetryStore`].

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::model::{DeviceRow, TelemetryHealthResponse};
use crate::state::AppState;

#[utoipa::path(get, path = "/api/telemetry/devices", responses((status = 200, body = [DeviceRow])))]
pub async fn devices(State(state): State<AppState>) -> Json<Vec<DeviceRow>> {
    Json(state.device_telemetry.devices(Utc::now(), state.stale_after_sec))
}

#[utoipa::path(get, path = "/api/telemetry/health", responses((status = 200, body = TelemetryHealthResponse)))]
pub async fn health(State(state): State<AppState>) -> Json<TelemetryHealthResponse> {
    let now = Utc::now();
    Json(TelemetryHealthResponse {
        device_count: state.device_telemetry.device_count(),
        stale_count: state.device_telemetry.stale_count(now, state.stale_after_sec),
        stale_after_sec: state.stale_after_sec,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use transit_core::geo_client::InMemoryGeoClient;
    use transit_core::topology_client::InMemoryTopologyClient;
    use transit_store::config_loader::{ConfigLoader, InMemoryConfigSource};
    use transit_store::InMemoryPassengerRepository;

    use crate::telemetry::DeviceTelemetryStore;

    use super::*;

    fn test_state(seeded_at: chrono::DateTime<Utc>, stale_after_sec: u64) -> AppState {
        AppState {
            repository: Arc::new(InMemoryPassengerRepository::new()),
            geo_client: Arc::new(InMemoryGeoClient::new()),
            topology_client: Arc::new(InMemoryTopologyClient::new()),
            config_loader: Arc::new(ConfigLoader::with_default_ttl(Arc::new(InMemoryConfigSource::new(Default::default())))),
            device_telemetry: Arc::new(DeviceTelemetryStore::seeded(seeded_at, 52.0, 13.0)),
            auth_token: None,
            stale_after_sec,
            geocode_concurrency: 5,
        }
    }

    #[tokio::test]
    async fn devices_lists_every_seeded_device_with_freshness_flag() {
        let state = test_state(Utc::now(), 120);
        let Json(rows) = devices(State(state)).await;
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| !r.stale));
    }

    #[tokio::test]
    async fn health_counts_stale_devices_against_the_configured_threshold() {
        let seeded_at = Utc::now() - chrono::Duration::seconds(300);
        let state = test_state(seeded_at, 120);
        let Json(resp) = health(State(state)).await;
        assert_eq!(resp.device_count, 10);
        assert_eq!(resp.stale_count, 10);
        assert_eq!(resp.stale_after_sec, 120);
    }
}

//! Synthetic GPS device-telemetry facade (§6 device-telemetry facade, added
//! to complete C9). Grounded on
//! `original_source/deprecated/world/fleet_manager/scripts/seed_gps_devices.py`
//! for the shape of a device row; real GPS ingestion is out of scope (§1),
//! so this store never receives live position updates — it only tracks
//! when each device was last "seen" so the janitor and
//! `GET /api/telemetry/health` can report staleness.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::DeviceRow;

#[derive(Debug, Clone)]
struct Device {
    device_id: String,
    last_seen: DateTime<Utc>,
    lat: f64,
    lon: f64,
}

/// Seeded once at startup with the same fleet the original seeder ships,
/// placed around a single depot location so the facade has plausible
/// coordinates without a real vehicle feed.
#[derive(Debug)]
pub struct DeviceTelemetryStore {
    devices: Mutex<Vec<Device>>,
}

const SEED_DEVICE_NAMES: &[&str] = &[
    "GPS-001",
    "GPS-002",
    "TRK-ZR101",
    "TRK-ZR102",
    "TRK-ZR103",
    "GPS-BACKUP-01",
    "GPS-MOBILE-01",
    "GPS-MOBILE-02",
    "GPS-TEST-DEV",
    "GPS-PREMIUM-01",
];

impl DeviceTelemetryStore {
    pub fn seeded(now: DateTime<Utc>, origin_lat: f64, origin_lon: f64) -> Self {
        let devices = SEED_DEVICE_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| Device {
                device_id: name.to_string(),
                last_seen: now,
                lat: origin_lat + (i as f64) * 0.001,
                lon: origin_lon + (i as f64) * 0.001,
            })
            .collect();

        Self { devices: Mutex::new(devices) }
    }

    pub fn devices(&self, now: DateTime<Utc>, stale_after_sec: u64) -> Vec<DeviceRow> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .map(|d| DeviceRow {
                device_id: d.device_id.clone(),
                last_seen: d.last_seen,
                lat: d.lat,
                lon: d.lon,
                stale: is_stale(d.last_seen, now, stale_after_sec),
            })
            .collect()
    }

    pub fn stale_count(&self, now: DateTime<Utc>, stale_after_sec: u64) -> usize {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| is_stale(d.last_seen, now, stale_after_sec))
            .count()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().unwrap().len()
    }
}

fn is_stale(last_seen: DateTime<Utc>, now: DateTime<Utc>, stale_after_sec: u64) -> bool {
    (now - last_seen).num_seconds() > stale_after_sec as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_seeded_devices_are_not_stale() {
        let now = Utc::now();
        let store = DeviceTelemetryStore::seeded(now, 52.0, 13.0);
        assert_eq!(store.device_count(), SEED_DEVICE_NAMES.len());
        assert_eq!(store.stale_count(now, 120), 0);
    }

    #[test]
    fn devices_become_stale_once_stale_after_sec_elapses() {
        let seeded_at = Utc::now() - chrono::Duration::seconds(200);
        let store = DeviceTelemetryStore::seeded(seeded_at, 52.0, 13.0);
        let checked_at = seeded_at + chrono::Duration::seconds(200);
        assert_eq!(store.stale_count(checked_at, 120), SEED_DEVICE_NAMES.len());
    }
}

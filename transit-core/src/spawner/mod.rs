//! Spawner capability (§4.6): composes the Config Loader, Geospatial Query
//! Service client and the kernel to produce and persist `SpawnRequest`s for
//! one scope (a route or a depot). Two implementations share this trait
//! rather than a deep class hierarchy, grounded on `StClientTrait`'s
//! `#[async_trait] pub trait ...: Send + Sync + Debug` shape (spec.md §9
//! "dynamic dispatch -> capability interfaces").

pub mod depot_spawner;
pub mod route_spawner;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use transit_domain::SpawnRequest;

/// `idle -> loading_config -> loading_geometry -> querying_spatial ->
/// calculating -> materializing -> idle`; any step may transition to
/// `Failed`, which returns to `Idle` after incrementing `spawn_errors`
/// (§4.6 state machine). No state is persisted between cycles except the
/// spawner's own caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnerState {
    Idle,
    LoadingConfig,
    LoadingGeometry,
    QueryingSpatial,
    Calculating,
    Materializing,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnerStats {
    pub total_spawned: u64,
    pub spawn_errors: u64,
}

impl SpawnerStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.total_spawned + self.spawn_errors;
        if total == 0 {
            0.0
        } else {
            self.total_spawned as f64 / total as f64
        }
    }
}

#[async_trait]
pub trait Spawner: Send + Sync + std::fmt::Debug {
    /// Stable name used by the coordinator's `enable_<name>` config keys
    /// and in aggregate statistics (§4.7).
    fn name(&self) -> &'static str;

    async fn spawn(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<Vec<SpawnRequest>>;

    /// `spawn` plus a push through this spawner's reservoir; returns the
    /// number of passengers actually persisted.
    async fn spawn_and_store(&self, current_time: DateTime<Utc>, time_window_minutes: u32) -> anyhow::Result<usize>;

    async fn stats(&self) -> SpawnerStats;
}

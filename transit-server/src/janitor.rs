//! Background sweep that prunes stale passenger state (§5 "background
//! task runs every 30s... pruning stale state", added to complete C9).
//! Grounded on `agent_manager.rs`'s long-lived, self-restarting background
//! task shape and on the original's `deprecated/world/fleet_manager`
//! periodic-sweep scripts; a failed tick is logged and never aborts the
//! task, matching §5's propagation rule for background work.

use std::time::Duration;

use chrono::Utc;
use transit_store::{Ctx, PassengerRepositoryTrait};

const JANITOR_TICK: Duration = Duration::from_secs(30);

/// Runs until the process exits. Intended to be `tokio::spawn`ed once at
/// startup.
pub async fn run(repository: std::sync::Arc<dyn PassengerRepositoryTrait>) {
    let mut ticker = tokio::time::interval(JANITOR_TICK);
    loop {
        ticker.tick().await;
        match repository.delete_expired(&Ctx::Anonymous, Utc::now()).await {
            Ok(count) if count > 0 => tracing::info!(expired = count, "janitor pruned stale passengers"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "janitor tick failed"),
        }
    }
}

//! `transit-cli`: the two CLI surfaces named in §6 ("CLI surfaces
//! (provided)") — `list-passengers` and `seed`. Grounded on the teacher's
//! `st-cli` binary shape (a `clap::Subcommand` enum dispatched from
//! `main`), scoped down from its SpaceTraders-specific agent-runner
//! subcommand to this system's two utilities.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use transit_core::geo_client::{GeoClient, HttpGeoClient, NoopGeoClient};
use transit_core::spawner::Spawner;
use transit_core::topology_client::ContentApiTopologyClient;
use transit_domain::{DepotId, LatLon, PassengerStatus, RouteId};
use transit_server::config::AppConfig;
use transit_store::config_loader::{ConfigLoader, ContentApiConfigSource};
use transit_store::content_client::create_client;
use transit_store::passenger_repository::{ContentApiPassengerRepository, PassengerRepositoryTrait};
use transit_store::Ctx;

#[derive(Parser)]
#[command(author, version, about = "transit-cli: passenger listing and seeding utilities", long_about = None)]
struct Args {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List waiting passengers, optionally filtered.
    ListPassengers {
        #[arg(long)]
        route: Option<String>,
        #[arg(long)]
        depot: Option<String>,
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<usize>,
        /// `asc` (default) or `desc`, ordering by spawn_time.
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run spawn cycles across a whole day for one route, every route, or
    /// every depot, persisting the resulting passengers.
    Seed {
        #[arg(long, value_parser = parse_weekday)]
        day: Weekday,
        /// `all`, or a single route short name / id.
        #[arg(long, default_value = "all")]
        route: String,
        #[arg(long, default_value_t = false)]
        depot_spawning: bool,
    },
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.parse().map_err(|_| format!("not a weekday: {s}"))
}

#[derive(Deserialize)]
struct RouteRow {
    #[serde(rename = "documentId")]
    document_id: String,
}

#[derive(Deserialize)]
struct RoutesResponse {
    data: Vec<RouteRow>,
}

#[derive(Deserialize)]
struct DepotRow {
    #[serde(rename = "documentId")]
    document_id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct DepotsResponse {
    data: Vec<DepotRow>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env();
    tracing_subscriber::registry().with(fmt::layer()).with(env_filter).try_init().ok();

    let args = Args::parse();
    if let Err(err) = args.config.validate() {
        eprintln!("configuration error: {err}");
        std::process::exit(1);
    }

    let exit_code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(args: Args) -> Result<()> {
    let config = args.config;
    let content_api_client = create_client(config.strapi_token.clone());

    let repository: Arc<dyn PassengerRepositoryTrait> =
        Arc::new(ContentApiPassengerRepository::new(content_api_client.clone(), config.strapi_url.clone()));

    match args.command {
        Command::ListPassengers {
            route,
            depot,
            start,
            end,
            limit,
            sort,
            status,
            json,
        } => list_passengers(repository.as_ref(), route, depot, start, end, limit, sort, status, json).await,
        Command::Seed { day, route, depot_spawning } => {
            let topology_client = Arc::new(ContentApiTopologyClient::new(content_api_client.clone(), config.strapi_url.clone()));
            let config_loader = Arc::new(ConfigLoader::with_default_ttl(Arc::new(ContentApiConfigSource::new(
                content_api_client.clone(),
                config.strapi_url.clone(),
            ))));
            let geo_client: Arc<dyn GeoClient> = match config.geospatial_base_url() {
                Some(url) => Arc::new(HttpGeoClient::new(url)),
                None => Arc::new(NoopGeoClient),
            };

            seed(
                &config,
                content_api_client,
                repository,
                topology_client,
                config_loader,
                geo_client,
                day,
                route,
                depot_spawning,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn list_passengers(
    repository: &dyn PassengerRepositoryTrait,
    route: Option<String>,
    depot: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: Option<usize>,
    sort: Option<String>,
    status: Option<String>,
    json: bool,
) -> Result<()> {
    let route_id = route.map(RouteId);
    let mut passengers = repository.query_waiting(&Ctx::Anonymous, route_id.as_ref()).await?;

    if let Some(depot) = &depot {
        passengers.retain(|p| p.depot_id.as_ref().map(|d| d.0 == *depot).unwrap_or(false));
    }
    if let Some(status) = &status {
        let wanted = status.to_uppercase();
        passengers.retain(|p| status_label(p.status) == wanted);
    }
    if let Some(start) = start {
        passengers.retain(|p| p.spawn_time >= start);
    }
    if let Some(end) = end {
        passengers.retain(|p| p.spawn_time <= end);
    }

    passengers.sort_by_key(|p| p.spawn_time);
    if sort.as_deref() == Some("desc") {
        passengers.reverse();
    }
    if let Some(limit) = limit {
        passengers.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&passengers)?);
    } else {
        println!("{:<38} {:<10} {:<12} {:<24} {:<9}", "id", "route", "status", "spawn_time", "priority");
        for p in &passengers {
            println!(
                "{:<38} {:<10} {:<12} {:<24} {:<9}",
                p.id,
                p.route_id,
                status_label(p.status),
                p.spawn_time.to_rfc3339(),
                p.priority
            );
        }
        println!("\n{} passenger(s)", passengers.len());
    }

    Ok(())
}

fn status_label(status: PassengerStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

async fn fetch_route_ids(client: &reqwest_middleware::ClientWithMiddleware, strapi_url: &str, route_arg: &str) -> Result<Vec<RouteId>> {
    if route_arg != "all" {
        return Ok(vec![RouteId(route_arg.to_string())]);
    }

    let response = client
        .get(format!("{strapi_url}/api/routes"))
        .query(&[("pagination[pageSize]", "200")])
        .send()
        .await
        .context("listing routes for seeding")?
        .error_for_status()
        .context("content api rejected route listing")?;

    let body: RoutesResponse = response.json().await.context("decoding routes response")?;
    Ok(body.data.into_iter().map(|r| RouteId(r.document_id)).collect())
}

async fn fetch_depots(client: &reqwest_middleware::ClientWithMiddleware, strapi_url: &str) -> Result<Vec<(DepotId, LatLon)>> {
    let response = client
        .get(format!("{strapi_url}/api/depots"))
        .query(&[("pagination[pageSize]", "200")])
        .send()
        .await
        .context("listing depots for seeding")?
        .error_for_status()
        .context("content api rejected depot listing")?;

    let body: DepotsResponse = response.json().await.context("decoding depots response")?;
    Ok(body
        .data
        .into_iter()
        .filter_map(|d| Some((DepotId(d.document_id), LatLon::new(d.latitude?, d.longitude?))))
        .collect())
}

/// Resolves `day` to a concrete UTC date this week, then runs one spawn
/// cycle per hour (§6 seeding utility) for every targeted route (and,
/// when `--depot-spawning` is set, every depot), persisting via each
/// spawner's own reservoir. Re-running for the same day re-runs the same
/// cycles rather than purging first — idempotent only insofar as a
/// cycle's own Poisson draw can legitimately vary run to run, matching
/// the utility's documented "replaces prior rows only if the caller
/// explicitly purges first" contract.
#[allow(clippy::too_many_arguments)]
async fn seed(
    config: &AppConfig,
    content_api_client: reqwest_middleware::ClientWithMiddleware,
    repository: Arc<dyn PassengerRepositoryTrait>,
    topology_client: Arc<ContentApiTopologyClient>,
    config_loader: Arc<ConfigLoader>,
    geo_client: Arc<dyn GeoClient>,
    day: Weekday,
    route_arg: String,
    depot_spawning: bool,
) -> Result<()> {
    use transit_core::reservoir::{Reservoir, ReservoirScope};
    use transit_core::spawner::depot_spawner::DepotSpawner;
    use transit_core::spawner::route_spawner::RouteSpawner;

    let today = Utc::now().date_naive();
    let today_idx = Utc::now().weekday().num_days_from_monday() as i64;
    let wanted_idx = day.num_days_from_monday() as i64;
    let date = today + chrono::Duration::days(wanted_idx - today_idx);

    let route_ids = fetch_route_ids(&content_api_client, &config.strapi_url, &route_arg).await?;
    let mut total_spawned = 0usize;

    for route_id in &route_ids {
        let reservoir = Reservoir::new(ReservoirScope::Route(route_id.clone()), repository.clone());
        let spawner = RouteSpawner::new(route_id.clone(), config_loader.clone(), geo_client.clone(), topology_client.clone(), reservoir);

        for hour in 0..24 {
            let time = NaiveTime::from_hms_opt(hour, 0, 0).expect("valid hour");
            let current_time = DateTime::<Utc>::from_naive_utc_and_offset(NaiveDateTime::new(date, time), Utc);
            total_spawned += spawner
                .spawn_and_store(current_time, 60)
                .await
                .with_context(|| format!("spawning for route {route_id} at {current_time}"))?;
        }
    }

    if depot_spawning {
        let depots = fetch_depots(&content_api_client, &config.strapi_url).await?;
        for (depot_id, location) in depots {
            let reservoir = Reservoir::new(ReservoirScope::Depot(depot_id.clone()), repository.clone());
            let spawner = DepotSpawner::new(depot_id.clone(), location, config_loader.clone(), geo_client.clone(), topology_client.clone(), reservoir);

            for hour in 0..24 {
                let time = NaiveTime::from_hms_opt(hour, 0, 0).expect("valid hour");
                let current_time = DateTime::<Utc>::from_naive_utc_and_offset(NaiveDateTime::new(date, time), Utc);
                total_spawned += spawner
                    .spawn_and_store(current_time, 60)
                    .await
                    .with_context(|| format!("spawning for depot {depot_id} at {current_time}"))?;
            }
        }
    }

    println!("seeded {total_spawned} passenger(s) for {day} ({date})");
    Ok(())
}

//! Startup configuration (§6 "Environment variables (recognized)"),
//! parsed with `clap::Parser` the same way `transit-geo`'s `AppConfig`
//! is — every field also takes an `env(...)` fallback so the binary runs
//! unconfigured in a dev shell and wired purely by environment in a
//! container.

use clap::Parser;

#[derive(Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct AppConfig {
    /// Base URL of the Content API (Strapi), the system of record for
    /// passengers, routes, depots, route-depot junctions and spawn configs.
    #[arg(long, env("STRAPI_URL"), default_value = "http://localhost:1337")]
    pub strapi_url: String,

    #[arg(long, env("STRAPI_TOKEN"))]
    pub strapi_token: Option<String>,

    /// Base URL of the geospatial service (`transit-geo`). `GEOSPATIAL_URL`
    /// takes precedence; `GEO_URL` is accepted as an alias since both names
    /// are recognized per spec. Neither set falls back to `NoopGeoClient`
    /// (spec.md §9 nullable-dependency rule) with a startup warning.
    #[arg(long, env("GEOSPATIAL_URL"))]
    pub geospatial_url: Option<String>,

    #[arg(long, env("GEO_URL"))]
    pub geo_url: Option<String>,

    /// Base URL this server is reachable at, used only by `transit-cli`'s
    /// list-passengers utility to find the manifest HTTP surface.
    #[arg(long, env("MANIFEST_URL"), default_value = "http://localhost:8080")]
    pub manifest_url: String,

    /// Bearer token required on the destructive `DELETE /api/manifest`
    /// surface. Missing in production is a fatal startup error (§6).
    #[arg(long, env("AUTH_TOKEN"))]
    pub auth_token: Option<String>,

    /// "development" (default) skips the `auth_token` requirement; any
    /// other value is treated as production.
    #[arg(long, env("APP_ENV"), default_value = "development")]
    pub app_env: String,

    #[arg(long, env("STALE_AFTER_SEC"), default_value_t = 120)]
    pub stale_after_sec: u64,

    #[arg(long, env("CORS_ORIGINS"), default_value = "*")]
    pub cors_origins: String,

    #[arg(long, env("GEOCODE_CONCURRENCY"), default_value_t = transit_core::manifest::DEFAULT_GEOCODE_CONCURRENCY)]
    pub geocode_concurrency: usize,

    #[arg(long, env("PORT"), default_value_t = 8080)]
    pub port: u16,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.app_env != "development"
    }

    /// Fatal-at-startup checks that can't be expressed as clap requirements
    /// because they depend on another field's value (§6 "missing AUTH_TOKEN
    /// in production is a fatal startup error").
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.is_production() && self.auth_token.is_none() {
            anyhow::bail!("AUTH_TOKEN is required when APP_ENV is not \"development\"");
        }
        Ok(())
    }

    pub fn geospatial_base_url(&self) -> Option<&str> {
        self.geospatial_url.as_deref().or(self.geo_url.as_deref())
    }
}

use thiserror::Error;

/// Crosses every HTTP boundary in the workspace; small and matchable on
/// purpose so `transit-geo` and `transit-server` can map variants to status
/// codes without string-sniffing.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("bad spawn config: {0}")]
    Config(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("spatial query failed: {0}")]
    Spatial(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type SpawnResult<T> = Result<T, SpawnError>;

//! Reuses `transit-geo`'s `SpawnError` -> HTTP status mapping rather than
//! re-deriving it: both services sit on the same error taxonomy (§7) and
//! the same axum `IntoResponse` conventions, so one `ApiError` adapter
//! serves both.

pub use transit_geo::ApiError;

pub mod error;
pub mod model;
pub mod routes;
pub mod store;

pub use error::ApiError;
pub use store::{GeocodeResult, GeofenceResult, InMemorySpatialStore, PostgisSpatialStore, SpatialStore};

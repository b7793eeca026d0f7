pub mod error;
pub mod geometry;
pub mod ids;
pub mod model;
pub mod spawn_calculator;

pub use error::{SpawnError, SpawnResult};
pub use ids::{BuildingId, ConfigKey, DepotId, PassengerId, RouteId};
pub use model::{
    Building, Depot, Direction, LatLon, Passenger, PassengerStatus, Route, SpawnConfig,
    SpawnContext, SpawnRequest, SpawnerKind, DEFAULT_TTL_MINUTES,
};

pub mod config_loader;
pub mod content_client;
pub mod ctx;
pub mod passenger_repository;

pub use config_loader::{ConfigLoader, ConfigSourceTrait, ContentApiConfigSource, InMemoryConfigSource};
pub use ctx::Ctx;
pub use passenger_repository::{ContentApiPassengerRepository, InMemoryPassengerRepository, PassengerRepositoryTrait};

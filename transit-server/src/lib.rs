pub mod config;
pub mod error;
pub mod janitor;
pub mod model;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;

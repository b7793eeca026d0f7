pub mod manifest;
pub mod spawn;
pub mod telemetry;

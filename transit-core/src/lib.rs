pub mod coordinator;
pub mod geo_client;
pub mod manifest;
pub mod reservoir;
pub mod spawner;
pub mod topology_client;

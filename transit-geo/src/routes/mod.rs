pub mod geocode;
pub mod geofence;
pub mod spatial;

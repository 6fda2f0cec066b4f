//! geofix: picks the best position out of satellite and network fixes.

pub mod location;
pub mod plugin;
pub mod scenario;
pub mod server;

//! API endpoint modules.

pub mod generations;
pub mod health;
pub mod openapi;

pub use generations::configure_routes as configure_generation_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;

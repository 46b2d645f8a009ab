//! HTTP surface: health probes, metrics and live updates.

pub mod health;
pub mod websocket;

pub use health::configure_health_routes;
pub use websocket::configure_routes as configure_websocket_routes;

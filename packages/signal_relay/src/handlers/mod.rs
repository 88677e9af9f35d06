pub mod health;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::{dashboard_handler, health_handler, health_live_handler, metrics_handler};
pub use websocket::signaling_websocket_handler;

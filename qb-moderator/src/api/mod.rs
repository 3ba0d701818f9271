//! HTTP API handlers for qb-moderator
//!
//! Read-only; the moderator takes no commands over HTTP.

pub mod health;
pub mod status;

pub use health::health_routes;
pub use status::status_routes;

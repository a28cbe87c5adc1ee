//! Service layer for the roster-dispatch service
//!
//! This module contains the application state, its teardown, and the HTTP
//! routes that trigger dispatches.

pub mod app;
pub mod health;
pub mod routes;

pub use app::AppState;
pub use health::{HealthCheck, HealthStatus};
pub use routes::router;

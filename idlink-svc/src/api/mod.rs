//! HTTP API handlers

pub mod health;
pub mod identify;

pub use health::health_routes;
pub use identify::{identify, ApiError, IdentifyBody, IdentifyResponse};

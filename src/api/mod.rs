//! API Layer Module
//!
//! HTTP server, routes, and request-pipeline handlers for the paid blob
//! server: `PUT /upload`, `GET /:sha`, `HEAD /upload`, `HEAD /:sha`.

pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

pub use middleware::{RateLimiter, RateLimitState, ValidationError};
pub use server::{build_state, create_router, start_server};
pub use state::{AppState, SharedAppState};

//! API Module
//!
//! HTTP handlers and routing for the memoized user lookup service.
//!
//! # Endpoints
//! - `GET /user/:user_id` - Memoized user lookup
//! - `DELETE /user/:user_id` - Drop a cached profile
//! - `POST /user_refresh` - Re-fetch every known user
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

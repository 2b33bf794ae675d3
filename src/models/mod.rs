//! Response models for the user lookup API
//!
//! This module defines the DTOs (Data Transfer Objects) serialized into HTTP
//! response bodies. Request parameters are plain `CallOptions` query strings.

pub mod responses;

// Re-export commonly used types
pub use responses::{
    HealthResponse, InvalidateResponse, LookupResponse, RefreshSummary, StatsResponse,
};

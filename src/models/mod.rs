//! Request and Response models for the demo server API
//!
//! Bodies are JSON; cached values are arbitrary JSON documents.

pub mod requests;
pub mod responses;

pub use requests::SetRequest;
pub use responses::{
    CallResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse, SetResponse,
    StatsResponse,
};

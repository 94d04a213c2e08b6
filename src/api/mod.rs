//! REST API client module for the knowledge base service.
//!
//! This module provides the `ApiClient` for logging in, keeping the bearer
//! credential fresh, and fetching knowledge base data.
//!
//! The service uses bearer token authentication obtained through its
//! form-encoded `token` endpoint; an expired token is exchanged once per
//! request via the `refresh` endpoint before the request is replayed.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthEvent};
pub use error::ApiError;

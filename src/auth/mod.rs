//! Authentication module for session state.
//!
//! This module provides `SessionStore`, the single owner of the
//! access/refresh token pair. The store is a cheap-to-clone handle shared
//! with the API client and the router, and is persisted to disk so a
//! session survives restarts.

pub mod session;

pub use session::{SessionStore, TokenPair};

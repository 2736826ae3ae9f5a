//! Client side of the session renewal protocol.
//!
//! This module provides the `ApiClient` for exchanging a refresh token for
//! a fresh access token at the Disco backend, and the `RenewalTransport`
//! seam the session gate calls through so tests can substitute a fake.

pub mod client;
pub mod error;

pub use client::{
    parse_renewal, ApiClient, RenewalGrant, RenewalTransport, MAX_EXPIRES_IN_SECS,
    REQUEST_TIMEOUT_SECS,
};
pub use error::RenewalError;

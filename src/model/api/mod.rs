//! API-facing request and response types.
//!
//! IDs are exposed as plain hex strings and datetimes in RFC 3339 format.

pub mod admin;
pub mod audit;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod election;
pub mod id;
pub mod voter;

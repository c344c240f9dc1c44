//! Remote data source boundary.
//!
//! The sync orchestrator only ever talks to the remote API through the
//! `RecordSource` trait, injected at construction time. `ApiClient` is the
//! production implementation over HTTP.

pub mod client;
pub mod error;

pub use client::{ApiClient, RecordSource};
pub use error::ApiError;

//! Ingestion endpoint client and authentication.
//!
//! This module provides the [`IngestClient`] for submitting batches to the
//! ingestion endpoint, along with the credential type ([`Auth`]).

mod auth;
mod ingest;

pub use auth::Auth;
pub use ingest::{DEFAULT_REQUEST_TIMEOUT, HealthStatus, IngestClient};

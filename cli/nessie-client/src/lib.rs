//! HTTP client for the Nessie v2 catalog API.
//!
//! This crate provides:
//! - [`CatalogClient`], translating catalog operations (references, commits,
//!   merges, transplants, diffs, contents) into authenticated HTTP requests
//! - Authentication strategies selected once per client from [`AuthConfig`]
//! - Typed errors separating configuration, transport, API and decoding failures
//! - Helpers for following paginated responses
//!
//! ## Usage
//!
//! ```ignore
//! use nessie_client::{AuthConfig, CatalogApi, CatalogClient, ClientConfig};
//!
//! let config = ClientConfig {
//!     auth: AuthConfig::Bearer { token },
//!     ..ClientConfig::new("http://localhost:19120/api/v2")
//! };
//!
//! let client = CatalogClient::new(config)?;
//! let hash = client.get_reference_hash("main").await?;
//! ```
//!
//! Writes follow an optimistic concurrency protocol: the caller passes the hash
//! it last observed for a branch and receives
//! [`ApiErrorKind::ConcurrentModification`] if the branch moved in the meantime.
//! The client never retries on its own.

pub mod auth;
mod client;
mod config;
mod error;
mod paging;
mod query;
pub mod types;

// Public exports
pub use auth::{Auth, AuthStrategy};
pub use client::{CatalogApi, CatalogClient};
pub use config::{AuthConfig, ClientConfig, DEFAULT_BRANCH, DEFAULT_TIMEOUT_SECS};
pub use error::{ApiError, ApiErrorKind, AuthError, CatalogClientError, ConfigError, ErrorResponse};
pub use paging::{diff_stream, entries_stream, log_stream, reference_stream};

//! Bearer token authentication strategy

use std::fmt;

use reqwest::header::{self, HeaderValue};
use reqwest::Request;
use tracing::trace;

use super::AuthStrategy;
use crate::error::AuthError;

/// Bearer token authentication strategy
///
/// Sends the same token with every request.
#[derive(Clone)]
pub struct BearerTokenAuth {
    token: String,
}

impl BearerTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenAuth").finish_non_exhaustive()
    }
}

impl AuthStrategy for BearerTokenAuth {
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        request.headers_mut().insert(header::AUTHORIZATION, value);
        trace!("added bearer token authorization header");
        Ok(())
    }
}

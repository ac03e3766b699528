//! Authentication strategies for catalog client requests
//!
//! A client selects one strategy from its [AuthConfig] when it is built
//! and applies it to every request it sends. The available strategies are:
//!
//! - [NoAuth]: requests are sent as they are
//! - [BearerTokenAuth]: a static `Authorization: Bearer` header
//! - [BasicAuth]: HTTP basic authentication
//! - [AwsSigV4Auth]: AWS Signature Version 4, computed for each request

use enum_dispatch::enum_dispatch;
use reqwest::Request;

use crate::config::AuthConfig;
use crate::error::{AuthError, ConfigError};

mod aws;
mod basic;
mod bearer_token;

pub use aws::{AwsCredentials, AwsSigV4Auth, DEFAULT_AWS_SERVICE};
pub use basic::BasicAuth;
pub use bearer_token::BearerTokenAuth;

/// Strategy pattern for attaching credentials to a request
#[enum_dispatch]
pub trait AuthStrategy {
    /// Add credentials to a fully built request.
    ///
    /// Called right before the request is sent,
    /// so the method, URL, headers and body are final.
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError>;
}

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn authenticate(&self, _request: &mut Request) -> Result<(), AuthError> {
        Ok(())
    }
}

/// The authentication strategy of a client.
#[derive(Debug, Clone)]
#[enum_dispatch(AuthStrategy)]
pub enum Auth {
    None(NoAuth),
    Bearer(BearerTokenAuth),
    Basic(BasicAuth),
    Aws(AwsSigV4Auth),
}

impl Auth {
    /// Select the strategy for `config`.
    ///
    /// AWS credentials are resolved here, once,
    /// so a missing profile fails before any request is sent.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let auth = match config {
            AuthConfig::None => NoAuth.into(),
            AuthConfig::Bearer { token } => BearerTokenAuth::new(token.clone()).into(),
            AuthConfig::Basic { username, password } => {
                BasicAuth::new(username.clone(), password.clone()).into()
            },
            AuthConfig::Aws {
                region,
                profile,
                service,
            } => {
                let credentials = AwsCredentials::resolve(profile.as_deref())?;
                AwsSigV4Auth::new(
                    region.clone(),
                    service.as_deref().unwrap_or(DEFAULT_AWS_SERVICE),
                    credentials,
                )
                .into()
            },
        };
        Ok(auth)
    }
}

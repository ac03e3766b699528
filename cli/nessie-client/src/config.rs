//! Configuration types for catalog client construction.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Branch used when the caller does not name one.
pub const DEFAULT_BRANCH: &str = "main";
/// Request timeout applied when the configuration does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for catalog client construction.
///
/// The configuration is validated once when the client is built
/// and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the Nessie v2 API, e.g. `http://localhost:19120/api/v2`.
    pub endpoint: String,
    /// How requests are authenticated.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Verify the TLS certificate presented by the endpoint.
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Branch to use when an operation is not given an explicit reference.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Custom `User-Agent` header.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Additional headers to include in requests.
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_verify() -> bool {
    true
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    /// Unauthenticated configuration for `endpoint` with all other options at their defaults.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: AuthConfig::None,
            verify: default_verify(),
            default_branch: default_branch(),
            timeout: default_timeout(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Check the configuration and return the parsed endpoint.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let endpoint = Url::parse(self.endpoint.trim_end_matches('/')).map_err(|source| {
            ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                source,
            }
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(endpoint.scheme().to_string()));
        }
        if endpoint.cannot_be_a_base() {
            return Err(ConfigError::UnsupportedScheme(endpoint.to_string()));
        }
        if self.default_branch.trim().is_empty() {
            return Err(ConfigError::MissingField("default_branch"));
        }
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.auth.validate()?;

        Ok(endpoint)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Authentication scheme and its parameters.
///
/// Deserialized from a table with a case-insensitive `type` tag,
/// e.g. `{ type = "bearer", token = "..." }`.
/// Unknown tags are rejected rather than treated as `none`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAuthConfig", into = "RawAuthConfig")]
pub enum AuthConfig {
    /// Send requests without credentials.
    #[default]
    None,
    /// Static bearer token.
    Bearer { token: String },
    /// AWS Signature Version 4 with credentials of a named profile.
    Aws {
        region: String,
        /// Profile in the shared credentials file.
        /// Environment credentials are used when unset.
        profile: Option<String>,
        /// Service name in the signing scope, `execute-api` when unset.
        service: Option<String>,
    },
    /// HTTP basic authentication.
    Basic { username: String, password: String },
}

impl AuthConfig {
    /// Name of the scheme as used in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Aws { .. } => "aws",
            AuthConfig::Basic { .. } => "basic",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            AuthConfig::None => {},
            AuthConfig::Bearer { token } => {
                if token.trim().is_empty() {
                    return Err(ConfigError::MissingAuthField {
                        auth: "bearer",
                        field: "token",
                    });
                }
            },
            AuthConfig::Aws { region, .. } => {
                if region.trim().is_empty() {
                    return Err(ConfigError::MissingAuthField {
                        auth: "aws",
                        field: "region",
                    });
                }
            },
            AuthConfig::Basic { username, .. } => {
                if username.is_empty() {
                    return Err(ConfigError::MissingAuthField {
                        auth: "basic",
                        field: "username",
                    });
                }
            },
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            AuthConfig::Aws {
                region,
                profile,
                service,
            } => f
                .debug_struct("Aws")
                .field("region", region)
                .field("profile", profile)
                .field("service", service)
                .finish(),
            AuthConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Flat wire form of [AuthConfig], mirroring how it appears in config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAuthConfig {
    #[serde(rename = "type", default = "raw_auth_none")]
    auth_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

fn raw_auth_none() -> String {
    "none".to_string()
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAuthConfig) -> Result<Self, Self::Error> {
        fn required(
            value: Option<String>,
            auth: &'static str,
            field: &'static str,
        ) -> Result<String, ConfigError> {
            value.ok_or(ConfigError::MissingAuthField { auth, field })
        }

        let auth = match raw.auth_type.trim().to_lowercase().as_str() {
            "none" => AuthConfig::None,
            "bearer" => AuthConfig::Bearer {
                token: required(raw.token, "bearer", "token")?,
            },
            "aws" => AuthConfig::Aws {
                region: required(raw.region, "aws", "region")?,
                profile: raw.profile.filter(|profile| !profile.is_empty()),
                service: raw.service.filter(|service| !service.is_empty()),
            },
            "basic" => AuthConfig::Basic {
                username: required(raw.username, "basic", "username")?,
                password: required(raw.password, "basic", "password")?,
            },
            _ => return Err(ConfigError::UnsupportedAuthType(raw.auth_type)),
        };
        Ok(auth)
    }
}

impl From<AuthConfig> for RawAuthConfig {
    fn from(auth: AuthConfig) -> Self {
        let auth_type = auth.kind().to_string();
        match auth {
            AuthConfig::None => RawAuthConfig {
                auth_type,
                ..Default::default()
            },
            AuthConfig::Bearer { token } => RawAuthConfig {
                auth_type,
                token: Some(token),
                ..Default::default()
            },
            AuthConfig::Aws {
                region,
                profile,
                service,
            } => RawAuthConfig {
                auth_type,
                region: Some(region),
                profile,
                service,
                ..Default::default()
            },
            AuthConfig::Basic { username, password } => RawAuthConfig {
                auth_type,
                username: Some(username),
                password: Some(password),
                ..Default::default()
            },
        }
    }
}

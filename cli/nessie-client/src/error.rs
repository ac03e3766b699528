//! Error handling for catalog API operations.

use std::path::PathBuf;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error type for catalog API operations.
///
/// Configuration problems surface when the client is built,
/// everything else when a request is issued.
/// The client never retries; callers decide based on the variant.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    #[error("invalid client configuration")]
    Configuration(#[from] ConfigError),
    #[error("failed to authenticate request")]
    Auth(#[from] AuthError),
    #[error("request to '{url}' failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to encode request body")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to decode response from '{url}'")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl CatalogClientError {
    /// The API error, if the server answered with an error status.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            CatalogClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_error()
            .is_some_and(|err| err.kind == ApiErrorKind::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.api_error()
            .is_some_and(|err| err.kind == ApiErrorKind::AlreadyExists)
    }

    /// The target branch moved past the expected hash.
    ///
    /// Refetch the hash, reapply the change and try again.
    pub fn is_concurrent_modification(&self) -> bool {
        self.api_error()
            .is_some_and(|err| err.kind == ApiErrorKind::ConcurrentModification)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CatalogClientError::Transport { source, .. } if source.is_timeout())
    }

    /// The response did not have the expected shape.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            CatalogClientError::Decode { .. } | CatalogClientError::UnexpectedResponse(_)
        )
    }
}

/// Invalid or unsupported client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{endpoint}'")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported endpoint '{0}', expected an http(s) URL")]
    UnsupportedScheme(String),
    #[error("'{0}' must not be empty")]
    MissingField(&'static str),
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("unsupported authentication type: {0}")]
    UnsupportedAuthType(String),
    #[error("'{field}' is required for {auth} authentication")]
    MissingAuthField {
        auth: &'static str,
        field: &'static str,
    },
    #[error("no AWS credentials found for profile '{profile}'")]
    MissingAwsCredentials { profile: String },
    #[error("could not read AWS credentials file '{}'", path.display())]
    ReadCredentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },
    #[error("could not build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// A request could not be authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials cannot be used as a header value")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error("request URL has no host")]
    MissingHost,
    #[error("failed to compute request signature: {0}")]
    Signing(String),
}

/// Error body returned by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_stack_trace: Option<String>,
}

/// Classification of a non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The reference or content does not exist.
    NotFound,
    /// A reference with the requested name already exists.
    AlreadyExists,
    /// The target moved past the expected hash, or the change conflicts with it.
    ConcurrentModification,
    Other,
}

/// What the failed request was trying to do.
///
/// A bare `409 Conflict` means different things for different requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Read,
    CreateReference,
    Write,
}

/// A response with a non-success status code.
#[derive(Debug, Clone, Error)]
#[error("{}", fmt_api_error(self))]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ApiErrorKind,
    /// Raw response body.
    pub body: String,
    /// Parsed body, if it matched the service's error schema.
    pub details: Option<ErrorResponse>,
}

impl ApiError {
    pub(crate) fn from_response(status: StatusCode, body: String, request: RequestKind) -> Self {
        let details = serde_json::from_str::<ErrorResponse>(&body).ok();
        let kind = details
            .as_ref()
            .and_then(|details| details.error_code.as_deref())
            .and_then(kind_from_error_code)
            .unwrap_or_else(|| kind_from_status(status, request));

        Self {
            status,
            kind,
            body,
            details,
        }
    }

    /// Service error code, e.g. `REFERENCE_CONFLICT`.
    pub fn error_code(&self) -> Option<&str> {
        self.details.as_ref()?.error_code.as_deref()
    }
}

fn kind_from_error_code(code: &str) -> Option<ApiErrorKind> {
    let kind = match code {
        "REFERENCE_NOT_FOUND" | "CONTENT_NOT_FOUND" | "NAMESPACE_NOT_FOUND" => {
            ApiErrorKind::NotFound
        },
        "REFERENCE_ALREADY_EXISTS" | "NAMESPACE_ALREADY_EXISTS" => ApiErrorKind::AlreadyExists,
        "REFERENCE_CONFLICT" => ApiErrorKind::ConcurrentModification,
        _ => return None,
    };
    Some(kind)
}

fn kind_from_status(status: StatusCode, request: RequestKind) -> ApiErrorKind {
    match (status, request) {
        (StatusCode::NOT_FOUND, _) => ApiErrorKind::NotFound,
        (StatusCode::CONFLICT, RequestKind::CreateReference) => ApiErrorKind::AlreadyExists,
        (StatusCode::CONFLICT, RequestKind::Write) => ApiErrorKind::ConcurrentModification,
        _ => ApiErrorKind::Other,
    }
}

fn fmt_api_error(api_error: &ApiError) -> String {
    let status = api_error.status;
    match &api_error.details {
        Some(details) if !details.message.is_empty() => {
            format!("{status}: {}", details.message)
        },
        _ if api_error.body.trim().is_empty() => format!("{status}"),
        // Error pages may be large HTML documents
        _ if api_error.body.len() > 512 => format!("{status}"),
        _ => format!("{status}: {}", api_error.body.trim()),
    }
}

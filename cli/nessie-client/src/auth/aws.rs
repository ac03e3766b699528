//! AWS Signature Version 4 authentication strategy
//!
//! Signatures cover the method, path, query, a set of headers and the body
//! and are only valid for a few minutes, so every request is signed anew.

use std::fmt;
use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use percent_encoding::{
    AsciiSet,
    NON_ALPHANUMERIC,
    percent_decode_str,
    percent_encode,
    utf8_percent_encode,
};
use reqwest::header::{self, HeaderValue};
use reqwest::Request;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, trace};

use super::AuthStrategy;
use crate::error::{AuthError, ConfigError};

/// Service name used in the signing scope unless configured otherwise.
pub const DEFAULT_AWS_SERVICE: &str = "execute-api";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const DEFAULT_PROFILE: &str = "default";
const AMZ_DATE: &str = "x-amz-date";
const AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

type HmacSha256 = Hmac<Sha256>;

/// Everything but the unreserved characters of RFC 3986 is encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    /// Resolve credentials for `profile`.
    ///
    /// Without a profile, `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`
    /// are used if set, otherwise the profile named by `AWS_PROFILE` or `default`.
    /// Profiles are read from `AWS_SHARED_CREDENTIALS_FILE` or `~/.aws/credentials`.
    pub fn resolve(profile: Option<&str>) -> Result<Self, ConfigError> {
        if profile.is_none() {
            if let Some(credentials) = Self::from_env() {
                debug!("using AWS credentials from environment");
                return Ok(credentials);
            }
        }

        let profile = profile
            .map(ToString::to_string)
            .or_else(|| std::env::var("AWS_PROFILE").ok())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let found = match credentials_file() {
            Some(path) => Self::from_credentials_file(&path, &profile)?,
            None => None,
        };
        found.ok_or(ConfigError::MissingAwsCredentials { profile })
    }

    fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }

    fn from_credentials_file(path: &Path, profile: &str) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "AWS credentials file does not exist");
                return Ok(None);
            },
            Err(source) => {
                return Err(ConfigError::ReadCredentials {
                    path: path.to_path_buf(),
                    source,
                });
            },
        };
        Ok(Self::parse_profile(&contents, profile))
    }

    /// Read a profile section from the INI formatted credentials file.
    fn parse_profile(contents: &str, profile: &str) -> Option<Self> {
        let mut in_profile = false;
        let mut access_key_id = None;
        let mut secret_access_key = None;
        let mut session_token = None;

        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let section = section.trim();
                let section = section.strip_prefix("profile ").unwrap_or(section).trim();
                in_profile = section == profile;
                continue;
            }
            if !in_profile {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "aws_access_key_id" => access_key_id = Some(value),
                "aws_secret_access_key" => secret_access_key = Some(value),
                "aws_session_token" => session_token = Some(value),
                _ => {},
            }
        }

        Some(Self {
            access_key_id: access_key_id?,
            secret_access_key: secret_access_key?,
            session_token,
        })
    }
}

fn credentials_file() -> Option<PathBuf> {
    match std::env::var_os("AWS_SHARED_CREDENTIALS_FILE") {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::home_dir().map(|home| home.join(".aws").join("credentials")),
    }
}

/// AWS Signature Version 4 authentication strategy
#[derive(Debug, Clone)]
pub struct AwsSigV4Auth {
    region: String,
    service: String,
    credentials: AwsCredentials,
}

impl AwsSigV4Auth {
    pub fn new(
        region: impl Into<String>,
        service: impl Into<String>,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
            credentials,
        }
    }

    /// Sign `request` as if it was sent at `now`.
    fn sign_at(&self, request: &mut Request, now: OffsetDateTime) -> Result<(), AuthError> {
        let amz_date = format!(
            "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
            now.year(),
            u8::from(now.month()),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        );
        let date_stamp = &amz_date[..8];

        let host = {
            let url = request.url();
            let host = url.host_str().ok_or(AuthError::MissingHost)?;
            match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            }
        };

        let headers = request.headers_mut();
        headers.insert(header::HOST, HeaderValue::from_str(&host)?);
        headers.insert(AMZ_DATE, HeaderValue::from_str(&amz_date)?);
        if let Some(token) = &self.credentials.session_token {
            let mut value = HeaderValue::from_str(token)?;
            value.set_sensitive(true);
            headers.insert(AMZ_SECURITY_TOKEN, value);
        }

        let payload = request
            .body()
            .map(|body| {
                body.as_bytes()
                    .ok_or_else(|| AuthError::Signing("streaming bodies cannot be signed".into()))
            })
            .transpose()?
            .unwrap_or_default();
        let payload_hash = hex::encode(Sha256::digest(payload));

        let (signed_headers, canonical_headers) = canonical_headers(request)?;
        let canonical_request = format!(
            "{method}\n{uri}\n{query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            method = request.method().as_str(),
            uri = canonical_uri(request.url().path()),
            query = canonical_query(request.url()),
        );
        trace!(%canonical_request, "built canonical request");

        let scope = format!(
            "{date_stamp}/{region}/{service}/aws4_request",
            region = self.region,
            service = self.service
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = [
            date_stamp,
            self.region.as_str(),
            self.service.as_str(),
            "aws4_request",
        ]
        .iter()
        .try_fold(
            format!("AWS4{}", self.credentials.secret_access_key).into_bytes(),
            |key, part| hmac_sha256(&key, part.as_bytes()),
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            access_key = self.credentials.access_key_id,
        );
        let mut value = HeaderValue::from_str(&authorization)?;
        value.set_sensitive(true);
        request.headers_mut().insert(header::AUTHORIZATION, value);
        trace!(%signed_headers, "signed request");
        Ok(())
    }
}

impl AuthStrategy for AwsSigV4Auth {
    fn authenticate(&self, request: &mut Request) -> Result<(), AuthError> {
        self.sign_at(request, OffsetDateTime::now_utc())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| AuthError::Signing(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Headers covered by the signature: `host`, `content-type` and all `x-amz-*` headers.
///
/// Returns the `;` separated header names and the canonical header block.
fn canonical_headers(request: &Request) -> Result<(String, String), AuthError> {
    let mut signed = request
        .headers()
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name == "host" || name == "content-type" || name.starts_with("x-amz-")
        })
        .map(|(name, value)| {
            let value = value
                .to_str()
                .map_err(|err| AuthError::Signing(format!("header '{name}': {err}")))?;
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            Ok((name.as_str().to_string(), value))
        })
        .collect::<Result<Vec<_>, AuthError>>()?;
    signed.sort();

    let names = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let block = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    Ok((names, block))
}

/// Each segment is encoded twice, as required for every service but S3.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| {
            let raw = percent_decode_str(segment).collect::<Vec<u8>>();
            let once = percent_encode(&raw, URI_ENCODE_SET).to_string();
            utf8_percent_encode(&once, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(url: &url::Url) -> String {
    let mut pairs = url
        .query_pairs()
        .map(|(key, value)| {
            (
                utf8_percent_encode(&key, URI_ENCODE_SET).to_string(),
                utf8_percent_encode(&value, URI_ENCODE_SET).to_string(),
            )
        })
        .collect::<Vec<_>>();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        }
    }

    /// 2015-08-30T12:36:00Z
    fn example_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1440938160).unwrap()
    }

    /// `get-vanilla` from the AWS Signature Version 4 test suite
    #[test]
    fn signs_reference_request() {
        let auth = AwsSigV4Auth::new("us-east-1", "service", example_credentials());
        let mut request = reqwest::Client::new()
            .get("https://example.amazonaws.com/")
            .build()
            .unwrap();

        auth.sign_at(&mut request, example_time()).unwrap();

        assert_eq!(request.headers()[AMZ_DATE], "20150830T123600Z");
        assert_eq!(
            request.headers()[header::AUTHORIZATION],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn session_token_is_signed() {
        let credentials = AwsCredentials {
            session_token: Some("session".to_string()),
            ..example_credentials()
        };
        let auth = AwsSigV4Auth::new("eu-west-1", DEFAULT_AWS_SERVICE, credentials);
        let mut request = reqwest::Client::new()
            .post("https://nessie.example.com/api/v2/trees?name=dev&type=BRANCH")
            .header(header::CONTENT_TYPE, "application/json")
            .body(r#"{"type":"BRANCH","name":"main"}"#)
            .build()
            .unwrap();

        auth.sign_at(&mut request, example_time()).unwrap();

        assert_eq!(request.headers()[AMZ_SECURITY_TOKEN], "session");
        let authorization = request.headers()[header::AUTHORIZATION].to_str().unwrap();
        assert!(authorization.contains(
            "/20150830/eu-west-1/execute-api/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date;x-amz-security-token, "
        ));
    }

    #[test]
    fn signature_changes_with_time() {
        let auth = AwsSigV4Auth::new("us-east-1", "service", example_credentials());
        let build = || {
            reqwest::Client::new()
                .get("https://example.amazonaws.com/")
                .build()
                .unwrap()
        };
        let mut first = build();
        let mut second = build();
        auth.sign_at(&mut first, example_time()).unwrap();
        auth.sign_at(&mut second, example_time() + time::Duration::minutes(5))
            .unwrap();
        assert_ne!(
            first.headers()[header::AUTHORIZATION],
            second.headers()[header::AUTHORIZATION]
        );
    }

    #[test]
    fn canonical_uri_double_encodes_segments() {
        assert_eq!(canonical_uri("/"), "/");
        assert_eq!(
            canonical_uri("/api/v2/trees/main@abc/history"),
            "/api/v2/trees/main%2540abc/history"
        );
        assert_eq!(
            canonical_uri("/trees/feature%2Fx"),
            "/trees/feature%252Fx"
        );
        // bytes that are not UTF-8 are kept as they are
        assert_eq!(canonical_uri("/trees/%FF"), "/trees/%25FF");
    }

    #[test]
    fn canonical_query_is_sorted_and_encoded() {
        let url =
            url::Url::parse("http://localhost/trees?page-token=a%2Bb&key=z&key=a.b&fetch=ALL")
                .unwrap();
        assert_eq!(
            canonical_query(&url),
            "fetch=ALL&key=a.b&key=z&page-token=a%2Bb"
        );
    }

    #[test]
    fn parses_named_profile() {
        let contents = "\
            [default]\n\
            aws_access_key_id = DEFAULTKEY\n\
            aws_secret_access_key = DEFAULTSECRET\n\
            \n\
            # comment\n\
            [dev]\n\
            aws_access_key_id=DEVKEY\n\
            aws_secret_access_key=DEVSECRET\n\
            aws_session_token=DEVTOKEN\n";

        assert_eq!(
            AwsCredentials::parse_profile(contents, "dev"),
            Some(AwsCredentials {
                access_key_id: "DEVKEY".to_string(),
                secret_access_key: "DEVSECRET".to_string(),
                session_token: Some("DEVTOKEN".to_string()),
            })
        );
        assert_eq!(
            AwsCredentials::parse_profile(contents, "default")
                .unwrap()
                .access_key_id,
            "DEFAULTKEY"
        );
        assert_eq!(AwsCredentials::parse_profile(contents, "prod"), None);
    }

    #[test]
    #[serial]
    fn resolves_profile_from_credentials_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[analytics]\naws_access_key_id = AKID\naws_secret_access_key = SECRET"
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("AWS_SHARED_CREDENTIALS_FILE", Some(file.path().as_os_str())),
                ("AWS_ACCESS_KEY_ID", None),
                ("AWS_SECRET_ACCESS_KEY", None),
            ],
            || {
                let credentials = AwsCredentials::resolve(Some("analytics")).unwrap();
                assert_eq!(credentials.access_key_id, "AKID");

                let err = AwsCredentials::resolve(Some("missing")).unwrap_err();
                assert!(matches!(
                    err,
                    ConfigError::MissingAwsCredentials { profile } if profile == "missing"
                ));
            },
        );
    }

    #[test]
    #[serial]
    fn environment_credentials_without_profile() {
        temp_env::with_vars(
            [
                ("AWS_ACCESS_KEY_ID", Some("ENVKEY")),
                ("AWS_SECRET_ACCESS_KEY", Some("ENVSECRET")),
                ("AWS_SESSION_TOKEN", None),
            ],
            || {
                let credentials = AwsCredentials::resolve(None).unwrap();
                assert_eq!(credentials, AwsCredentials {
                    access_key_id: "ENVKEY".to_string(),
                    secret_access_key: "ENVSECRET".to_string(),
                    session_token: None,
                });
            },
        );
    }
}

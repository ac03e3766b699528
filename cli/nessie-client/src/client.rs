//! Catalog client issuing requests against the Nessie v2 REST API.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{Auth, AuthStrategy};
use crate::config::ClientConfig;
use crate::error::{ApiError, CatalogClientError, ConfigError, RequestKind};
use crate::query::QueryParams;
use crate::types::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const APPLICATION_JSON: &str = "application/json";

/// A client for the catalog service.
///
/// Holds the validated configuration, the authentication strategy and a
/// pooled HTTP client. It keeps no other state between calls,
/// so a single instance can serve concurrent requests.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    config: ClientConfig,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("endpoint", &self.base_url.as_str())
            .field("auth", &self.config.auth.kind())
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a new catalog client from configuration.
    ///
    /// Fails if the configuration is invalid or the authentication
    /// strategy cannot be set up; no request is sent in either case.
    pub fn new(config: ClientConfig) -> Result<Self, CatalogClientError> {
        let base_url = config.validate()?;
        let auth = Auth::from_config(&config.auth)?;
        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            base_url,
            auth,
            config,
        })
    }

    /// Create a client that sends requests through `http`.
    ///
    /// TLS settings and extra headers of `config` are left to whoever built `http`.
    /// The request timeout of `config` still bounds every request.
    pub fn with_http_client(
        config: ClientConfig,
        http: reqwest::Client,
    ) -> Result<Self, CatalogClientError> {
        let base_url = config.validate()?;
        let auth = Auth::from_config(&config.auth)?;
        Ok(Self {
            http,
            base_url,
            auth,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    pub fn default_branch(&self) -> &str {
        &self.config.default_branch
    }

    /// Endpoint URL extended by `segments`, each percent-encoded as a single segment.
    fn url<S: AsRef<str>>(
        &self,
        segments: impl IntoIterator<Item = S>,
    ) -> Result<Url, CatalogClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::UnsupportedScheme(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn build_request(
        &self,
        method: Method,
        url: Url,
        query: &QueryParams,
        body: Option<Vec<u8>>,
    ) -> Result<Request, CatalogClientError> {
        let mut builder = self
            .http
            .request(method, url.clone())
            .timeout(self.config.request_timeout())
            .header(header::ACCEPT, APPLICATION_JSON);
        if !query.is_empty() {
            builder = builder.query(query.pairs());
        }
        if let Some(body) = body {
            builder = builder
                .header(header::CONTENT_TYPE, APPLICATION_JSON)
                .body(body);
        }
        builder
            .build()
            .map_err(|source| CatalogClientError::Transport {
                url: url.to_string(),
                source,
            })
    }

    /// Authenticate, send and decode a request.
    ///
    /// Any status outside 2xx becomes an [ApiError]; nothing is retried.
    async fn execute<T: DeserializeOwned>(
        &self,
        mut request: Request,
        kind: RequestKind,
    ) -> Result<T, CatalogClientError> {
        self.auth.authenticate(&mut request)?;

        let url = request.url().to_string();
        debug!(method = %request.method(), %url, "sending catalog request");

        let response =
            self.http
                .execute(request)
                .await
                .map_err(|source| CatalogClientError::Transport {
                    url: url.clone(),
                    source,
                })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| CatalogClientError::Transport {
                url: url.clone(),
                source,
            })?;
        debug!(%status, bytes = body.len(), "received catalog response");

        if !status.is_success() {
            return Err(ApiError::from_response(status, body, kind).into());
        }

        serde_json::from_str(&body).map_err(|source| CatalogClientError::Decode { url, source })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &QueryParams,
    ) -> Result<T, CatalogClientError> {
        let request = self.build_request(Method::GET, url, query, None)?;
        self.execute(request, RequestKind::Read).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        query: &QueryParams,
        body: &B,
        kind: RequestKind,
    ) -> Result<T, CatalogClientError> {
        let body = serde_json::to_vec(body).map_err(CatalogClientError::Encode)?;
        let request = self.build_request(method, url, query, Some(body))?;
        self.execute(request, kind).await
    }
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// The complete catalog API interface.
///
/// Reference arguments accept a bare name (`main`) or a name pinned to a
/// commit (`main@abc123`). Writes take the hash the caller last observed;
/// if the branch moved since, the call fails with
/// [crate::ApiErrorKind::ConcurrentModification] and nothing is changed.
///
/// This trait enables alternate implementations, e.g. in-memory fakes in tests.
#[allow(async_fn_in_trait)]
pub trait CatalogApi {
    /// Get the server configuration and supported API versions.
    async fn get_config(&self) -> Result<ServiceConfig, CatalogClientError>;

    /// Get one page of branches and tags.
    async fn list_references(
        &self,
        params: &ListReferencesParams,
    ) -> Result<ReferencePage, CatalogClientError>;

    /// Get a single reference.
    async fn get_reference_details(
        &self,
        reference: &str,
        fetch: Option<FetchOption>,
    ) -> Result<Reference, CatalogClientError>;

    /// Get the hash a reference currently points to.
    async fn get_reference_hash(&self, name: &str) -> Result<String, CatalogClientError> {
        let reference = self.get_reference_details(name, None).await?;
        reference.hash.ok_or_else(|| {
            CatalogClientError::UnexpectedResponse(format!("reference '{name}' has no hash"))
        })
    }

    /// Create a branch or tag pointing at the commit `source` points to.
    async fn create_reference(
        &self,
        name: &str,
        reference_type: ReferenceType,
        source: &Reference,
    ) -> Result<Reference, CatalogClientError>;

    /// Point `reference` at the commit of `target`, regardless of history.
    async fn set_reference(
        &self,
        reference: &str,
        expected_hash: Option<&str>,
        reference_type: Option<ReferenceType>,
        target: &Reference,
    ) -> Result<Reference, CatalogClientError>;

    /// Delete a branch or tag and return it as it was at deletion.
    async fn delete_reference(
        &self,
        reference: &str,
        expected_hash: Option<&str>,
        reference_type: Option<ReferenceType>,
    ) -> Result<Reference, CatalogClientError>;

    /// Commit `operations` on top of `expected_hash` of `branch`.
    async fn commit(
        &self,
        branch: &str,
        operations: &CommitOperations,
        expected_hash: Option<&str>,
    ) -> Result<CommitResult, CatalogClientError>;

    /// Commit on top of whatever `branch` currently points to.
    ///
    /// Reads the branch hash once and commits against it.
    /// A commit landing in between still fails with a concurrent modification.
    async fn commit_at_head(
        &self,
        branch: &str,
        operations: &CommitOperations,
    ) -> Result<CommitResult, CatalogClientError> {
        let hash = self.get_reference_hash(branch).await?;
        self.commit(branch, operations, Some(&hash)).await
    }

    /// Merge another reference into `branch`.
    async fn merge(
        &self,
        branch: &str,
        expected_hash: Option<&str>,
        merge: &MergeSpec,
    ) -> Result<MergeResult, CatalogClientError>;

    /// Apply individual commits of another reference onto `branch`.
    async fn transplant(
        &self,
        branch: &str,
        expected_hash: Option<&str>,
        transplant: &TransplantSpec,
    ) -> Result<MergeResult, CatalogClientError>;

    /// Get one page of keys that differ between two references.
    async fn diff(
        &self,
        from_ref: &str,
        to_ref: &str,
        params: &DiffParams,
    ) -> Result<DiffPage, CatalogClientError>;

    /// Get the content of several keys. Keys without content are omitted.
    async fn get_contents(
        &self,
        reference: &str,
        keys: &[ContentKey],
        with_doc: bool,
    ) -> Result<BTreeMap<ContentKey, ContentEntry>, CatalogClientError>;

    /// Get the content of a single key.
    async fn get_content(
        &self,
        reference: &str,
        key: &ContentKey,
        with_doc: bool,
    ) -> Result<ContentEntry, CatalogClientError>;

    /// Get one page of the keys stored on a reference.
    async fn list_entries(
        &self,
        reference: &str,
        params: &EntriesParams,
    ) -> Result<ContentsPage, CatalogClientError>;

    /// Get one page of the commit log of a reference, newest first.
    async fn commit_log(
        &self,
        reference: &str,
        params: &LogParams,
    ) -> Result<LogPage, CatalogClientError>;
}

// ---------------------------------------------------------------------------
// CatalogApi implementation for CatalogClient
// ---------------------------------------------------------------------------

impl CatalogApi for CatalogClient {
    #[instrument(skip_all)]
    async fn get_config(&self) -> Result<ServiceConfig, CatalogClientError> {
        self.get(self.url(["config"])?, &QueryParams::new()).await
    }

    #[instrument(skip_all, fields(page_token = ?params.page_token))]
    async fn list_references(
        &self,
        params: &ListReferencesParams,
    ) -> Result<ReferencePage, CatalogClientError> {
        let response: ReferencesResponse = self
            .get(self.url(["trees"])?, &list_references_query(params))
            .await?;
        let page = ReferencePage::from(response);
        debug!(
            n_references = page.items.len(),
            has_more = page.has_more(),
            "received references"
        );
        Ok(page)
    }

    #[instrument(skip_all, fields(reference = %reference))]
    async fn get_reference_details(
        &self,
        reference: &str,
        fetch: Option<FetchOption>,
    ) -> Result<Reference, CatalogClientError> {
        let mut query = QueryParams::new();
        query.push_opt("fetch", fetch);
        let response: SingleReferenceResponse =
            self.get(self.url(["trees", reference])?, &query).await?;
        Ok(response.reference)
    }

    #[instrument(skip_all, fields(name = %name, %reference_type, source = %source.name))]
    async fn create_reference(
        &self,
        name: &str,
        reference_type: ReferenceType,
        source: &Reference,
    ) -> Result<Reference, CatalogClientError> {
        let mut query = QueryParams::new();
        query.push("name", name).push("type", reference_type);
        let response: SingleReferenceResponse = self
            .send_json(
                Method::POST,
                self.url(["trees"])?,
                &query,
                source,
                RequestKind::CreateReference,
            )
            .await?;
        debug!(hash = ?response.reference.hash, "created reference");
        Ok(response.reference)
    }

    #[instrument(skip_all, fields(reference = %reference, expected_hash = ?expected_hash, target = %target.name))]
    async fn set_reference(
        &self,
        reference: &str,
        expected_hash: Option<&str>,
        reference_type: Option<ReferenceType>,
        target: &Reference,
    ) -> Result<Reference, CatalogClientError> {
        let mut query = QueryParams::new();
        query.push_opt("type", reference_type);
        let url = self.url(["trees", &ref_segment(reference, expected_hash)])?;
        let response: SingleReferenceResponse = self
            .send_json(Method::PUT, url, &query, target, RequestKind::Write)
            .await?;
        Ok(response.reference)
    }

    #[instrument(skip_all, fields(reference = %reference, expected_hash = ?expected_hash))]
    async fn delete_reference(
        &self,
        reference: &str,
        expected_hash: Option<&str>,
        reference_type: Option<ReferenceType>,
    ) -> Result<Reference, CatalogClientError> {
        let mut query = QueryParams::new();
        query.push_opt("type", reference_type);
        let url = self.url(["trees", &ref_segment(reference, expected_hash)])?;
        let request = self.build_request(Method::DELETE, url, &query, None)?;
        let response: SingleReferenceResponse =
            self.execute(request, RequestKind::Write).await?;
        debug!("deleted reference");
        Ok(response.reference)
    }

    #[instrument(skip_all, fields(branch = %branch, expected_hash = ?expected_hash, n_operations = operations.operations.len()))]
    async fn commit(
        &self,
        branch: &str,
        operations: &CommitOperations,
        expected_hash: Option<&str>,
    ) -> Result<CommitResult, CatalogClientError> {
        let url = self.history_url(branch, expected_hash, "commit")?;
        let result: CommitResult = self
            .send_json(
                Method::POST,
                url,
                &QueryParams::new(),
                operations,
                RequestKind::Write,
            )
            .await?;
        debug!(new_hash = ?result.new_hash(), "committed");
        Ok(result)
    }

    #[instrument(skip_all, fields(branch = %branch, expected_hash = ?expected_hash, from = %merge.from_ref_name))]
    async fn merge(
        &self,
        branch: &str,
        expected_hash: Option<&str>,
        merge: &MergeSpec,
    ) -> Result<MergeResult, CatalogClientError> {
        let url = self.history_url(branch, expected_hash, "merge")?;
        self.send_json(
            Method::POST,
            url,
            &QueryParams::new(),
            merge,
            RequestKind::Write,
        )
        .await
    }

    #[instrument(skip_all, fields(branch = %branch, expected_hash = ?expected_hash, from = %transplant.from_ref_name))]
    async fn transplant(
        &self,
        branch: &str,
        expected_hash: Option<&str>,
        transplant: &TransplantSpec,
    ) -> Result<MergeResult, CatalogClientError> {
        let url = self.history_url(branch, expected_hash, "transplant")?;
        self.send_json(
            Method::POST,
            url,
            &QueryParams::new(),
            transplant,
            RequestKind::Write,
        )
        .await
    }

    #[instrument(skip_all, fields(from_ref = %from_ref, to_ref = %to_ref))]
    async fn diff(
        &self,
        from_ref: &str,
        to_ref: &str,
        params: &DiffParams,
    ) -> Result<DiffPage, CatalogClientError> {
        let url = self.url(["trees", from_ref, "diff", to_ref])?;
        let response: DiffResponse = self.get(url, &diff_query(params)).await?;
        Ok(response.into())
    }

    #[instrument(skip_all, fields(reference = %reference, n_keys = keys.len()))]
    async fn get_contents(
        &self,
        reference: &str,
        keys: &[ContentKey],
        with_doc: bool,
    ) -> Result<BTreeMap<ContentKey, ContentEntry>, CatalogClientError> {
        let mut query = QueryParams::new();
        query
            .push_all("key", keys.iter().map(ContentKey::to_path_string))
            .push_opt("with-doc", with_doc.then_some(true));
        let response: MultipleContentsResponse = self
            .get(self.url(["trees", reference, "contents"])?, &query)
            .await?;
        Ok(response.into())
    }

    #[instrument(skip_all, fields(reference = %reference, %key))]
    async fn get_content(
        &self,
        reference: &str,
        key: &ContentKey,
        with_doc: bool,
    ) -> Result<ContentEntry, CatalogClientError> {
        let mut query = QueryParams::new();
        query.push_opt("with-doc", with_doc.then_some(true));
        let url = self.url(["trees", reference, "contents", &key.to_path_string()])?;
        self.get(url, &query).await
    }

    #[instrument(skip_all, fields(reference = %reference))]
    async fn list_entries(
        &self,
        reference: &str,
        params: &EntriesParams,
    ) -> Result<ContentsPage, CatalogClientError> {
        let url = self.url(["trees", reference, "entries"])?;
        let response: EntriesResponse = self.get(url, &entries_query(params)).await?;
        Ok(response.into())
    }

    #[instrument(skip_all, fields(reference = %reference))]
    async fn commit_log(
        &self,
        reference: &str,
        params: &LogParams,
    ) -> Result<LogPage, CatalogClientError> {
        let url = self.url(["trees", reference, "history"])?;
        let response: LogResponse = self.get(url, &log_query(params)).await?;
        Ok(response.into())
    }
}

impl CatalogClient {
    /// `/trees/{branch}@{hash}/history/{action}`
    fn history_url(
        &self,
        branch: &str,
        expected_hash: Option<&str>,
        action: &str,
    ) -> Result<Url, CatalogClientError> {
        self.url(["trees", &ref_segment(branch, expected_hash), "history", action])
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Address a reference, optionally pinned to a hash: `name` or `name@hash`.
fn ref_segment(name: &str, hash: Option<&str>) -> String {
    match hash {
        Some(hash) if !hash.is_empty() => format!("{name}@{hash}"),
        _ => name.to_string(),
    }
}

fn key_string(key: &Option<ContentKey>) -> Option<String> {
    key.as_ref().map(ContentKey::to_path_string)
}

fn list_references_query(params: &ListReferencesParams) -> QueryParams {
    let mut query = QueryParams::new();
    query
        .push_opt("fetch", params.fetch)
        .push_opt("filter", params.filter.as_deref())
        .push_opt("max-records", params.max_records)
        .push_opt("page-token", params.page_token.as_deref());
    query
}

fn diff_query(params: &DiffParams) -> QueryParams {
    let mut query = QueryParams::new();
    query
        .push_opt("filter", params.filter.as_deref())
        .push_all("key", params.keys.iter().map(ContentKey::to_path_string))
        .push_opt("max-key", key_string(&params.max_key))
        .push_opt("max-records", params.max_records)
        .push_opt("min-key", key_string(&params.min_key))
        .push_opt("page-token", params.page_token.as_deref())
        .push_opt("prefix-key", key_string(&params.prefix_key));
    query
}

fn entries_query(params: &EntriesParams) -> QueryParams {
    let mut query = QueryParams::new();
    query
        .push_opt("filter", params.filter.as_deref())
        .push_all("key", params.keys.iter().map(ContentKey::to_path_string))
        .push_opt("min-key", key_string(&params.min_key))
        .push_opt("max-key", key_string(&params.max_key))
        .push_opt("prefix-key", key_string(&params.prefix_key))
        .push_opt("content", params.with_content.then_some(true))
        .push_opt("max-records", params.max_records)
        .push_opt("page-token", params.page_token.as_deref());
    query
}

fn log_query(params: &LogParams) -> QueryParams {
    let mut query = QueryParams::new();
    query
        .push_opt("filter", params.filter.as_deref())
        .push_opt("fetch", params.fetch)
        .push_opt("limit-hash", params.limit_hash.as_deref())
        .push_opt("max-records", params.max_records)
        .push_opt("page-token", params.page_token.as_deref());
    query
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

/// Build the HTTP client with timeouts, TLS policy and extra headers of `config`.
fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, CatalogClientError> {
    let mut headers = HeaderMap::new();

    // Extra headers (embedders can add tracing or tenant headers)
    for (key, value) in &config.extra_headers {
        let invalid = || ConfigError::InvalidHeader { name: key.clone() };
        headers.insert(
            header::HeaderName::from_str(key).map_err(|_| invalid())?,
            HeaderValue::from_str(value).map_err(|_| invalid())?,
        );
    }

    debug!(
        endpoint = %config.endpoint,
        auth = config.auth.kind(),
        verify = config.verify,
        timeout = config.timeout,
        extra_headers = config.extra_headers.len(),
        "building catalog HTTP client"
    );

    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("nessie-client/{}", env!("CARGO_PKG_VERSION")));

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(config.request_timeout())
        .danger_accept_invalid_certs(!config.verify)
        .build()
        .map_err(|e| ConfigError::HttpClient(e).into())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use httpmock::prelude::*;
    use reqwest::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::config::AuthConfig;
    use crate::error::ApiErrorKind;

    fn client_config(server: &MockServer) -> ClientConfig {
        ClientConfig::new(format!("{}/api/v2", server.base_url()))
    }

    fn client(server: &MockServer) -> CatalogClient {
        CatalogClient::new(client_config(server)).unwrap()
    }

    fn reference_json(name: &str, hash: &str) -> serde_json::Value {
        json!({ "reference": { "type": "BRANCH", "name": name, "hash": hash } })
    }

    fn commit_operations() -> CommitOperations {
        CommitOperations::new(
            CommitMeta::new("add orders").with_author("alice"),
            vec![Operation::put(
                ContentKey::new(["db", "orders"]),
                Content::iceberg_table("s3://warehouse/orders/v1.json", 1, 0, 0, 0),
            )],
        )
    }

    fn conflict_body() -> serde_json::Value {
        json!({
            "status": 409,
            "reason": "Conflict",
            "message": "Expected hash abc123 does not match current HEAD def456",
            "errorCode": "REFERENCE_CONFLICT",
        })
    }

    #[test]
    fn ref_segment_pins_hash() {
        assert_eq!(ref_segment("main", None), "main");
        assert_eq!(ref_segment("main", Some("")), "main");
        assert_eq!(ref_segment("main", Some("abc")), "main@abc");
    }

    #[test]
    fn url_encodes_segments() {
        let client =
            CatalogClient::new(ClientConfig::new("http://localhost:19120/api/v2/")).unwrap();
        let url = client.url(["trees", "feature/x@abc", "history"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:19120/api/v2/trees/feature%2Fx@abc/history"
        );
    }

    #[test]
    fn unset_query_params_are_omitted() {
        let client = CatalogClient::new(ClientConfig::new("http://localhost:19120/api/v2")).unwrap();
        let url = client.url(["trees"]).unwrap();

        let query = list_references_query(&ListReferencesParams::default());
        let request = client.build_request(Method::GET, url.clone(), &query, None).unwrap();
        assert_eq!(request.url().query(), None);

        let query = list_references_query(&ListReferencesParams {
            filter: Some(String::new()),
            max_records: NonZeroU32::new(50),
            ..Default::default()
        });
        let request = client.build_request(Method::GET, url, &query, None).unwrap();
        assert_eq!(request.url().query(), Some("max-records=50"));
    }

    #[test]
    fn diff_query_repeats_keys() {
        let query = diff_query(&DiffParams {
            keys: vec![ContentKey::new(["a", "b"]), ContentKey::new(["c"])],
            prefix_key: Some(ContentKey::new(["a"])),
            ..Default::default()
        });
        assert_eq!(query.pairs(), &[
            ("key", "a.b".to_string()),
            ("key", "c".to_string()),
            ("prefix-key", "a".to_string()),
        ]);
    }

    #[test]
    fn unsupported_auth_fails_before_any_request() {
        let config = serde_json::from_value::<ClientConfig>(json!({
            "endpoint": "http://localhost:19120/api/v2",
            "auth": { "type": "oauth2" },
        }));
        let err = config.unwrap_err();
        assert!(
            err.to_string().contains("unsupported authentication type"),
            "{err}"
        );

        let config = ClientConfig {
            auth: AuthConfig::Bearer {
                token: String::new(),
            },
            ..ClientConfig::new("http://localhost:19120/api/v2")
        };
        let err = CatalogClient::new(config).unwrap_err();
        assert!(matches!(err, CatalogClientError::Configuration(_)), "{err:?}");
    }

    #[test]
    fn invalid_extra_header_is_a_configuration_error() {
        let mut config = ClientConfig::new("http://localhost:19120/api/v2");
        config
            .extra_headers
            .insert("bad header".to_string(), "value".to_string());
        let err = CatalogClient::new(config).unwrap_err();
        assert!(matches!(
            err,
            CatalogClientError::Configuration(ConfigError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn get_config_decodes_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/config")
                    .header("accept", "application/json");
                then.status(200).json_body(json!({
                    "defaultBranch": "main",
                    "minSupportedApiVersion": 1,
                    "maxSupportedApiVersion": 2,
                    "actualApiVersion": 2,
                    "specVersion": "2.1.0",
                    "noAncestorHash": "2e1cfa82b035c26cbbbdae632cea070514eb8b773f616aaeaf668e2f0be8f10d",
                }));
            })
            .await;

        let config = client(&server).get_config().await.unwrap();
        assert_eq!(config.default_branch.as_deref(), Some("main"));
        assert_eq!(config.actual_api_version, Some(2));
        mock.assert_async().await;
    }

    /// A server error is an API error carrying the body, not a decode error.
    #[tokio::test]
    async fn get_config_server_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/config");
                then.status(500).body("internal failure");
            })
            .await;

        let err = client(&server).get_config().await.unwrap_err();
        match &err {
            CatalogClientError::Api(api) => {
                assert_eq!(api.status, 500);
                assert_eq!(api.body, "internal failure");
                assert_eq!(api.kind, ApiErrorKind::Other);
            },
            other => panic!("expected API error, found: {other:?}"),
        }
        assert!(!err.is_decode());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unexpected_success_body_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/trees/main");
                then.status(200).json_body(json!({ "unexpected": true }));
            })
            .await;

        let err = client(&server)
            .get_reference_details("main", None)
            .await
            .unwrap_err();
        assert!(err.is_decode(), "expected decode error, found: {err:?}");
    }

    #[tokio::test]
    async fn list_references_passes_pagination() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/trees")
                    .query_param("fetch", "ALL")
                    .query_param("max-records", "2")
                    .query_param("page-token", "t1");
                then.status(200).json_body(json!({
                    "hasMore": true,
                    "token": "t2",
                    "references": [
                        { "type": "BRANCH", "name": "dev", "hash": "111" },
                        { "type": "TAG", "name": "v1", "hash": "222" },
                    ],
                }));
            })
            .await;

        let page = client(&server)
            .list_references(&ListReferencesParams {
                fetch: Some(FetchOption::All),
                filter: None,
                max_records: NonZeroU32::new(2),
                page_token: Some("t1".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(page.token.as_deref(), Some("t2"));
        assert_eq!(page.items, vec![
            Reference::branch("dev", Some("111".to_string())),
            Reference::tag("v1", Some("222".to_string())),
        ]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_reference_hash_of_missing_reference() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/trees/nope");
                then.status(404).json_body(json!({
                    "status": 404,
                    "reason": "Not Found",
                    "message": "Named reference 'nope' not found",
                    "errorCode": "REFERENCE_NOT_FOUND",
                }));
            })
            .await;

        let err = client(&server).get_reference_hash("nope").await.unwrap_err();
        assert!(err.is_not_found(), "expected not found, found: {err:?}");
    }

    #[tokio::test]
    async fn create_existing_reference() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v2/trees");
                then.status(409);
            })
            .await;

        let err = client(&server)
            .create_reference(
                "main",
                ReferenceType::Branch,
                &Reference::branch("main", Some("abc123".to_string())),
            )
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "expected already exists, found: {err:?}");
    }

    /// Create a branch, commit to it, then commit again with the stale hash.
    #[tokio::test]
    async fn create_commit_and_conflict() {
        let server = MockServer::start_async().await;
        let client = client(&server);

        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/trees")
                    .query_param("name", "feature-1")
                    .query_param("type", "BRANCH")
                    .header("content-type", "application/json")
                    .json_body(json!({ "type": "BRANCH", "name": "main", "hash": "abc123" }));
                then.status(200).json_body(reference_json("feature-1", "abc123"));
            })
            .await;

        let created = client
            .create_reference(
                "feature-1",
                ReferenceType::default(),
                &Reference::branch("main", Some("abc123".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(created.name, "feature-1");
        assert_eq!(created.hash.as_deref(), Some("abc123"));
        create.assert_async().await;

        let mut commit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/trees/feature-1@abc123/history/commit")
                    .json_body_obj(&commit_operations());
                then.status(200).json_body(json!({
                    "targetBranch": { "type": "BRANCH", "name": "feature-1", "hash": "def456" },
                    "addedContents": [
                        { "key": { "elements": ["db", "orders"] }, "contentId": "c-1" }
                    ],
                }));
            })
            .await;

        let result = client
            .commit("feature-1", &commit_operations(), Some("abc123"))
            .await
            .unwrap();
        assert_eq!(result.new_hash(), Some("def456"));
        assert_eq!(result.added_contents[0].content_id, "c-1");
        commit.assert_async().await;
        commit.delete_async().await;

        let conflict = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/trees/feature-1@abc123/history/commit");
                then.status(409).json_body(conflict_body());
            })
            .await;

        let err = client
            .commit("feature-1", &commit_operations(), Some("abc123"))
            .await
            .unwrap_err();
        assert!(
            err.is_concurrent_modification(),
            "expected concurrent modification, found: {err:?}"
        );
        // exactly one attempt, no retry
        conflict.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn commit_without_error_code_is_still_a_conflict() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v2/trees/main@abc/history/commit");
                then.status(409).body("conflict");
            })
            .await;

        let err = client(&server)
            .commit("main", &commit_operations(), Some("abc"))
            .await
            .unwrap_err();
        assert!(err.is_concurrent_modification());
    }

    #[tokio::test]
    async fn commit_at_head_reads_hash_once() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/trees/main");
                then.status(200).json_body(reference_json("main", "aaa"));
            })
            .await;
        let commit = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v2/trees/main@aaa/history/commit");
                then.status(409).json_body(conflict_body());
            })
            .await;

        let err = client(&server)
            .commit_at_head("main", &commit_operations())
            .await
            .unwrap_err();
        assert!(err.is_concurrent_modification());
        lookup.assert_hits_async(1).await;
        commit.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn merge_and_transplant_use_their_endpoints() {
        let server = MockServer::start_async().await;
        let merge_response = json!({
            "wasApplied": true,
            "wasSuccessful": true,
            "resultantTargetHash": "fff",
            "commonAncestor": "aaa",
            "targetBranch": "main",
            "effectiveTargetHash": "bbb",
            "expectedHash": "bbb",
        });
        let merge = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/trees/main@bbb/history/merge")
                    .json_body(json!({
                        "fromRefName": "dev",
                        "fromHash": "ccc",
                        "dryRun": false,
                        "returnConflictAsResult": false,
                    }));
                then.status(200).json_body(merge_response.clone());
            })
            .await;
        let transplant = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v2/trees/main@bbb/history/transplant")
                    .json_body(json!({
                        "fromRefName": "dev",
                        "hashesToTransplant": ["c1", "c2"],
                        "dryRun": false,
                        "returnConflictAsResult": false,
                    }));
                then.status(200).json_body(merge_response.clone());
            })
            .await;

        let client = client(&server);
        let merged = client
            .merge("main", Some("bbb"), &MergeSpec {
                from_ref_name: "dev".to_string(),
                from_hash: Some("ccc".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(merged.new_hash(), Some("fff"));

        let transplanted = client
            .transplant("main", Some("bbb"), &TransplantSpec {
                from_ref_name: "dev".to_string(),
                hashes_to_transplant: vec!["c1".to_string(), "c2".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(transplanted.was_successful);

        merge.assert_async().await;
        transplant.assert_async().await;
    }

    #[tokio::test]
    async fn merge_conflict_is_concurrent_modification() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v2/trees/main@old/history/merge");
                then.status(409).json_body(conflict_body());
            })
            .await;

        let err = client(&server)
            .merge("main", Some("old"), &MergeSpec {
                from_ref_name: "dev".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_concurrent_modification());
    }

    #[tokio::test]
    async fn set_reference_sends_target() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/v2/trees/dev@111")
                    .query_param("type", "BRANCH")
                    .json_body(json!({ "type": "BRANCH", "name": "main", "hash": "222" }));
                then.status(200).json_body(reference_json("dev", "222"));
            })
            .await;

        let reference = client(&server)
            .set_reference(
                "dev",
                Some("111"),
                Some(ReferenceType::Branch),
                &Reference::branch("main", Some("222".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(reference.hash.as_deref(), Some("222"));
        mock.assert_async().await;
    }

    /// Deleting twice never succeeds twice.
    #[tokio::test]
    async fn delete_reference_twice() {
        let server = MockServer::start_async().await;
        let client = client(&server);

        let mut deleted = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v2/trees/dev");
                then.status(200).json_body(reference_json("dev", "111"));
            })
            .await;
        let first = client.delete_reference("dev", None, None).await.unwrap();
        assert_eq!(first.name, "dev");
        deleted.assert_async().await;
        deleted.delete_async().await;

        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v2/trees/dev");
                then.status(404).json_body(json!({
                    "status": 404,
                    "reason": "Not Found",
                    "message": "Named reference 'dev' not found",
                    "errorCode": "REFERENCE_NOT_FOUND",
                }));
            })
            .await;
        let second = client.delete_reference("dev", None, None).await.unwrap_err();
        assert!(second.is_not_found());
    }

    #[tokio::test]
    async fn diff_returns_page() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/trees/main/diff/dev")
                    .query_param("min-key", "db");
                then.status(200).json_body(json!({
                    "hasMore": false,
                    "diffs": [
                        {
                            "key": { "elements": ["db", "orders"] },
                            "to": { "type": "ICEBERG_TABLE", "id": "c-1", "metadataLocation": "m" },
                        }
                    ],
                }));
            })
            .await;

        let page = client(&server)
            .diff("main", "dev", &DiffParams {
                min_key: Some(ContentKey::new(["db"])),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.token, None);
        assert_eq!(page.items[0].change_kind(), ChangeKind::Added);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_contents_maps_keys() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/trees/main/contents")
                    .query_param("key", "db.orders")
                    .query_param("key", "db.customers")
                    .query_param("with-doc", "true");
                then.status(200).json_body(json!({
                    "contents": [
                        {
                            "key": { "elements": ["db", "orders"] },
                            "content": { "type": "ICEBERG_TABLE", "id": "c-1" },
                        }
                    ],
                    "effectiveReference": { "type": "BRANCH", "name": "main", "hash": "abc" },
                }));
            })
            .await;

        let orders = ContentKey::new(["db", "orders"]);
        let contents = client(&server)
            .get_contents(
                "main",
                &[orders.clone(), ContentKey::new(["db", "customers"])],
                true,
            )
            .await
            .unwrap();

        assert_eq!(contents.len(), 1);
        assert_eq!(contents[&orders].content.id.as_deref(), Some("c-1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_entries_and_log() {
        let server = MockServer::start_async().await;
        let entries = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/trees/main/entries")
                    .query_param("content", "true");
                then.status(200).json_body(json!({
                    "hasMore": true,
                    "token": "next",
                    "entries": [
                        { "name": { "elements": ["db", "orders"] }, "type": "ICEBERG_TABLE", "contentId": "c-1" }
                    ],
                }));
            })
            .await;
        let log = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/trees/main/history")
                    .query_param("limit-hash", "aaa");
                then.status(200).json_body(json!({
                    "hasMore": false,
                    "logEntries": [
                        {
                            "commitMeta": { "message": "add orders", "hash": "bbb", "authors": ["alice"] },
                            "parentCommitHash": "aaa",
                        }
                    ],
                }));
            })
            .await;

        let client = client(&server);
        let page = client
            .list_entries("main", &EntriesParams {
                with_content: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.token.as_deref(), Some("next"));
        assert_eq!(page.items[0].content_id.as_deref(), Some("c-1"));

        let page = client
            .commit_log("main", &LogParams {
                limit_hash: Some("aaa".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items[0].commit_meta.hash.as_deref(), Some("bbb"));

        entries.assert_async().await;
        log.assert_async().await;
    }

    #[tokio::test]
    async fn credentials_and_headers_set_on_requests() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.header("authorization", "Bearer token-1")
                    .header("x-tenant", "analytics")
                    .header("user-agent", "my-agent");
                then.status(200).json_body(json!({ "defaultBranch": "main" }));
            })
            .await;

        let mut config = ClientConfig {
            auth: AuthConfig::Bearer {
                token: "token-1".to_string(),
            },
            user_agent: Some("my-agent".to_string()),
            ..client_config(&server)
        };
        config
            .extra_headers
            .insert("x-tenant".to_string(), "analytics".to_string());

        CatalogClient::new(config)
            .unwrap()
            .get_config()
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/api/v2/config");
                then.status(200)
                    .json_body(json!({}))
                    .delay(Duration::from_secs(3));
            })
            .await;

        let config = ClientConfig {
            timeout: 1,
            ..client_config(&server)
        };
        let err = CatalogClient::new(config)
            .unwrap()
            .get_config()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, found: {err:?}");
    }

    #[tokio::test]
    async fn injected_http_client_honours_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/api/v2/config");
                then.status(200)
                    .json_body(json!({}))
                    .delay(Duration::from_secs(3));
            })
            .await;

        let config = ClientConfig {
            timeout: 1,
            ..client_config(&server)
        };
        let err = CatalogClient::with_http_client(config, reqwest::Client::new())
            .unwrap()
            .get_config()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, found: {err:?}");
    }
}

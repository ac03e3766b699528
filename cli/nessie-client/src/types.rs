//! Catalog interaction types.
//!
//! These types mirror the JSON documents exchanged with the catalog service.
//! Unknown response fields are ignored, so newer servers remain readable,
//! except where a type keeps them for re-serialization.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a paginated listing.
///
/// `token` is an opaque continuation token; pass it back to get the next page.
/// Its absence marks the last page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub token: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.token.is_some()
    }
}

pub type ReferencePage = Page<Reference>;
pub type DiffPage = Page<DiffEntry>;
pub type ContentsPage = Page<EntryItem>;
pub type LogPage = Page<LogEntry>;

/// The service reports the continuation token separately from `hasMore`;
/// only keep a token if the service says there is more.
fn continuation(has_more: bool, token: Option<String>) -> Option<String> {
    token.filter(|token| has_more && !token.is_empty())
}

// ---------------------------------------------------------------------------
// Server configuration
// ---------------------------------------------------------------------------

/// Capabilities and settings of the catalog service, from `GET /config`.
///
/// Fields this client does not know are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_supported_api_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_supported_api_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_api_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_ancestor_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_possible_commit_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_properties: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    #[default]
    Branch,
    Tag,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Branch => "BRANCH",
            ReferenceType::Tag => "TAG",
        }
    }
}

impl Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BRANCH" => Ok(ReferenceType::Branch),
            "TAG" => Ok(ReferenceType::Tag),
            _ => Err(format!("unknown reference type '{s}', expected BRANCH or TAG")),
        }
    }
}

/// A named pointer (branch or tag) to a commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Extra information, only present when fetched with [FetchOption::All].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Reference {
    pub fn branch(name: impl Into<String>, hash: Option<String>) -> Self {
        Self {
            reference_type: ReferenceType::Branch,
            name: name.into(),
            hash,
            metadata: None,
        }
    }

    pub fn tag(name: impl Into<String>, hash: Option<String>) -> Self {
        Self {
            reference_type: ReferenceType::Tag,
            name: name.into(),
            hash,
            metadata: None,
        }
    }
}

/// How much information the server should return about references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchOption {
    #[default]
    Minimal,
    All,
}

impl FetchOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOption::Minimal => "MINIMAL",
            FetchOption::All => "ALL",
        }
    }
}

impl Display for FetchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReferencesResponse {
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub has_more: bool,
    pub token: Option<String>,
}

impl From<ReferencesResponse> for ReferencePage {
    fn from(response: ReferencesResponse) -> Self {
        Page {
            items: response.references,
            token: continuation(response.has_more, response.token),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SingleReferenceResponse {
    pub reference: Reference,
}

/// Query parameters of `GET /trees`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReferencesParams {
    pub fetch: Option<FetchOption>,
    /// CEL expression evaluated by the server.
    pub filter: Option<String>,
    pub max_records: Option<NonZeroU32>,
    pub page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Content keys and content
// ---------------------------------------------------------------------------

/// Path of a content object, e.g. `["db", "table"]`.
///
/// In URLs a key is written as its elements joined by `.`;
/// a `.` inside an element is written as the group separator `\u{1D}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub elements: Vec<String>,
}

const KEY_SEPARATOR: char = '.';
const ESCAPED_SEPARATOR: char = '\u{1D}';

impl ContentKey {
    pub fn new<S: Into<String>>(elements: impl IntoIterator<Item = S>) -> Self {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Representation used in URL paths and query parameters.
    pub fn to_path_string(&self) -> String {
        self.elements
            .iter()
            .map(|element| element.replace(KEY_SEPARATOR, &ESCAPED_SEPARATOR.to_string()))
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string())
    }

    /// Inverse of [ContentKey::to_path_string].
    pub fn from_path_string(s: &str) -> Self {
        Self::new(
            s.split(KEY_SEPARATOR)
                .map(|element| element.replace(ESCAPED_SEPARATOR, &KEY_SEPARATOR.to_string())),
        )
    }
}

impl Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.elements.join("."))
    }
}

impl FromStr for ContentKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("content key must not be empty".to_string());
        }
        Ok(Self::from_path_string(s))
    }
}

/// A content object stored under a key.
///
/// Only the type and id are modelled; all other attributes are kept as they are
/// so that content types unknown to this client survive a read-modify-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Content {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            id: None,
            attributes: Map::new(),
        }
    }

    pub fn iceberg_table(
        metadata_location: impl Into<String>,
        snapshot_id: i64,
        schema_id: i32,
        spec_id: i32,
        sort_order_id: i32,
    ) -> Self {
        Self::new("ICEBERG_TABLE")
            .with_attribute("metadataLocation", metadata_location.into())
            .with_attribute("snapshotId", snapshot_id)
            .with_attribute("schemaId", schema_id)
            .with_attribute("specId", spec_id)
            .with_attribute("sortOrderId", sort_order_id)
    }

    pub fn namespace<S: Into<String>>(elements: impl IntoIterator<Item = S>) -> Self {
        let elements = elements.into_iter().map(Into::into).collect::<Vec<String>>();
        Self::new("NAMESPACE").with_attribute("elements", elements)
    }

    /// Set the content id, required when updating existing content.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documentation {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

/// Content of one key, as returned by content lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Documentation>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContentWithKey {
    pub key: ContentKey,
    pub content: Content,
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MultipleContentsResponse {
    #[serde(default)]
    pub contents: Vec<ContentWithKey>,
}

impl From<MultipleContentsResponse> for BTreeMap<ContentKey, ContentEntry> {
    fn from(response: MultipleContentsResponse) -> Self {
        response
            .contents
            .into_iter()
            .map(|entry| {
                (entry.key, ContentEntry {
                    content: entry.content,
                    documentation: entry.documentation,
                })
            })
            .collect()
    }
}

/// An entry of a reference's content listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryItem {
    pub name: ContentKey,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntriesResponse {
    #[serde(default)]
    pub entries: Vec<EntryItem>,
    #[serde(default)]
    pub has_more: bool,
    pub token: Option<String>,
}

impl From<EntriesResponse> for ContentsPage {
    fn from(response: EntriesResponse) -> Self {
        Page {
            items: response.entries,
            token: continuation(response.has_more, response.token),
        }
    }
}

/// Query parameters of `GET /trees/{ref}/entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntriesParams {
    pub filter: Option<String>,
    pub keys: Vec<ContentKey>,
    pub min_key: Option<ContentKey>,
    pub max_key: Option<ContentKey>,
    pub prefix_key: Option<ContentKey>,
    /// Also return the content objects, not only their types.
    pub with_content: bool,
    pub max_records: Option<NonZeroU32>,
    pub page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// Metadata of a commit.
///
/// The fields below `properties` are assigned by the server
/// and only present in responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMeta {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_signed_off_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_commit_hashes: Vec<String>,
}

impl CommitMeta {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }
}

/// A change to a single key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    Put {
        key: ContentKey,
        content: Content,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_content: Option<Content>,
    },
    Delete { key: ContentKey },
    Unchanged { key: ContentKey },
}

impl Operation {
    pub fn put(key: ContentKey, content: Content) -> Self {
        Operation::Put {
            key,
            content,
            expected_content: None,
        }
    }

    pub fn delete(key: ContentKey) -> Self {
        Operation::Delete { key }
    }

    pub fn key(&self) -> &ContentKey {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } | Operation::Unchanged { key } => {
                key
            },
        }
    }
}

/// Operations applied atomically by one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOperations {
    pub commit_meta: CommitMeta,
    pub operations: Vec<Operation>,
}

impl CommitOperations {
    pub fn new(commit_meta: CommitMeta, operations: Vec<Operation>) -> Self {
        Self {
            commit_meta,
            operations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedContent {
    pub key: ContentKey,
    pub content_id: String,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    /// The branch after the commit; its hash is the new commit.
    pub target_branch: Reference,
    /// Ids assigned to newly created content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_contents: Vec<AddedContent>,
}

impl CommitResult {
    pub fn new_hash(&self) -> Option<&str> {
        self.target_branch.hash.as_deref()
    }
}

/// How conflicting changes to a key are handled in a merge or transplant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeBehavior {
    Normal,
    Force,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeKeyBehavior {
    pub key: ContentKey,
    pub merge_behavior: MergeBehavior,
}

/// Merge all commits of `from_ref_name` up to `from_hash` into a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSpec {
    pub from_ref_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_meta: Option<CommitMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_merge_mode: Option<MergeBehavior>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_merge_modes: Vec<MergeKeyBehavior>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub return_conflict_as_result: bool,
}

/// Copy individual commits of `from_ref_name` onto a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransplantSpec {
    pub from_ref_name: String,
    pub hashes_to_transplant: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_meta: Option<CommitMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_merge_mode: Option<MergeBehavior>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_merge_modes: Vec<MergeKeyBehavior>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub return_conflict_as_result: bool,
}

/// Result of a merge or transplant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    #[serde(default)]
    pub was_applied: bool,
    #[serde(default)]
    pub was_successful: bool,
    pub resultant_target_hash: Option<String>,
    pub common_ancestor: Option<String>,
    pub target_branch: Option<String>,
    pub effective_target_hash: Option<String>,
    pub expected_hash: Option<String>,
    /// Per-key outcome, including conflicts when requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Value>,
}

impl MergeResult {
    pub fn new_hash(&self) -> Option<&str> {
        self.resultant_target_hash.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Commit log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub commit_meta: CommitMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<Operation>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogResponse {
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
    #[serde(default)]
    pub has_more: bool,
    pub token: Option<String>,
}

impl From<LogResponse> for LogPage {
    fn from(response: LogResponse) -> Self {
        Page {
            items: response.log_entries,
            token: continuation(response.has_more, response.token),
        }
    }
}

/// Query parameters of `GET /trees/{ref}/history`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogParams {
    pub filter: Option<String>,
    pub fetch: Option<FetchOption>,
    /// Stop at this commit (inclusive).
    pub limit_hash: Option<String>,
    pub max_records: Option<NonZeroU32>,
    pub page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// A key that differs between two references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub key: ContentKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Content>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl DiffEntry {
    pub fn change_kind(&self) -> ChangeKind {
        match (&self.from, &self.to) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiffResponse {
    #[serde(default)]
    pub diffs: Vec<DiffEntry>,
    #[serde(default)]
    pub has_more: bool,
    pub token: Option<String>,
}

impl From<DiffResponse> for DiffPage {
    fn from(response: DiffResponse) -> Self {
        Page {
            items: response.diffs,
            token: continuation(response.has_more, response.token),
        }
    }
}

/// Query parameters of `GET /trees/{from}/diff/{to}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffParams {
    pub filter: Option<String>,
    pub keys: Vec<ContentKey>,
    pub min_key: Option<ContentKey>,
    pub max_key: Option<ContentKey>,
    pub prefix_key: Option<ContentKey>,
    pub max_records: Option<NonZeroU32>,
    pub page_token: Option<String>,
}

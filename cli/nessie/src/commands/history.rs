use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bpaf::Bpaf;
use futures::{StreamExt, TryStreamExt};
use nessie_client::types::{
    CommitOperations,
    FetchOption,
    LogEntry,
    LogParams,
    MergeResult,
    MergeSpec,
    TransplantSpec,
};
use nessie_client::{CatalogApi, CatalogClient, log_stream};
use tracing::{debug, instrument};

use super::{SHELL_COMPLETION_FILE, hash_or_current, print_json};
use crate::utils::message;

#[derive(Bpaf, Debug, Clone)]
pub struct Log {
    /// Only show commits matching this CEL expression
    #[bpaf(long, argument("EXPR"))]
    filter: Option<String>,

    /// Include the operations of each commit
    #[bpaf(long)]
    fetch_all: bool,

    /// Stop at this commit (inclusive)
    #[bpaf(long, argument("HASH"))]
    until: Option<String>,

    /// Show at most this many commits
    #[bpaf(long, short('n'), argument("N"))]
    limit: Option<usize>,

    /// Reference to show the log of, optionally as `name@hash`
    #[bpaf(positional("REF"))]
    reference: Option<String>,
}

impl Log {
    #[instrument(name = "log", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let reference = self
            .reference
            .unwrap_or_else(|| client.default_branch().to_string());
        let params = LogParams {
            filter: self.filter,
            fetch: self.fetch_all.then_some(FetchOption::All),
            limit_hash: self.until,
            ..Default::default()
        };

        let stream = log_stream(client, &reference, params);
        let entries: Vec<LogEntry> = match self.limit {
            Some(limit) => stream.take(limit).try_collect::<Vec<_>>().await,
            None => stream.try_collect::<Vec<_>>().await,
        }
        .with_context(|| format!("Could not get the log of '{reference}'"))?;

        print_json(&entries)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Commit {
    /// Hash the branch is expected to point to (default: its current hash)
    #[bpaf(long, argument("HASH"))]
    expected_hash: Option<String>,

    /// Replace the commit message given in the file
    #[bpaf(long, short('m'), argument("MESSAGE"))]
    message: Option<String>,

    /// JSON file with the commit metadata and operations
    #[bpaf(long, short('f'), argument("FILE"), complete_shell(SHELL_COMPLETION_FILE))]
    file: PathBuf,

    /// Branch to commit to
    #[bpaf(positional("BRANCH"))]
    branch: String,
}

impl Commit {
    #[instrument(name = "commit", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let mut operations = read_operations(&self.file)?;
        if let Some(message) = self.message {
            operations.commit_meta.message = message;
        }
        debug!(
            n_operations = operations.operations.len(),
            "read commit operations"
        );

        let result = match self.expected_hash {
            Some(expected_hash) => {
                client
                    .commit(&self.branch, &operations, Some(&expected_hash))
                    .await
            },
            None => client.commit_at_head(&self.branch, &operations).await,
        }
        .with_context(|| format!("Could not commit to '{}'", self.branch))?;

        message::created(format!(
            "Committed to '{}' as {}",
            self.branch,
            result.new_hash().unwrap_or("<unknown>")
        ));
        print_json(&result)
    }
}

fn read_operations(file: &Path) -> Result<CommitOperations> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("Could not read '{}'", file.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("'{}' does not contain valid commit operations", file.display()))
}

#[derive(Bpaf, Debug, Clone)]
pub struct Merge {
    /// Hash the branch is expected to point to (default: its current hash)
    #[bpaf(long, argument("HASH"))]
    expected_hash: Option<String>,

    /// Reference to merge from
    #[bpaf(long, argument("REF"))]
    from: String,

    /// Merge commits up to this hash (default: the current hash of the source)
    #[bpaf(long, argument("HASH"))]
    from_hash: Option<String>,

    /// Message of the merge commit
    #[bpaf(long, short('m'), argument("MESSAGE"))]
    message: Option<String>,

    /// Only check whether the merge would succeed
    #[bpaf(long)]
    dry_run: bool,

    /// Branch to merge into
    #[bpaf(positional("BRANCH"))]
    branch: String,
}

impl Merge {
    #[instrument(name = "merge", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let expected_hash = hash_or_current(client, &self.branch, self.expected_hash).await?;
        let from_hash = hash_or_current(client, &self.from, self.from_hash).await?;

        let spec = MergeSpec {
            from_ref_name: self.from.clone(),
            from_hash: Some(from_hash),
            message: self.message,
            dry_run: self.dry_run,
            ..Default::default()
        };
        let result = client
            .merge(&self.branch, Some(&expected_hash), &spec)
            .await
            .with_context(|| format!("Could not merge '{}' into '{}'", self.from, self.branch))?;

        report_merge(&self.branch, &result, self.dry_run);
        print_json(&result)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Transplant {
    /// Hash the branch is expected to point to (default: its current hash)
    #[bpaf(long, argument("HASH"))]
    expected_hash: Option<String>,

    /// Reference the commits are taken from
    #[bpaf(long, argument("REF"))]
    from: String,

    /// Only check whether the transplant would succeed
    #[bpaf(long)]
    dry_run: bool,

    /// Branch to apply the commits to
    #[bpaf(positional("BRANCH"))]
    branch: String,

    /// Commits to apply, oldest first
    #[bpaf(positional("HASH"), some("at least one commit is required"))]
    hashes: Vec<String>,
}

impl Transplant {
    #[instrument(name = "transplant", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let expected_hash = hash_or_current(client, &self.branch, self.expected_hash).await?;

        let spec = TransplantSpec {
            from_ref_name: self.from.clone(),
            hashes_to_transplant: self.hashes,
            dry_run: self.dry_run,
            ..Default::default()
        };
        let result = client
            .transplant(&self.branch, Some(&expected_hash), &spec)
            .await
            .with_context(|| format!("Could not transplant onto '{}'", self.branch))?;

        report_merge(&self.branch, &result, self.dry_run);
        print_json(&result)
    }
}

fn report_merge(branch: &str, result: &MergeResult, dry_run: bool) {
    match (result.was_successful, dry_run) {
        (false, _) => message::warning(format!("Changes to '{branch}' have conflicts")),
        (true, true) => message::updated(format!("Changes apply cleanly to '{branch}'")),
        (true, false) => message::updated(format!(
            "'{branch}' now points to {}",
            result.new_hash().unwrap_or("<unknown>")
        )),
    }
}

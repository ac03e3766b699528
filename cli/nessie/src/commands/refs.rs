use std::num::NonZeroU32;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use futures::TryStreamExt;
use nessie_client::types::{FetchOption, ListReferencesParams, Reference, ReferenceType};
use nessie_client::{CatalogApi, CatalogClient, reference_stream};
use tracing::instrument;

use super::{hash_or_current, print_json};
use crate::utils::message;

/// Reference commands.
#[derive(Debug, Clone, Bpaf)]
pub enum RefsCommands {
    /// List branches and tags
    #[bpaf(command)]
    List(#[bpaf(external(list))] List),

    /// Show a branch or tag
    #[bpaf(command)]
    Show(#[bpaf(external(show))] Show),

    /// Print the hash a branch or tag points to
    #[bpaf(command)]
    Hash(#[bpaf(external(hash))] Hash),

    /// Create a branch or tag
    #[bpaf(command)]
    Create(#[bpaf(external(create))] Create),

    /// Point a branch or tag at another commit
    #[bpaf(command)]
    Assign(#[bpaf(external(assign))] Assign),

    /// Delete a branch or tag
    #[bpaf(command)]
    Delete(#[bpaf(external(delete))] Delete),
}

impl RefsCommands {
    #[instrument(name = "refs", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        match self {
            RefsCommands::List(args) => args.handle(client).await?,
            RefsCommands::Show(args) => args.handle(client).await?,
            RefsCommands::Hash(args) => args.handle(client).await?,
            RefsCommands::Create(args) => args.handle(client).await?,
            RefsCommands::Assign(args) => args.handle(client).await?,
            RefsCommands::Delete(args) => args.handle(client).await?,
        }
        Ok(())
    }
}

fn fetch_option(all: bool) -> Option<FetchOption> {
    all.then_some(FetchOption::All)
}

#[derive(Bpaf, Debug, Clone)]
pub struct List {
    /// Only list references matching this CEL expression
    #[bpaf(long, argument("EXPR"))]
    filter: Option<String>,

    /// Include commit metadata of each reference
    #[bpaf(long)]
    fetch_all: bool,

    /// Number of references requested per page
    #[bpaf(long, argument("N"))]
    page_size: Option<NonZeroU32>,
}

impl List {
    #[instrument(name = "list", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let params = ListReferencesParams {
            fetch: fetch_option(self.fetch_all),
            filter: self.filter,
            max_records: self.page_size,
            page_token: None,
        };
        let references: Vec<Reference> = reference_stream(client, params)
            .try_collect()
            .await
            .context("Could not list references")?;
        print_json(&references)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Show {
    /// Include commit metadata
    #[bpaf(long)]
    fetch_all: bool,

    /// Branch or tag, optionally pinned to a hash as `name@hash`
    #[bpaf(positional("REF"))]
    reference: String,
}

impl Show {
    #[instrument(name = "show", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let reference = client
            .get_reference_details(&self.reference, fetch_option(self.fetch_all))
            .await
            .with_context(|| format!("Could not get reference '{}'", self.reference))?;
        print_json(&reference)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Hash {
    #[bpaf(positional("REF"))]
    reference: String,
}

impl Hash {
    #[instrument(name = "hash", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let hash = hash_or_current(client, &self.reference, None).await?;
        println!("{hash}");
        Ok(())
    }
}

/// Reference to use as the source of a new or moved reference.
///
/// The type is always that of `name` on the server.
/// Without an explicit hash the current hash of `name` is used.
async fn resolve_source(
    client: &CatalogClient,
    name: &str,
    hash: Option<String>,
) -> Result<Reference> {
    let mut source = client
        .get_reference_details(name, None)
        .await
        .with_context(|| format!("Could not get reference '{name}'"))?;
    if hash.is_some() {
        source.hash = hash;
    }
    Ok(source)
}

#[derive(Bpaf, Debug, Clone)]
pub struct Create {
    /// Type of the new reference, BRANCH or TAG
    #[bpaf(long("type"), short('t'), argument("TYPE"), fallback(ReferenceType::Branch))]
    reference_type: ReferenceType,

    /// Reference to start from (default: the configured default branch)
    #[bpaf(long, argument("REF"))]
    from: Option<String>,

    /// Commit to start from (default: the current hash of the source reference)
    #[bpaf(long, argument("HASH"))]
    hash: Option<String>,

    /// Name of the new reference
    #[bpaf(positional("NAME"))]
    name: String,
}

impl Create {
    #[instrument(name = "create", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let from = self
            .from
            .unwrap_or_else(|| client.default_branch().to_string());
        let source = resolve_source(client, &from, self.hash).await?;

        let created = client
            .create_reference(&self.name, self.reference_type, &source)
            .await
            .with_context(|| format!("Could not create {} '{}'", self.reference_type, self.name))?;

        message::created(format!(
            "Created {} '{}' at {}",
            created.reference_type,
            created.name,
            created.hash.as_deref().unwrap_or("<unknown>")
        ));
        print_json(&created)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Assign {
    /// Type of the reference, BRANCH or TAG
    #[bpaf(long("type"), short('t'), argument("TYPE"))]
    reference_type: Option<ReferenceType>,

    /// Hash the reference is expected to point to (default: its current hash)
    #[bpaf(long, argument("HASH"))]
    expected_hash: Option<String>,

    /// Reference to point to
    #[bpaf(long, argument("REF"))]
    to: String,

    /// Commit to point to (default: the current hash of the target reference)
    #[bpaf(long, argument("HASH"))]
    to_hash: Option<String>,

    /// Branch or tag to move
    #[bpaf(positional("NAME"))]
    name: String,
}

impl Assign {
    #[instrument(name = "assign", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let expected_hash = hash_or_current(client, &self.name, self.expected_hash).await?;
        let target = resolve_source(client, &self.to, self.to_hash).await?;

        let assigned = client
            .set_reference(
                &self.name,
                Some(&expected_hash),
                self.reference_type,
                &target,
            )
            .await
            .with_context(|| format!("Could not assign '{}'", self.name))?;

        message::updated(format!(
            "'{}' now points to {}",
            assigned.name,
            assigned.hash.as_deref().unwrap_or("<unknown>")
        ));
        print_json(&assigned)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Delete {
    /// Type of the reference, BRANCH or TAG
    #[bpaf(long("type"), short('t'), argument("TYPE"))]
    reference_type: Option<ReferenceType>,

    /// Hash the reference is expected to point to (default: its current hash)
    #[bpaf(long, argument("HASH"))]
    expected_hash: Option<String>,

    /// Branch or tag to delete
    #[bpaf(positional("NAME"))]
    name: String,
}

impl Delete {
    #[instrument(name = "delete", skip_all)]
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        let expected_hash = hash_or_current(client, &self.name, self.expected_hash).await?;

        let deleted = client
            .delete_reference(&self.name, Some(&expected_hash), self.reference_type)
            .await
            .with_context(|| format!("Could not delete '{}'", self.name))?;

        message::deleted(format!("Deleted {} '{}'", deleted.reference_type, deleted.name));
        Ok(())
    }
}

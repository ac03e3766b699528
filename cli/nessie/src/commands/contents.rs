use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use bpaf::Bpaf;
use futures::TryStreamExt;
use nessie_client::types::{ContentEntry, ContentKey, DiffEntry, DiffParams, EntriesParams, EntryItem};
use nessie_client::{CatalogApi, CatalogClient, diff_stream, entries_stream};
use tracing::instrument;

use super::print_json;

#[derive(Bpaf, Debug, Clone)]
pub struct Diff {
    /// Only show changes matching this CEL expression
    #[bpaf(long, argument("EXPR"))]
    filter: Option<String>,

    /// Only show changes of this key (repeatable)
    #[bpaf(long("key"), short('k'), argument("KEY"))]
    keys: Vec<ContentKey>,

    /// Only show changes of keys starting with this key
    #[bpaf(long, argument("KEY"))]
    prefix_key: Option<ContentKey>,

    /// Reference to compare from, optionally as `name@hash`
    #[bpaf(positional("FROM"))]
    from_ref: String,

    /// Reference to compare to, optionally as `name@hash`
    #[bpaf(positional("TO"))]
    to_ref: String,
}

impl Diff {
    #[instrument(name = "diff", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let params = DiffParams {
            filter: self.filter,
            keys: self.keys,
            prefix_key: self.prefix_key,
            ..Default::default()
        };
        let diffs: Vec<DiffEntry> = diff_stream(client, &self.from_ref, &self.to_ref, params)
            .try_collect()
            .await
            .with_context(|| {
                format!(
                    "Could not compare '{}' with '{}'",
                    self.from_ref, self.to_ref
                )
            })?;
        print_json(&diffs)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Contents {
    /// Include documentation attached to the content
    #[bpaf(long)]
    with_doc: bool,

    /// Reference to read from, optionally as `name@hash`
    #[bpaf(positional("REF"))]
    reference: String,

    /// Keys to read, elements separated by '.'
    #[bpaf(positional("KEY"))]
    keys: Vec<ContentKey>,
}

impl Contents {
    #[instrument(name = "contents", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        if self.keys.is_empty() {
            bail!("No keys given, use 'nessie entries {}' to list them", self.reference);
        }

        let contents = client
            .get_contents(&self.reference, &self.keys, self.with_doc)
            .await
            .with_context(|| format!("Could not read contents of '{}'", self.reference))?;

        // JSON object keys have to be strings
        let by_name = contents
            .into_iter()
            .map(|(key, entry)| (key.to_string(), entry))
            .collect::<BTreeMap<String, ContentEntry>>();
        print_json(&by_name)
    }
}

#[derive(Bpaf, Debug, Clone)]
pub struct Entries {
    /// Only list entries matching this CEL expression
    #[bpaf(long, argument("EXPR"))]
    filter: Option<String>,

    /// Only list keys starting with this key
    #[bpaf(long, argument("KEY"))]
    prefix_key: Option<ContentKey>,

    /// Include the content of each entry
    #[bpaf(long)]
    with_content: bool,

    /// Reference to list, optionally as `name@hash`
    #[bpaf(positional("REF"))]
    reference: String,
}

impl Entries {
    #[instrument(name = "entries", skip_all)]
    pub async fn handle(self, client: &CatalogClient) -> Result<()> {
        let params = EntriesParams {
            filter: self.filter,
            prefix_key: self.prefix_key,
            with_content: self.with_content,
            ..Default::default()
        };
        let entries: Vec<EntryItem> = entries_stream(client, &self.reference, params)
            .try_collect()
            .await
            .with_context(|| format!("Could not list entries of '{}'", self.reference))?;
        print_json(&entries)
    }
}

#[cfg(test)]
mod tests {
    use bpaf::{Args, Parser};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn diff_parses_keys() {
        let diff = diff()
            .to_options()
            .run_inner(Args::from(
                &["-k", "db.orders", "--key", "db.customers", "main", "dev"][..],
            ))
            .unwrap();
        assert_eq!(diff.keys, vec![
            ContentKey::new(["db", "orders"]),
            ContentKey::new(["db", "customers"]),
        ]);
        assert_eq!(diff.from_ref, "main");
        assert_eq!(diff.to_ref, "dev");
    }

    #[test]
    fn contents_collects_keys() {
        let contents = contents()
            .to_options()
            .run_inner(Args::from(&["--with-doc", "main@abc", "a.b", "c"][..]))
            .unwrap();
        assert!(contents.with_doc);
        assert_eq!(contents.reference, "main@abc");
        assert_eq!(contents.keys.len(), 2);
    }
}

mod contents;
mod history;
mod refs;

use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::{Bpaf, ShellComp};
use indoc::indoc;
use nessie_client::{CatalogApi, CatalogClient};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config;

const SHELL_COMPLETION_FILE: ShellComp = ShellComp::File { mask: None };

static NESSIE_DESCRIPTION: &'_ str = indoc! {"
    Command line client for Nessie catalogs.\n\n

    Inspect and change branches, tags, commits and contents through the Nessie v2 API."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(
    options,
    version,
    descr(NESSIE_DESCRIPTION),
    footer("Configuration is read from nessie.toml and NESSIE_* environment variables.")
)]
pub struct NessieCli(#[bpaf(external(nessie_args))] pub NessieArgs);

/// Main nessie args parser
///
/// To parse the nessie CLI, use [`NessieCli`] instead using [`nessie_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)]
pub struct NessieArgs {
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Read configuration from this file instead of the default locations
    #[bpaf(long, short('c'), argument("FILE"), complete_shell(SHELL_COMPLETION_FILE))]
    config: Option<PathBuf>,

    #[bpaf(external(commands))]
    command: Commands,
}

impl NessieArgs {
    pub async fn handle(self) -> Result<()> {
        let config = config::parse(self.config.as_deref())?;
        let client = CatalogClient::new(config).context("Could not set up the catalog client")?;
        debug!(?client, "created catalog client");
        self.command.handle(&client).await
    }
}

#[derive(Bpaf, Debug, Clone)]
enum Commands {
    /// Show the server configuration
    #[bpaf(command("config"))]
    Config,

    /// Manage branches and tags
    #[bpaf(command)]
    Refs(#[bpaf(external(refs::refs_commands))] refs::RefsCommands),

    /// Show the changes between two references
    #[bpaf(command)]
    Diff(#[bpaf(external(contents::diff))] contents::Diff),

    /// Show the content of keys
    #[bpaf(command)]
    Contents(#[bpaf(external(contents::contents))] contents::Contents),

    /// List the keys stored on a reference
    #[bpaf(command)]
    Entries(#[bpaf(external(contents::entries))] contents::Entries),

    /// Show the commit log of a reference
    #[bpaf(command)]
    Log(#[bpaf(external(history::log))] history::Log),

    /// Commit operations read from a file to a branch
    #[bpaf(command)]
    Commit(#[bpaf(external(history::commit))] history::Commit),

    /// Merge another reference into a branch
    #[bpaf(command)]
    Merge(#[bpaf(external(history::merge))] history::Merge),

    /// Apply individual commits onto a branch
    #[bpaf(command)]
    Transplant(#[bpaf(external(history::transplant))] history::Transplant),
}

impl Commands {
    async fn handle(self, client: &CatalogClient) -> Result<()> {
        match self {
            Commands::Config => show_config(client).await?,
            Commands::Refs(args) => args.handle(client).await?,
            Commands::Diff(args) => args.handle(client).await?,
            Commands::Contents(args) => args.handle(client).await?,
            Commands::Entries(args) => args.handle(client).await?,
            Commands::Log(args) => args.handle(client).await?,
            Commands::Commit(args) => args.handle(client).await?,
            Commands::Merge(args) => args.handle(client).await?,
            Commands::Transplant(args) => args.handle(client).await?,
        }
        Ok(())
    }
}

#[instrument(name = "config", skip_all)]
async fn show_config(client: &CatalogClient) -> Result<()> {
    let config = client
        .get_config()
        .await
        .context("Could not get the server configuration")?;
    print_json(&config)
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// The given hash, or the hash `reference` currently points to.
pub(crate) async fn hash_or_current(
    client: &CatalogClient,
    reference: &str,
    hash: Option<String>,
) -> Result<String> {
    match hash {
        Some(hash) => Ok(hash),
        None => client
            .get_reference_hash(reference)
            .await
            .with_context(|| format!("Could not get the current hash of '{reference}'")),
    }
}

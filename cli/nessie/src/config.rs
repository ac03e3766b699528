use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use nessie_client::{ClientConfig, DEFAULT_BRANCH, DEFAULT_TIMEOUT_SECS};
use tracing::debug;
use xdg::BaseDirectories;

/// Name of the nessie config directory
const NESSIE_DIR_NAME: &str = "nessie";
const NESSIE_CONFIG_DIR_VAR: &str = "NESSIE_CONFIG_DIR";
pub const NESSIE_CONFIG_FILE: &str = "nessie.toml";
const NESSIE_ENV_PREFIX: &str = "NESSIE";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:19120/api/v2";

/// Read the client configuration.
///
/// Sources, later ones taking precedence:
/// built-in defaults, `/etc/nessie.toml`, the user config file and
/// `NESSIE_*` environment variables (`__` separates nested keys,
/// e.g. `NESSIE_AUTH__TYPE=bearer`).
///
/// The user config file is `explicit_file` if given,
/// otherwise `nessie.toml` in `$NESSIE_CONFIG_DIR` or the XDG config directories.
pub fn parse(explicit_file: Option<&Path>) -> Result<ClientConfig> {
    let raw = read_raw_config(explicit_file)?;
    let config: ClientConfig = raw
        .try_deserialize()
        .context("Could not parse nessie configuration")?;
    debug!(endpoint = %config.endpoint, auth = config.auth.kind(), "read configuration");
    Ok(config)
}

fn read_raw_config(explicit_file: Option<&Path>) -> Result<HierarchicalConfig> {
    let mut builder = HierarchicalConfig::builder()
        .set_default("endpoint", DEFAULT_ENDPOINT)?
        .set_default("default_branch", DEFAULT_BRANCH)?
        .set_default("timeout", DEFAULT_TIMEOUT_SECS)?;

    // read from /etc
    builder = builder.add_source(
        config::File::from(PathBuf::from("/etc").join(NESSIE_CONFIG_FILE))
            .format(config::FileFormat::Toml)
            .required(false),
    );

    match user_config_file(explicit_file) {
        Some((file, required)) => {
            debug!(file = %file.display(), required, "reading user config");
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        },
        None => debug!("no user config found"),
    }

    // override via env variables
    builder = builder.add_source(
        Environment::with_prefix(NESSIE_ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .context("Could not read nessie configuration")
}

/// The user config file and whether it must exist.
fn user_config_file(explicit_file: Option<&Path>) -> Option<(PathBuf, bool)> {
    if let Some(file) = explicit_file {
        return Some((file.to_path_buf(), true));
    }

    if let Ok(dir) = env::var(NESSIE_CONFIG_DIR_VAR) {
        debug!("`${NESSIE_CONFIG_DIR_VAR}` set: {dir}");
        return Some((PathBuf::from(dir).join(NESSIE_CONFIG_FILE), false));
    }

    BaseDirectories::with_prefix(NESSIE_DIR_NAME)
        .find_config_file(NESSIE_CONFIG_FILE)
        .map(|file| (file, false))
}

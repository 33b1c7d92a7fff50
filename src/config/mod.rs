//! Ambient configuration: repository root and default commit user, resolved in order of
//! precedence from command-line flags (applied by the caller), environment variables, and
//! a per-user TOML config file.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::ocfl::{OcflError, Result};

const CONFIG_FILE: &str = "config.toml";
const GLOBAL: &str = "global";

const ENV_ROOT: &str = "OCFL_ROOT";
const ENV_USER_NAME: &str = "OCFL_USER_NAME";
const ENV_USER_EMAIL: &str = "OCFL_USER_EMAIL";

/// Resolved ambient configuration. Every field starts as whatever the config file says,
/// then is overridden by its environment variable if set.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub root: Option<String>,
    pub author_name: Option<String>,
    pub author_address: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Loads the per-user config file (if any), then applies environment variable overrides.
/// `name` selects a named profile section; falls back to `[global]`.
pub fn load_config(name: &Option<String>) -> Result<Config> {
    let mut config = match config_path() {
        Some(path) if path.exists() => resolve_config(name, parse_config(&path)?),
        _ => Config::new(),
    };

    if let Ok(root) = std::env::var(ENV_ROOT) {
        config.root = Some(root);
    }
    if let Ok(name) = std::env::var(ENV_USER_NAME) {
        config.author_name = Some(name);
    }
    if let Ok(email) = std::env::var(ENV_USER_EMAIL) {
        config.author_address = Some(email);
    }

    Ok(config)
}

/// The path to the per-user config file, or `None` if the config directory cannot be
/// resolved. The file may not exist.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// The engine's project directories. These do **not** necessarily exist.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "ocfl", "ocfl-engine")
}

fn parse_config(config_file: impl AsRef<Path>) -> Result<HashMap<String, Config>> {
    let mut buffer = Vec::new();
    fs::File::open(config_file.as_ref())
        .map_err(OcflError::from)?
        .read_to_end(&mut buffer)
        .map_err(OcflError::from)?;
    let text = String::from_utf8_lossy(&buffer);
    let config: HashMap<String, Config> = toml::from_str(&text)?;
    Ok(config)
}

fn resolve_config(name: &Option<String>, mut config: HashMap<String, Config>) -> Config {
    let global_config = config.remove(GLOBAL);
    let named_config = match name {
        None => None,
        Some(name) => config.remove(name),
    };

    match (global_config, named_config) {
        (Some(global), None) => global,
        (None, Some(named)) => named,
        (None, None) => Config::new(),
        (Some(global), Some(named)) => Config {
            root: named.root.or(global.root),
            author_name: named.author_name.or(global.author_name),
            author_address: named.author_address.or(global.author_address),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_profile_overrides_global() {
        let mut config = HashMap::new();
        config.insert(
            GLOBAL.to_string(),
            Config {
                root: Some("/global".to_string()),
                author_name: Some("Global User".to_string()),
                author_address: None,
            },
        );
        config.insert(
            "repo".to_string(),
            Config {
                root: Some("/repo".to_string()),
                author_name: None,
                author_address: None,
            },
        );

        let resolved = resolve_config(&Some("repo".to_string()), config);
        assert_eq!(Some("/repo".to_string()), resolved.root);
        assert_eq!(Some("Global User".to_string()), resolved.author_name);
    }
}

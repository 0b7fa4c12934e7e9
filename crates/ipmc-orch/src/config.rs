//! Loading [`ReplGroupOrchConfig`] from a JSON file.
//!
//! Missing fields take their defaults, so `{}` is a valid config file.

use crate::repl_group::ReplGroupOrchConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config {path}: max_groups_per_device must be at least 1")]
    NoGroups { path: PathBuf },
}

pub fn load_config(path: &Path) -> Result<ReplGroupOrchConfig, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ReplGroupOrchConfig =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if config.max_groups_per_device == 0 {
        return Err(ConfigError::NoGroups {
            path: path.to_path_buf(),
        });
    }
    Ok(config)
}

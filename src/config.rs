use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, TaxonId};
use crate::error::FillError;

pub const DEFAULT_CONFIG_FILE: &str = "gh-fill.json";

/// On-disk run configuration. Every field is optional; CLI flags override
/// file values and required fields are checked after the merge.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store_url: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// CLI-provided values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub store_url: Option<String>,
    pub index: Option<String>,
    pub root: Option<String>,
    pub types: Option<String>,
    pub direction: Option<Direction>,
    pub page_size: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_url: String,
    pub index: String,
    pub root: TaxonId,
    pub types_path: PathBuf,
    pub direction: Direction,
    pub page_size: usize,
    pub batch_size: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read the config file (explicit path, or `gh-fill.json` when present in
    /// the current directory) and merge CLI overrides on top.
    pub fn resolve(path: Option<&str>, overrides: Overrides) -> Result<ResolvedConfig, FillError> {
        let config = match path {
            Some(path) => Self::read_file(PathBuf::from(path))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read_file(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        Self::resolve_config(config, overrides)
    }

    fn read_file(path: PathBuf) -> Result<Config, FillError> {
        let content = fs::read_to_string(&path).map_err(|_| FillError::ConfigRead(path))?;
        serde_json::from_str(&content).map_err(|err| FillError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, overrides: Overrides) -> Result<ResolvedConfig, FillError> {
        let store_url = overrides
            .store_url
            .or(config.store_url)
            .unwrap_or_else(|| "http://localhost:9200".to_string());
        let index = overrides
            .index
            .or(config.index)
            .ok_or(FillError::MissingIndex)?;
        let root = overrides
            .root
            .or(config.root)
            .ok_or(FillError::MissingRoot)?
            .parse()?;
        let types_path = overrides
            .types
            .or(config.types)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("attribute_types.json"));
        Ok(ResolvedConfig {
            store_url,
            index,
            root,
            types_path,
            direction: overrides
                .direction
                .or(config.direction)
                .unwrap_or(Direction::Both),
            page_size: overrides.page_size.or(config.page_size).unwrap_or(1000),
            batch_size: overrides.batch_size.or(config.batch_size).unwrap_or(500),
        })
    }
}

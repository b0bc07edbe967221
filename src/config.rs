use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Namespaces;
use crate::error::PubtatorError;

pub const DEFAULT_CONFIG_FILE: &str = "pubtator.json";
pub const DEFAULT_OA_BASE: &str = "pubmed/";
pub const DEFAULT_WA_BASE: &str = "PMID:";
pub const DEFAULT_SUBDIR_PREFIX_LEN: usize = 4;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    /// Entity type substring -> namespace prefix for ids without one.
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    #[serde(default)]
    pub oa_base: Option<String>,
    #[serde(default)]
    pub wa_base: Option<String>,
    #[serde(default)]
    pub subdir_prefix_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub namespaces: Namespaces,
    /// Document URL prefix for Open Annotation output.
    pub oa_base: String,
    /// Document URL prefix for Web Annotation output.
    pub wa_base: String,
    pub subdir_prefix_len: usize,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from(Config::default())
    }
}

impl From<Config> for ResolvedConfig {
    fn from(config: Config) -> Self {
        Self {
            schema_version: config.schema_version.unwrap_or(1),
            namespaces: Namespaces::new(config.namespaces),
            oa_base: config.oa_base.unwrap_or_else(|| DEFAULT_OA_BASE.to_string()),
            wa_base: config.wa_base.unwrap_or_else(|| DEFAULT_WA_BASE.to_string()),
            subdir_prefix_len: config
                .subdir_prefix_len
                .filter(|len| *len > 0)
                .unwrap_or(DEFAULT_SUBDIR_PREFIX_LEN),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `pubtator.json` from the current directory when it
    /// exists. Without either the defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PubtatorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            return match path {
                Some(_) => Err(PubtatorError::MissingConfig(config_path)),
                None => Ok(ResolvedConfig::default()),
            };
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PubtatorError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ResolvedConfig, PubtatorError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| PubtatorError::ConfigParse(err.to_string()))?;
        Ok(config.into())
    }
}

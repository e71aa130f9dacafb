//! Dictionary configuration, loadable from TOML.
//!
//! ```toml
//! archive_path = "/usr/share/dict/oald.mdx"
//! result_limit = 200
//!
//! [weights]
//! headword = 120
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveOptions;
use crate::index::{BuildOptions, RankingWeights};
use crate::types::error::{DictError, Result};

/// Largest accepted `fuzzy_max_distance`.
pub const MAX_FUZZY_DISTANCE: usize = 8;
/// Largest accepted ranking weight or body cap.
pub const MAX_WEIGHT: u32 = 1_000_000;

/// Registration code and e-mail of an archive with encrypted record blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passcode {
    /// 32 hex characters.
    pub regcode: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub archive_path: PathBuf,
    /// Defaults to the archive path with the extension `mdxi`.
    pub index_path: Option<PathBuf>,
    pub passcode: Option<Passcode>,
    /// Overrides the encoding declared in the archive header.
    pub encoding: Option<String>,
    pub entry_cache_capacity: usize,
    pub query_cache_capacity: usize,
    pub result_limit: usize,
    pub suggestion_limit: usize,
    pub fuzzy_max_distance: usize,
    pub build_batch_size: usize,
    /// Write a freshly built index to `index_path`.
    pub persist_index: bool,
    pub weights: RankingWeights,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        DictionaryConfig {
            archive_path: PathBuf::new(),
            index_path: None,
            passcode: None,
            encoding: None,
            entry_cache_capacity: 256,
            query_cache_capacity: 128,
            result_limit: 500,
            suggestion_limit: 10,
            fuzzy_max_distance: 2,
            build_batch_size: 1024,
            persist_index: true,
            weights: RankingWeights::default(),
        }
    }
}

impl DictionaryConfig {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        DictionaryConfig {
            archive_path: archive_path.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DictionaryConfig =
            toml::from_str(s).map_err(|e| DictError::Config(format!("can't parse TOML content: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| DictError::Config(format!("can't read file {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&s)?;
        // relative paths are relative to the configuration file
        if let Some(base) = path.parent() {
            if config.archive_path.is_relative() {
                config.archive_path = base.join(&config.archive_path);
            }
            if let Some(index_path) = config.index_path.as_mut().filter(|p| p.is_relative()) {
                *index_path = base.join(&*index_path);
            }
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| DictError::Config(format!("can't convert to TOML format: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_path.as_os_str().is_empty() {
            return Err(DictError::Config("archive_path is required".to_string()));
        }
        if self.build_batch_size == 0 {
            return Err(DictError::Config("build_batch_size must be at least 1".to_string()));
        }
        if self.result_limit == 0 {
            return Err(DictError::Config("result_limit must be at least 1".to_string()));
        }
        if self.fuzzy_max_distance > MAX_FUZZY_DISTANCE {
            return Err(DictError::Config(format!(
                "fuzzy_max_distance must be at most {}",
                MAX_FUZZY_DISTANCE
            )));
        }
        let w = &self.weights;
        let weights = [
            ("headword", w.headword),
            ("variant", w.variant),
            ("pos", w.pos),
            ("body", w.body),
            ("body_cap", w.body_cap),
            ("exact_case_bonus", w.exact_case_bonus),
        ];
        if let Some((name, _)) = weights.iter().find(|(_, value)| *value > MAX_WEIGHT) {
            return Err(DictError::Config(format!("weights.{} must be at most {}", name, MAX_WEIGHT)));
        }
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.archive_path.with_extension("mdxi"))
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            passcode: self
                .passcode
                .as_ref()
                .map(|p| (p.regcode.clone(), p.email.clone())),
            encoding: self.encoding.clone(),
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            weights: self.weights,
            batch_size: self.build_batch_size,
        }
    }
}

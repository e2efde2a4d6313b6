//! File-backed cache of namespace configurations
//!
//! One JSON record per namespace under the save directory:
//! `{save_dir}/apolloConfig.{namespace}.json`. Records are replaced with a
//! temp-file-then-rename so readers see either the old or the new release,
//! never a partial file.
//!
//! A save directory is assumed to be written by a single client at a time.
//! Nothing here takes a lock across processes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::model::ApolloConfig;

const FILE_PREFIX: &str = "apolloConfig.";
const FILE_SUFFIX: &str = ".json";

/// Per-namespace record store
#[derive(Clone, Debug)]
pub struct CacheStore {
    save_dir: PathBuf,
}

impl CacheStore {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Path of the record for a namespace
    pub fn config_file(&self, namespace: &str) -> PathBuf {
        self.save_dir
            .join(format!("{}{}{}", FILE_PREFIX, namespace, FILE_SUFFIX))
    }

    /// Release key of the cached record, `None` when there is no usable record.
    pub fn read_release_key(&self, namespace: &str) -> Option<String> {
        self.read(namespace).map(|config| config.release_key)
    }

    /// Full cached record, `None` when missing or unreadable.
    pub fn read(&self, namespace: &str) -> Option<ApolloConfig> {
        let file = self.config_file(namespace);
        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %file.display(), "Failed to read cached config: {}", e);
                }
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %file.display(), "Ignoring corrupt cached config: {}", e);
                None
            }
        }
    }

    /// Replace the record for a namespace with `config`.
    pub fn write(&self, namespace: &str, config: &ApolloConfig) -> Result<()> {
        let storage_err = |source: std::io::Error| ClientError::StorageWrite {
            namespace: namespace.to_string(),
            source,
        };

        let content = serde_json::to_vec_pretty(config)
            .map_err(|e| storage_err(std::io::Error::other(e)))?;

        fs::create_dir_all(&self.save_dir).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(&self.save_dir).map_err(storage_err)?;
        tmp.write_all(&content).map_err(storage_err)?;
        tmp.as_file().sync_all().map_err(storage_err)?;

        let file = self.config_file(namespace);
        tmp.persist(&file).map_err(|e| storage_err(e.error))?;

        debug!(
            namespace = namespace,
            release_key = %config.release_key,
            "Cached config written to {}",
            file.display()
        );
        Ok(())
    }

    /// Every readable record in the save directory, ordered by file name.
    ///
    /// Corrupt records are skipped. A missing save directory yields no records.
    pub fn load_all(&self) -> Result<Vec<ApolloConfig>> {
        let entries = match fs::read_dir(&self.save_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX));
            if is_record && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut configs = Vec::with_capacity(files.len());
        for file in files {
            let parsed = fs::read_to_string(&file)
                .map_err(anyhow::Error::from)
                .and_then(|content| {
                    serde_json::from_str::<ApolloConfig>(&content).map_err(anyhow::Error::from)
                });
            match parsed {
                Ok(config) => configs.push(config),
                Err(e) => warn!(path = %file.display(), "Skipping unreadable cached config: {}", e),
            }
        }
        Ok(configs)
    }

    /// All cached configurations merged into one map; later files win on key clashes.
    pub fn merged_configurations(&self) -> Result<BTreeMap<String, String>> {
        let mut merged = BTreeMap::new();
        for config in self.load_all()? {
            merged.extend(config.configurations);
        }
        Ok(merged)
    }
}

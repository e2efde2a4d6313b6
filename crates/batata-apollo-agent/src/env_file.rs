//! Env file rendering from the cached namespaces
//!
//! After every change round all cached namespace configs are merged and
//! written out as `KEY=value` lines, replacing the previous file atomically.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use batata_apollo_client::{CacheStore, ChangeListener};
use tempfile::NamedTempFile;
use tracing::info;

/// Rebuilds the env file from a cache store
pub struct EnvFileWriter {
    cache: CacheStore,
    path: PathBuf,
}

impl EnvFileWriter {
    pub fn new(cache: CacheStore, path: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            path: path.into(),
        }
    }

    /// Merge every cached namespace and write the env file.
    pub fn rebuild(&self) -> anyhow::Result<usize> {
        let merged = self.cache.merged_configurations()?;
        if merged.is_empty() {
            bail!("Load Apollo Config Failed, no config available");
        }

        write_atomic(&self.path, render(&merged).as_bytes())
            .with_context(|| format!("Failed to write env file {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            keys = merged.len(),
            "Env file rebuilt"
        );
        Ok(merged.len())
    }
}

impl ChangeListener for EnvFileWriter {
    fn on_change(&self) -> anyhow::Result<()> {
        self.rebuild().map(|_| ())
    }
}

/// `KEY=value` lines in key order
pub fn render(configurations: &BTreeMap<String, String>) -> String {
    configurations
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect()
}

fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

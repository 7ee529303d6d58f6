//! Chunking settings, loadable from TOML.
//!
//! Partial files are accepted; unspecified values use the defaults below.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tsmap_core::{MappingError, MappingResult};
use tsmap_ts::ComputationRange;

use crate::chunk::ChunkCutter;

/// How a run is partitioned and executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Points per chunk.
    pub chunk_size: i64,

    /// Number of worker threads (0 = auto-detect).
    pub threads: usize,

    /// Data versions to process; empty means every version of the store.
    pub versions: Vec<u32>,

    /// First point of the window; unset means the start of the data.
    pub first_variant: Option<i64>,

    /// Points in the window; unset means up to the end of the data.
    pub variant_count: Option<i64>,

    /// Where the runner writes its manifest, if anywhere.
    pub manifest_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 96,
            threads: 0,
            versions: Vec::new(),
            first_variant: None,
            variant_count: None,
            manifest_path: None,
        }
    }
}

impl ChunkingConfig {
    pub fn from_toml_str(text: &str) -> MappingResult<Self> {
        toml::from_str(text).map_err(|err| MappingError::Parse(err.to_string()))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading chunking config '{}'", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("parsing chunking config '{}'", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self).context("serializing chunking config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("writing chunking config '{}'", path.display()))?;
        Ok(())
    }

    /// Worker count with auto-detection resolved.
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Requested range, before defaults are filled from a store.
    pub fn computation_range(&self) -> MappingResult<ComputationRange> {
        let versions = self.versions.iter().copied();
        if self.first_variant.is_none() && self.variant_count.is_none() {
            ComputationRange::new(versions, Vec::new())
        } else {
            ComputationRange::from_variants(versions, self.first_variant, self.variant_count)
        }
    }

    /// Cutter over a checked range.
    pub fn cutter(&self, range: &ComputationRange) -> MappingResult<ChunkCutter> {
        ChunkCutter::new(range.ranges(), self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tsmap_core::PointRange;

    #[test]
    fn partial_toml_uses_defaults() {
        let config = ChunkingConfig::from_toml_str("chunk_size = 24\nversions = [1, 2]\n").unwrap();
        assert_eq!(config.chunk_size, 24);
        assert_eq!(config.versions, vec![1, 2]);
        assert_eq!(config.threads, 0);
        assert!(config.thread_count() >= 1);
        assert!(config.manifest_path.is_none());
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(
            ChunkingConfig::from_toml_str("chunk_size = \"many\""),
            Err(MappingError::Parse(_))
        ));
    }

    #[test]
    fn window_becomes_a_range() {
        let config = ChunkingConfig {
            chunk_size: 10,
            versions: vec![3],
            first_variant: Some(100),
            variant_count: Some(101),
            ..ChunkingConfig::default()
        };
        let range = config.computation_range().unwrap();
        assert_eq!(range.ranges(), [PointRange::closed(100, 200)]);
        let cutter = config.cutter(&range).unwrap();
        assert_eq!(cutter.chunk_count(), 11);

        let open = ChunkingConfig::default().computation_range().unwrap();
        assert!(open.ranges().is_empty());
        assert!(open.versions().is_empty());
    }

    #[test]
    fn save_and_load() {
        let config = ChunkingConfig {
            chunk_size: 48,
            threads: 2,
            first_variant: Some(0),
            ..ChunkingConfig::default()
        };
        let tmp = NamedTempFile::new().unwrap();
        config.save_to(tmp.path()).unwrap();
        assert_eq!(ChunkingConfig::load_from(tmp.path()).unwrap(), config);
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::runner::ChunkRecord;

/// Outcome of one chunked run, persisted as JSON.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub created_at: DateTime<Utc>,
    pub chunk_size: usize,
    pub num_chunks: usize,
    pub success: usize,
    pub failure: usize,
    pub chunks: Vec<ChunkRecord>,
}

pub fn write_chunk_manifest(path: &Path, manifest: &ChunkManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
    }
    let json =
        serde_json::to_string_pretty(manifest).context("serializing chunk manifest to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("writing chunk manifest '{}'", path.display()))?;
    Ok(())
}

pub fn load_chunk_manifest(path: &Path) -> Result<ChunkManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening chunk manifest '{}'", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("parsing chunk manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_writes_and_reads_back() {
        let record = ChunkRecord {
            chunk: 0,
            lower: 0,
            upper: 91,
            points: 92,
            status: "ok".into(),
            error: None,
            elapsed_ms: 3,
        };
        let manifest = ChunkManifest {
            created_at: Utc::now(),
            chunk_size: 92,
            num_chunks: 1,
            success: 1,
            failure: 0,
            chunks: vec![record.clone()],
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs").join("chunk_manifest.json");
        write_chunk_manifest(&path, &manifest).unwrap();
        let parsed = load_chunk_manifest(&path).unwrap();
        assert_eq!(parsed.chunk_size, 92);
        assert_eq!(parsed.chunks.first().unwrap().upper, record.upper);
        assert_eq!(parsed.created_at, manifest.created_at);
    }
}

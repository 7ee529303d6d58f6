use crate::chunk::ChunkCutter;
use crate::config::ChunkingConfig;
use crate::manifest::{write_chunk_manifest, ChunkManifest};
use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};
use tsmap_core::{MappingResult, PointRange};
use tsmap_ts::ComputationRange;

/// One unit of work handed to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Closed hull of the chunk
    pub range: PointRange,
    /// Exact covered pieces
    pub segments: Vec<PointRange>,
}

impl Chunk {
    pub fn point_count(&self) -> u64 {
        self.segments.iter().map(PointRange::len).sum()
    }

    /// Range restricted to this chunk, for the statistics engine.
    pub fn computation_range(&self, versions: &BTreeSet<u32>) -> MappingResult<ComputationRange> {
        ComputationRange::new(versions.iter().copied(), self.segments.clone())
    }
}

/// Per-chunk outcome; `status` is "ok" or "error".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: usize,
    pub lower: i64,
    pub upper: i64,
    pub points: u64,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_ms: i64,
}

/// Success/failure counts, records and manifest location of a run.
#[derive(Debug)]
pub struct ChunkRunSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: Option<PathBuf>,
    pub chunks: Vec<ChunkRecord>,
}

/// Run `job` on every chunk of `cutter` in parallel.
///
/// A failing chunk is recorded and does not stop the others. Records come
/// back in chunk order.
pub fn run_chunks<F>(config: &ChunkingConfig, cutter: &ChunkCutter, job: F) -> Result<ChunkRunSummary>
where
    F: Fn(&Chunk) -> Result<()> + Sync,
{
    let thread_count = config.thread_count();
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for chunk runs")?;

    let chunks: Vec<Chunk> = (0..cutter.chunk_count())
        .map(|index| Chunk {
            index,
            range: cutter.chunk_range(index as i64),
            segments: cutter.chunk_segments(index as i64),
        })
        .collect();
    info!(
        chunks = chunks.len(),
        chunk_size = cutter.chunk_size(),
        threads = thread_count,
        "starting chunk run"
    );

    let records: Vec<ChunkRecord> =
        pool.install(|| chunks.par_iter().map(|chunk| run_chunk(chunk, &job)).collect());

    let success = records.iter().filter(|record| record.status == "ok").count();
    let failure = records.len() - success;
    if failure > 0 {
        warn!(failure, "some chunks failed");
    }

    let manifest_path = match &config.manifest_path {
        Some(path) => {
            let manifest = ChunkManifest {
                created_at: Utc::now(),
                chunk_size: cutter.chunk_size(),
                num_chunks: records.len(),
                success,
                failure,
                chunks: records.clone(),
            };
            write_chunk_manifest(path, &manifest)?;
            Some(path.clone())
        }
        None => None,
    };

    Ok(ChunkRunSummary {
        success,
        failure,
        manifest_path,
        chunks: records,
    })
}

fn run_chunk<F>(chunk: &Chunk, job: &F) -> ChunkRecord
where
    F: Fn(&Chunk) -> Result<()>,
{
    let started = Utc::now();
    let outcome = job(chunk);
    let elapsed_ms = (Utc::now() - started).num_milliseconds();

    let (status, error) = match outcome {
        Ok(()) => ("ok".to_string(), None),
        Err(err) => {
            warn!(chunk = chunk.index, error = %err, "chunk failed");
            ("error".to_string(), Some(format!("{err:#}")))
        }
    };
    ChunkRecord {
        chunk: chunk.index,
        lower: chunk.range.lower,
        upper: chunk.range.upper,
        points: chunk.point_count(),
        status,
        error,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn every_chunk_runs_once() {
        let cutter = ChunkCutter::new(&[PointRange::closed(0, 99)], 7).unwrap();
        let config = ChunkingConfig {
            threads: 2,
            ..ChunkingConfig::default()
        };
        let covered = AtomicU64::new(0);
        let summary = run_chunks(&config, &cutter, |chunk| {
            covered.fetch_add(chunk.point_count(), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert_eq!(summary.success, 15);
        assert_eq!(summary.failure, 0);
        assert_eq!(covered.load(Ordering::SeqCst), 100);
        let order: Vec<usize> = summary.chunks.iter().map(|r| r.chunk).collect();
        assert_eq!(order, (0..15).collect::<Vec<_>>());
        assert!(summary.manifest_path.is_none());
    }

    #[test]
    fn failures_are_recorded() {
        let cutter = ChunkCutter::new(&[PointRange::closed(0, 9)], 5).unwrap();
        let config = ChunkingConfig {
            threads: 1,
            ..ChunkingConfig::default()
        };
        let summary = run_chunks(&config, &cutter, |chunk| {
            if chunk.index == 1 {
                bail!("solver diverged");
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failure, 1);
        let failed = &summary.chunks[1];
        assert_eq!(failed.status, "error");
        assert_eq!(failed.error.as_deref(), Some("solver diverged"));
        assert_eq!((failed.lower, failed.upper), (5, 9));
    }

    #[test]
    fn chunk_range_for_statistics() {
        let chunk = Chunk {
            index: 0,
            range: PointRange::closed(3, 21),
            segments: vec![PointRange::closed(3, 3), PointRange::closed(20, 21)],
        };
        let versions: BTreeSet<u32> = [1].into_iter().collect();
        let range = chunk.computation_range(&versions).unwrap();
        assert_eq!(range.point_count(), 3);
        assert_eq!(chunk.point_count(), 3);
    }
}

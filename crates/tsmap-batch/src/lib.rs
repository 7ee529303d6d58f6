//! # tsmap-batch: chunked execution of a computation range
//!
//! [`ChunkCutter`] splits the covered points into fixed-size chunks,
//! [`run_chunks`] runs a job per chunk on a rayon pool and records the
//! outcome in a [`ChunkManifest`].

pub mod chunk;
pub mod config;
pub mod manifest;
pub mod runner;

pub use chunk::ChunkCutter;
pub use config::ChunkingConfig;
pub use manifest::{load_chunk_manifest, write_chunk_manifest, ChunkManifest};
pub use runner::{run_chunks, Chunk, ChunkRecord, ChunkRunSummary};

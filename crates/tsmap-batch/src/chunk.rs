//! Partitioning of point intervals into fixed-size chunks.
//!
//! The covered points of all intervals are numbered as one ordered
//! sequence and cut every `chunk_size` points, so the chunk count is
//! `ceil(total / chunk_size)` whatever the number of intervals. A chunk
//! that straddles a gap between two intervals is reported by
//! [`ChunkCutter::chunk_range`] as its closed hull and by
//! [`ChunkCutter::chunk_segments`] as the exact covered pieces.

use tsmap_core::{MappingError, MappingResult, PointRange};
use tsmap_ts::check_ranges;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCutter {
    ranges: Vec<PointRange>,
    /// position of each interval's first point in the covered sequence
    offsets: Vec<u64>,
    total: u64,
    chunk_size: u64,
}

impl ChunkCutter {
    /// Cut disjoint intervals into chunks of `chunk_size` points.
    pub fn new(ranges: &[PointRange], chunk_size: i64) -> MappingResult<Self> {
        if chunk_size < 1 {
            return Err(MappingError::InvalidChunkSize(chunk_size));
        }
        if ranges.is_empty() {
            return Err(MappingError::Config(
                "at least one point range is needed to cut chunks".to_string(),
            ));
        }
        let ranges = check_ranges(ranges)?;
        let mut offsets = Vec::with_capacity(ranges.len());
        let mut total = 0u64;
        for range in &ranges {
            offsets.push(total);
            total += range.len();
        }
        Ok(Self {
            ranges,
            offsets,
            total,
            chunk_size: chunk_size as u64,
        })
    }

    /// Single window `[first_variant, last_variant]`.
    pub fn from_variants(first_variant: i64, last_variant: i64, chunk_size: i64) -> MappingResult<Self> {
        Self::new(&[PointRange::closed(first_variant, last_variant)], chunk_size)
    }

    pub fn chunk_count(&self) -> usize {
        self.total.div_ceil(self.chunk_size) as usize
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size as usize
    }

    /// Index of the first chunk; numbering always starts at zero.
    pub fn chunk_offset(&self) -> usize {
        0
    }

    /// Total number of covered points.
    pub fn point_count(&self) -> u64 {
        self.total
    }

    pub fn ranges(&self) -> &[PointRange] {
        &self.ranges
    }

    fn in_domain(&self, index: i64) -> bool {
        index >= 0 && (index as u64) < self.chunk_count() as u64
    }

    /// Covered pieces of chunk `index`; empty outside the domain.
    pub fn chunk_segments(&self, index: i64) -> Vec<PointRange> {
        if !self.in_domain(index) {
            return Vec::new();
        }
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total);

        // First interval whose covered positions reach `start`.
        let first = self
            .offsets
            .partition_point(|offset| *offset <= start)
            .saturating_sub(1);

        let mut segments = Vec::new();
        for (range, offset) in self.ranges.iter().zip(&self.offsets).skip(first) {
            if *offset >= end {
                break;
            }
            let from = start.max(*offset) - offset;
            let to = end.min(offset + range.len()) - offset;
            if from < to {
                segments.push(PointRange::closed(
                    range.lower + from as i64,
                    range.lower + to as i64 - 1,
                ));
            }
        }
        segments
    }

    /// Closed interval of chunk `index`, or `[-1..-1]` outside the domain.
    pub fn chunk_range(&self, index: i64) -> PointRange {
        let segments = self.chunk_segments(index);
        match (segments.first(), segments.last()) {
            (Some(first), Some(last)) => PointRange::closed(first.lower, last.upper),
            _ => PointRange::SENTINEL,
        }
    }

    /// Chunk covering `point`, or 0 when no chunk covers it.
    pub fn chunk_from_index(&self, point: i64) -> usize {
        self.ranges
            .iter()
            .zip(&self.offsets)
            .find(|(range, _)| range.contains(point))
            .map(|(range, offset)| ((offset + (point - range.lower) as u64) / self.chunk_size) as usize)
            .unwrap_or(0)
    }

    /// Every chunk interval, in order.
    pub fn chunks(&self) -> Vec<PointRange> {
        (0..self.chunk_count() as i64)
            .map(|index| self.chunk_range(index))
            .collect()
    }
}

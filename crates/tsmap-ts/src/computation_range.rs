//! Data versions and point intervals selected for a run.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};
use tsmap_core::{MappingError, MappingResult, PointRange};

use crate::store::{check_index_unicity, TimeSeriesStore};

/// Version used when neither the caller nor the store names any.
pub const DEFAULT_VERSION: u32 = 1;

/// Validate intervals and return them sorted by lower bound.
///
/// Each interval needs `0 <= lower <= upper`; no two intervals may be
/// connected (sharing a point counts).
pub fn check_ranges(ranges: &[PointRange]) -> MappingResult<Vec<PointRange>> {
    for range in ranges {
        range.validate()?;
    }
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| range.lower);
    for pair in sorted.windows(2) {
        if pair[0].is_connected(&pair[1]) {
            return Err(MappingError::RangesOverlap {
                first: pair[0].to_string(),
                second: pair[1].to_string(),
            });
        }
    }
    Ok(sorted)
}

/// Versions and ordered, disjoint point intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputationRange {
    versions: BTreeSet<u32>,
    ranges: Vec<PointRange>,
}

impl ComputationRange {
    /// Build a range. Either part may be empty and is then filled by
    /// [`ComputationRange::check`].
    pub fn new(
        versions: impl IntoIterator<Item = u32>,
        ranges: Vec<PointRange>,
    ) -> MappingResult<Self> {
        let versions: BTreeSet<u32> = versions.into_iter().collect();
        if versions.contains(&0) {
            return Err(MappingError::Config(
                "data versions must be positive".to_string(),
            ));
        }
        Ok(Self {
            versions,
            ranges: check_ranges(&ranges)?,
        })
    }

    /// One window starting at `first_variant` (default 0) and spanning
    /// `variant_count` points (default: up to the end of the data, clipped
    /// by [`ComputationRange::check`]).
    pub fn from_variants(
        versions: impl IntoIterator<Item = u32>,
        first_variant: Option<i64>,
        variant_count: Option<i64>,
    ) -> MappingResult<Self> {
        let first = first_variant.unwrap_or(0);
        let last = match variant_count {
            Some(count) if count < 1 => {
                return Err(MappingError::MalformedRange {
                    lower: first,
                    upper: first.saturating_add(count).saturating_sub(1),
                })
            }
            Some(count) => first.saturating_add(count - 1),
            None => i64::MAX,
        };
        Self::new(versions, vec![PointRange::closed(first, last)])
    }

    pub fn versions(&self) -> &BTreeSet<u32> {
        &self.versions
    }

    pub fn ranges(&self) -> &[PointRange] {
        &self.ranges
    }

    /// Total number of points covered by the intervals.
    pub fn point_count(&self) -> u64 {
        self.ranges.iter().map(PointRange::len).sum()
    }

    pub fn contains(&self, point: i64) -> bool {
        self.ranges.iter().any(|range| range.contains(point))
    }

    /// Fill in defaults against a store.
    ///
    /// Missing versions come from the store, then fall back to
    /// [`DEFAULT_VERSION`]. Missing intervals become the full span of the
    /// store's shared index. Explicit upper bounds are clipped to that span;
    /// an interval lying wholly past it is kept unchanged.
    pub fn check(range: Option<ComputationRange>, store: &dyn TimeSeriesStore) -> MappingResult<Self> {
        let (mut versions, ranges) = match range {
            Some(range) => (range.versions, range.ranges),
            None => (BTreeSet::new(), Vec::new()),
        };

        if versions.is_empty() {
            versions = store.versions();
        }
        if versions.is_empty() {
            versions.insert(DEFAULT_VERSION);
        }

        let names = store.names(false);
        let index = check_index_unicity(store, names.iter().map(String::as_str))?;
        let full = index.and_then(|index| index.full_range());

        let ranges = match (ranges.is_empty(), full) {
            (true, Some(full)) => vec![full],
            (true, None) => {
                return Err(MappingError::MissingIndex(
                    "cannot default the point range of an empty store".to_string(),
                ))
            }
            (false, Some(full)) => clip(ranges, full),
            (false, None) => ranges,
        };

        info!(versions = versions.len(), ranges = ranges.len(), "computation range checked");
        Ok(Self {
            versions,
            ranges: check_ranges(&ranges)?,
        })
    }
}

/// Upper bounds past the index are cut back to its last point. A range
/// starting past the index is kept as given; statistics over it are empty.
fn clip(ranges: Vec<PointRange>, full: PointRange) -> Vec<PointRange> {
    ranges
        .into_iter()
        .map(|range| {
            if range.lower > full.upper {
                warn!(%range, index = %full, "range starts past the store index");
                return range;
            }
            let clipped = PointRange::closed(range.lower, range.upper.min(full.upper));
            if clipped != range {
                debug!(%range, %clipped, "clipped range to the store index");
            }
            clipped
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTimeSeriesStore, TimeSeriesIndex};
    use chrono::{Duration, TimeZone, Utc};

    fn index(points: usize) -> TimeSeriesIndex {
        TimeSeriesIndex::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Duration::hours(1),
            points,
        )
    }

    #[test]
    fn overlapping_ranges_fail() {
        let err = ComputationRange::new(
            [1],
            vec![PointRange::closed(5, 15), PointRange::closed(0, 10)],
        )
        .unwrap_err();
        match err {
            MappingError::RangesOverlap { first, second } => {
                assert_eq!(first, "[0..10]");
                assert_eq!(second, "[5..15]");
            }
            other => panic!("unexpected {other}"),
        }
        // Touching at one point is connected.
        assert!(ComputationRange::new([1], vec![
            PointRange::closed(0, 5),
            PointRange::closed(5, 9)
        ])
        .is_err());
        // Adjacent integers are not.
        let range = ComputationRange::new([1], vec![
            PointRange::closed(6, 9),
            PointRange::closed(0, 5),
        ])
        .unwrap();
        assert_eq!(range.ranges()[0], PointRange::closed(0, 5));
        assert_eq!(range.point_count(), 10);
    }

    #[test]
    fn malformed_bounds_fail() {
        let err = ComputationRange::new([1], vec![PointRange::closed(-1, 3)]).unwrap_err();
        assert!(matches!(err, MappingError::MalformedRange { lower: -1, upper: 3 }));
        assert!(ComputationRange::new([1], vec![PointRange::closed(4, 3)]).is_err());
        assert!(ComputationRange::new([0], vec![]).is_err());
    }

    #[test]
    fn variants_window() {
        let range = ComputationRange::from_variants([2], Some(10), Some(5)).unwrap();
        assert_eq!(range.ranges(), [PointRange::closed(10, 14)]);
        assert!(range.contains(14) && !range.contains(15));
        assert!(ComputationRange::from_variants([2], Some(-3), Some(5)).is_err());
        assert!(ComputationRange::from_variants([2], None, Some(0)).is_err());
    }

    #[test]
    fn check_fills_defaults_from_store() {
        let mut store = InMemoryTimeSeriesStore::new();
        store.insert("a", index(24), 2, vec![0.0; 24]).unwrap();
        store.insert("a", index(24), 5, vec![0.0; 24]).unwrap();

        let range = ComputationRange::check(None, &store).unwrap();
        assert_eq!(range.versions().iter().copied().collect::<Vec<_>>(), [2, 5]);
        assert_eq!(range.ranges(), [PointRange::closed(0, 23)]);

        let partial = ComputationRange::from_variants([], Some(20), None).unwrap();
        let range = ComputationRange::check(Some(partial), &store).unwrap();
        assert_eq!(range.versions().len(), 2);
        assert_eq!(range.ranges(), [PointRange::closed(20, 23)]);

    }

    #[test]
    fn range_past_the_index_is_kept() {
        let mut store = InMemoryTimeSeriesStore::new();
        store.insert("a", index(24), 1, vec![0.0; 24]).unwrap();

        let beyond = ComputationRange::new([1], vec![PointRange::closed(30, 40)]).unwrap();
        let range = ComputationRange::check(Some(beyond), &store).unwrap();
        assert_eq!(range.ranges(), [PointRange::closed(30, 40)]);

        let mixed = ComputationRange::new(
            [1],
            vec![PointRange::closed(10, 30), PointRange::closed(35, 40)],
        )
        .unwrap();
        let range = ComputationRange::check(Some(mixed), &store).unwrap();
        assert_eq!(
            range.ranges(),
            [PointRange::closed(10, 23), PointRange::closed(35, 40)]
        );
    }

    #[test]
    fn check_without_versions_defaults_to_one() {
        let store = InMemoryTimeSeriesStore::new();
        let explicit = ComputationRange::new([], vec![PointRange::closed(0, 9)]).unwrap();
        let range = ComputationRange::check(Some(explicit), &store).unwrap();
        assert_eq!(range.versions().iter().copied().collect::<Vec<_>>(), [DEFAULT_VERSION]);
        assert_eq!(range.ranges(), [PointRange::closed(0, 9)]);

        assert!(matches!(
            ComputationRange::check(None, &store),
            Err(MappingError::MissingIndex(_))
        ));
    }

    #[test]
    fn serializes_sorted() {
        let range = ComputationRange::new([3, 1], vec![PointRange::closed(0, 9)]).unwrap();
        assert_eq!(
            serde_json::to_string(&range).unwrap(),
            r#"{"versions":[1,3],"ranges":[{"lower":0,"upper":9}]}"#
        );
    }

    #[test]
    fn check_rejects_inconsistent_store() {
        let mut store = InMemoryTimeSeriesStore::new();
        store.insert("a", index(24), 1, vec![0.0; 24]).unwrap();
        store.insert("b", index(48), 1, vec![0.0; 48]).unwrap();
        assert!(matches!(
            ComputationRange::check(None, &store),
            Err(MappingError::InconsistentIndex(_))
        ));
    }
}

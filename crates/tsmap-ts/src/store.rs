//! Read-only time-series store consumed by the statistics engine.
//!
//! Materializing a series may be slow (decompression, disk access); the
//! trait exposes it as a plain synchronous call and callers that need
//! bounded latency wrap it themselves.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tsmap_core::{Formula, MappingError, MappingResult, PointRange};

/// Shared sampling of a set of series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesIndex {
    pub start: DateTime<Utc>,
    /// Spacing between two points, in milliseconds
    pub spacing_ms: i64,
    pub point_count: usize,
}

impl TimeSeriesIndex {
    pub fn new(start: DateTime<Utc>, spacing: Duration, point_count: usize) -> Self {
        Self {
            start,
            spacing_ms: spacing.num_milliseconds(),
            point_count,
        }
    }

    pub fn spacing(&self) -> Duration {
        Duration::milliseconds(self.spacing_ms)
    }

    /// Timestamp of a point, `None` outside the index.
    pub fn time_at(&self, point: usize) -> Option<DateTime<Utc>> {
        if point >= self.point_count {
            return None;
        }
        let offset = i64::try_from(point).ok()?.checked_mul(self.spacing_ms)?;
        self.start.checked_add_signed(Duration::milliseconds(offset))
    }

    /// Point at or before `time`, `None` outside the index.
    pub fn point_at(&self, time: DateTime<Utc>) -> Option<usize> {
        if self.spacing_ms <= 0 || time < self.start {
            return None;
        }
        let elapsed = (time - self.start).num_milliseconds();
        let point = usize::try_from(elapsed / self.spacing_ms).ok()?;
        (point < self.point_count).then_some(point)
    }

    /// `[0, point_count - 1]`, `None` for an empty index.
    pub fn full_range(&self) -> Option<PointRange> {
        let count = i64::try_from(self.point_count).ok()?;
        (count > 0).then(|| PointRange::closed(0, count - 1))
    }
}

/// Read-only access to stored and calculated series.
pub trait TimeSeriesStore: Send + Sync {
    /// Names held by the store. With `include_dependencies`, names that
    /// calculated series refer to are listed too.
    fn names(&self, include_dependencies: bool) -> BTreeSet<String>;

    fn exists(&self, name: &str) -> bool;

    /// Data versions available in the store.
    fn versions(&self) -> BTreeSet<u32>;

    fn versions_of(&self, name: &str) -> BTreeSet<u32>;

    /// Index of a stored series; `None` for unknown or calculated names.
    fn index_of(&self, name: &str) -> Option<TimeSeriesIndex>;

    /// Calculated series definition, if `name` is one.
    fn formula(&self, name: &str) -> Option<&Formula> {
        let _ = name;
        None
    }

    /// Flat values of a stored series at one version.
    fn values(&self, name: &str, version: u32) -> MappingResult<Vec<f64>>;
}

#[derive(Debug, Clone)]
struct StoredSeries {
    index: TimeSeriesIndex,
    versions: BTreeMap<u32, Vec<f64>>,
}

/// Store backed by in-memory arrays.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTimeSeriesStore {
    series: BTreeMap<String, StoredSeries>,
    formulas: BTreeMap<String, Formula>,
}

impl InMemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the values of one version. The array length must match the
    /// series index.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        index: TimeSeriesIndex,
        version: u32,
        values: Vec<f64>,
    ) -> MappingResult<()> {
        let name = name.into();
        if values.len() != index.point_count {
            return Err(MappingError::InconsistentIndex(format!(
                "'{name}' has {} values for an index of {} points",
                values.len(),
                index.point_count
            )));
        }
        let entry = self
            .series
            .entry(name.clone())
            .or_insert_with(|| StoredSeries {
                index,
                versions: BTreeMap::new(),
            });
        if entry.index != index {
            return Err(MappingError::InconsistentIndex(format!(
                "'{name}' already stored with another index"
            )));
        }
        entry.versions.insert(version, values);
        debug!(name = %name, version, "stored time series");
        Ok(())
    }

    pub fn insert_formula(&mut self, name: impl Into<String>, formula: Formula) {
        self.formulas.insert(name.into(), formula);
    }
}

impl TimeSeriesStore for InMemoryTimeSeriesStore {
    fn names(&self, include_dependencies: bool) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .series
            .keys()
            .chain(self.formulas.keys())
            .cloned()
            .collect();
        if include_dependencies {
            for formula in self.formulas.values() {
                names.extend(formula.dependencies());
            }
        }
        names
    }

    fn exists(&self, name: &str) -> bool {
        self.series.contains_key(name) || self.formulas.contains_key(name)
    }

    fn versions(&self) -> BTreeSet<u32> {
        self.series
            .values()
            .flat_map(|s| s.versions.keys().copied())
            .collect()
    }

    fn versions_of(&self, name: &str) -> BTreeSet<u32> {
        self.series
            .get(name)
            .map(|s| s.versions.keys().copied().collect())
            .unwrap_or_default()
    }

    fn index_of(&self, name: &str) -> Option<TimeSeriesIndex> {
        self.series.get(name).map(|s| s.index)
    }

    fn formula(&self, name: &str) -> Option<&Formula> {
        self.formulas.get(name)
    }

    fn values(&self, name: &str, version: u32) -> MappingResult<Vec<f64>> {
        let series = self
            .series
            .get(name)
            .ok_or_else(|| MappingError::UnknownTimeSeries(name.to_string()))?;
        series
            .versions
            .get(&version)
            .cloned()
            .ok_or_else(|| MappingError::MissingVersions {
                name: name.to_string(),
                versions: vec![version],
            })
    }
}

/// Stored series a set of names reads, with calculated series expanded.
pub fn stored_dependencies<'a>(
    store: &dyn TimeSeriesStore,
    names: impl IntoIterator<Item = &'a str>,
) -> BTreeSet<String> {
    let mut stored = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<String> = names.into_iter().map(str::to_string).collect();
    while let Some(name) = stack.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        match store.formula(&name) {
            Some(formula) => stack.extend(formula.dependencies()),
            None => {
                stored.insert(name);
            }
        }
    }
    stored
}

/// Index shared by the given series.
///
/// Calculated series are expanded to what they read. Returns `None` when
/// none of the names has an index, and fails when two indexes differ.
pub fn check_index_unicity<'a>(
    store: &dyn TimeSeriesStore,
    names: impl IntoIterator<Item = &'a str>,
) -> MappingResult<Option<TimeSeriesIndex>> {
    let mut found: Option<(String, TimeSeriesIndex)> = None;
    for name in stored_dependencies(store, names) {
        let Some(index) = store.index_of(&name) else {
            continue;
        };
        if let Some((first, shared)) = &found {
            if *shared != index {
                return Err(MappingError::InconsistentIndex(format!(
                    "'{first}' and '{name}' differ"
                )));
            }
        } else {
            found = Some((name, index));
        }
    }
    Ok(found.map(|(_, index)| index))
}

/// Fails when a stored series lacks one of `versions`.
pub fn check_values<'a>(
    store: &dyn TimeSeriesStore,
    versions: &BTreeSet<u32>,
    names: impl IntoIterator<Item = &'a str>,
) -> MappingResult<()> {
    for name in stored_dependencies(store, names) {
        if !store.exists(&name) {
            return Err(MappingError::UnknownTimeSeries(name));
        }
        let available = store.versions_of(&name);
        let missing: Vec<u32> = versions.difference(&available).copied().collect();
        if !missing.is_empty() {
            return Err(MappingError::MissingVersions {
                name,
                versions: missing,
            });
        }
    }
    Ok(())
}

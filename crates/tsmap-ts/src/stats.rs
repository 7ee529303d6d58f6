//! Statistics over mapped series, restricted to a computation range.
//!
//! Every statistic evaluates a named or formula series into a flat array
//! per data version, projects it through [`filter_by_ranges`], then
//! reduces. Cross-version `min`, `max`, `avg` and `sum` combine the
//! per-version results; `median` pools all versions before sorting and
//! takes the lower-middle element on even lengths.

use std::cmp::Ordering;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;
use tsmap_core::{EquipmentKind, Formula, MappingConfig, MappingKey, MappingResult, PointRange};

use crate::calc::FormulaEvaluator;
use crate::computation_range::ComputationRange;
use crate::distribution::distribute;
use crate::store::{check_index_unicity, check_values, TimeSeriesIndex, TimeSeriesStore};

/// Keep the values covered by `ranges`, in index order.
///
/// Ranges may overlap and come unsorted. They are clamped to the array,
/// dropped if empty, sorted, merged (touching ranges included) and the
/// matching slices concatenated.
pub fn filter_by_ranges(values: &[f64], ranges: &[PointRange]) -> Vec<f64> {
    let len = values.len() as i64;
    let mut spans: Vec<(usize, usize)> = ranges
        .iter()
        .filter_map(|range| {
            let start = range.lower.max(0);
            let end = range.upper.saturating_add(1).min(len);
            (start < end).then_some((start as usize, end as usize))
        })
        .collect();
    if spans.is_empty() {
        return Vec::new();
    }
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let total = merged.iter().map(|(start, end)| end - start).sum();
    let mut out = Vec::with_capacity(total);
    for (start, end) in merged {
        out.extend_from_slice(&values[start..end]);
    }
    out
}

/// Series a statistic is computed on.
#[derive(Debug, Clone, Copy)]
pub enum StatTarget<'a> {
    Name(&'a str),
    Formula(&'a Formula),
}

impl<'a> From<&'a str> for StatTarget<'a> {
    fn from(name: &'a str) -> Self {
        StatTarget::Name(name)
    }
}

impl<'a> From<&'a Formula> for StatTarget<'a> {
    fn from(formula: &'a Formula) -> Self {
        StatTarget::Formula(formula)
    }
}

/// All statistics of one series at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub sum: f64,
    pub median: f64,
}

fn fold_or_nan(values: impl IntoIterator<Item = f64>, f: impl Fn(f64, f64) -> f64) -> f64 {
    values.into_iter().reduce(f).unwrap_or(f64::NAN)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Lower-middle element of the sorted values; NaN when empty.
///
/// On even lengths this is `sorted[(n - 1) / 2]`, not the upper-middle
/// `sorted[n / 2]` nor an interpolated mean.
pub fn lower_median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values[(values.len() - 1) / 2]
}

/// Statistics engine over a frozen mapping configuration.
pub struct MappingConfigStats<'a> {
    store: &'a dyn TimeSeriesStore,
    config: &'a MappingConfig,
    range: &'a ComputationRange,
    index: OnceCell<Option<TimeSeriesIndex>>,
}

impl<'a> MappingConfigStats<'a> {
    pub fn new(
        store: &'a dyn TimeSeriesStore,
        config: &'a MappingConfig,
        range: &'a ComputationRange,
    ) -> Self {
        Self {
            store,
            config,
            range,
            index: OnceCell::new(),
        }
    }

    /// Shared index of the series the mapping loads, checked on first use.
    pub fn index(&self) -> MappingResult<Option<TimeSeriesIndex>> {
        self.index
            .get_or_try_init(|| {
                let names = self.config.find_time_series_names_to_load();
                check_index_unicity(self.store, names.iter().map(String::as_str))
            })
            .copied()
    }

    pub fn config(&self) -> &'a MappingConfig {
        self.config
    }

    pub fn range(&self) -> &'a ComputationRange {
        self.range
    }

    /// Index consistency, then presence of every version for every series
    /// the mapping loads.
    pub fn check(&self) -> MappingResult<()> {
        self.index()?;
        let names = self.config.find_time_series_names_to_load();
        check_values(
            self.store,
            self.range.versions(),
            names.iter().map(String::as_str),
        )
    }

    /// Per-equipment share of `series` at one version, over the full index.
    pub fn distribute(
        &self,
        kind: EquipmentKind,
        series: &str,
        version: u32,
    ) -> MappingResult<Vec<(MappingKey, Vec<f64>)>> {
        distribute(self.config, &self.evaluator()?, kind, series, version)
    }

    pub fn evaluator(&self) -> MappingResult<FormulaEvaluator<'a>> {
        let evaluator = FormulaEvaluator::new(self.store).with_formulas(self.config.formulas());
        Ok(match self.index()? {
            Some(index) => evaluator.with_point_count(index.point_count),
            None => evaluator,
        })
    }

    /// Values of a series at one version, restricted to the range.
    pub fn values<'t>(&self, target: impl Into<StatTarget<'t>>, version: u32) -> MappingResult<Vec<f64>> {
        let evaluator = self.evaluator()?;
        let raw = match target.into() {
            StatTarget::Name(name) => evaluator.evaluate_name(name, version)?,
            StatTarget::Formula(formula) => evaluator.evaluate(formula, version)?,
        };
        Ok(filter_by_ranges(&raw, self.range.ranges()))
    }

    fn per_version<'t>(&self, target: StatTarget<'t>) -> MappingResult<Vec<Vec<f64>>> {
        self.range
            .versions()
            .iter()
            .map(|version| self.values(target, *version))
            .collect()
    }

    fn cross_version<'t>(
        &self,
        target: StatTarget<'t>,
        single: impl Fn(&[f64]) -> f64,
        combine: impl Fn(f64, f64) -> f64,
    ) -> MappingResult<f64> {
        let per_version: Vec<f64> = self
            .per_version(target)?
            .iter()
            .filter(|values| !values.is_empty())
            .map(|values| single(values))
            .collect();
        Ok(fold_or_nan(per_version, combine))
    }

    pub fn min<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<f64> {
        self.cross_version(
            target.into(),
            |values| fold_or_nan(values.iter().copied(), f64::min),
            f64::min,
        )
    }

    pub fn max<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<f64> {
        self.cross_version(
            target.into(),
            |values| fold_or_nan(values.iter().copied(), f64::max),
            f64::max,
        )
    }

    pub fn sum<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<f64> {
        self.cross_version(target.into(), |values| values.iter().sum(), |a, b| a + b)
    }

    /// Mean of the per-version averages.
    pub fn avg<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<f64> {
        let target = target.into();
        let averages: Vec<f64> = self
            .per_version(target)?
            .iter()
            .filter(|values| !values.is_empty())
            .map(|values| mean(values))
            .collect();
        Ok(mean(&averages))
    }

    /// Lower-middle element of all versions' values pooled together.
    pub fn median<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<f64> {
        let pooled: Vec<f64> = self.per_version(target.into())?.into_iter().flatten().collect();
        Ok(lower_median(pooled))
    }

    /// Every statistic from a single evaluation per version.
    pub fn summary<'t>(&self, target: impl Into<StatTarget<'t>>) -> MappingResult<SeriesSummary> {
        let per_version: Vec<Vec<f64>> = self
            .per_version(target.into())?
            .into_iter()
            .filter(|values| !values.is_empty())
            .collect();
        debug!(versions = per_version.len(), "summarizing series");

        let mins = per_version
            .iter()
            .map(|v| fold_or_nan(v.iter().copied(), f64::min));
        let maxs = per_version
            .iter()
            .map(|v| fold_or_nan(v.iter().copied(), f64::max));
        let sums = per_version.iter().map(|v| v.iter().sum::<f64>());
        let averages: Vec<f64> = per_version.iter().map(|v| mean(v)).collect();

        Ok(SeriesSummary {
            min: fold_or_nan(mins, f64::min),
            max: fold_or_nan(maxs, f64::max),
            avg: mean(&averages),
            sum: fold_or_nan(sums, |a, b| a + b),
            median: lower_median(per_version.into_iter().flatten().collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(lower: i64, upper: i64) -> PointRange {
        PointRange::closed(lower, upper)
    }

    #[test]
    fn filter_empty_inputs() {
        assert!(filter_by_ranges(&[], &[r(0, 2)]).is_empty());
        assert!(filter_by_ranges(&[1.0, 2.0, 3.0], &[]).is_empty());
    }

    #[test]
    fn filter_single_and_clamped_ranges() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(filter_by_ranges(&values, &[r(1, 2)]), [2.0, 3.0]);
        assert_eq!(filter_by_ranges(&values, &[r(-5, 1)]), [1.0, 2.0]);
        assert!(filter_by_ranges(&values, &[r(8, 10)]).is_empty());
        assert_eq!(filter_by_ranges(&values, &[r(4, 100)]), [5.0, 6.0]);
    }

    #[test]
    fn filter_disjoint_and_overlapping_ranges() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(filter_by_ranges(&values, &[r(0, 1), r(3, 4)]), [1.0, 2.0, 4.0, 5.0]);
        assert_eq!(filter_by_ranges(&values, &[r(3, 4), r(0, 1)]), [1.0, 2.0, 4.0, 5.0]);
        assert_eq!(
            filter_by_ranges(&values, &[r(1, 3), r(2, 5)]),
            [2.0, 3.0, 4.0, 5.0, 6.0]
        );
        // Adjacent ranges merge into one slice.
        assert_eq!(filter_by_ranges(&values, &[r(2, 3), r(0, 1)]), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn filter_is_idempotent_under_full_range() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let once = filter_by_ranges(&values, &[r(0, 1), r(4, 5)]);
        let full = r(0, once.len() as i64 - 1);
        assert_eq!(filter_by_ranges(&once, &[full]), once);
    }

    #[test]
    fn median_takes_lower_middle() {
        assert_eq!(lower_median(vec![4.0, 1.0, 3.0, 2.0]), 2.0);
        assert_eq!(lower_median(vec![5.0, 1.0, 3.0]), 3.0);
        assert!(lower_median(Vec::new()).is_nan());
    }
}

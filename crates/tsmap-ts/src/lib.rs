//! # tsmap-ts: store access, computation ranges and statistics
//!
//! - [`TimeSeriesStore`] - read-only store contract, with [`InMemoryTimeSeriesStore`]
//! - [`ComputationRange`] - versions and disjoint point intervals of a run
//! - [`FormulaEvaluator`] - point-wise evaluation of derived series
//! - [`MappingConfigStats`] - min/max/avg/sum/median restricted to a range
//! - [`apportion`] - distribution-key shares of a shared series

pub mod calc;
pub mod computation_range;
pub mod distribution;
pub mod stats;
pub mod store;

pub use calc::FormulaEvaluator;
pub use computation_range::{check_ranges, ComputationRange, DEFAULT_VERSION};
pub use distribution::{apportion, distribute, Weights};
pub use stats::{filter_by_ranges, lower_median, MappingConfigStats, SeriesSummary, StatTarget};
pub use store::{
    check_index_unicity, check_values, InMemoryTimeSeriesStore, TimeSeriesIndex, TimeSeriesStore,
};

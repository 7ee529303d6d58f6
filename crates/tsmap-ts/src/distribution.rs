//! Apportioning one time series across the equipment that share it.
//!
//! Each equipment receives `value * w_i / sum(w)`. Constant keys weigh as
//! given; series keys weigh by the absolute value at each point. A point
//! whose weights sum to zero falls back to uniform weights.

use tracing::warn;
use tsmap_core::{DistributionKey, EquipmentKind, MappingConfig, MappingError, MappingKey, MappingResult};

use crate::calc::FormulaEvaluator;

/// Weight of one equipment in a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Weights {
    Constant(f64),
    Points(Vec<f64>),
}

impl Weights {
    fn at(&self, point: usize) -> f64 {
        match self {
            Weights::Constant(w) => *w,
            Weights::Points(points) => points.get(point).map_or(0.0, |w| w.abs()),
        }
    }
}

/// Split `values` of series `name` across `weights`, one output array per
/// weight, in the same order.
pub fn apportion(name: &str, values: &[f64], weights: &[Weights]) -> MappingResult<Vec<Vec<f64>>> {
    let mut shares = vec![Vec::with_capacity(values.len()); weights.len()];
    let mut uniform_points = 0usize;
    for (point, value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(MappingError::InvalidValue {
                name: name.to_string(),
                point,
                value: *value,
            });
        }
        let point_weights: Vec<f64> = weights.iter().map(|w| w.at(point)).collect();
        let total: f64 = point_weights.iter().sum();
        for (share, weight) in shares.iter_mut().zip(&point_weights) {
            let ratio = if total == 0.0 {
                1.0 / weights.len() as f64
            } else {
                weight / total
            };
            share.push(value * ratio);
        }
        if total == 0.0 {
            uniform_points += 1;
        }
    }
    if uniform_points > 0 {
        warn!(
            name,
            points = uniform_points,
            "distribution keys sum to zero, using uniform weights"
        );
    }
    Ok(shares)
}

/// Shares of `series` for every key it feeds in category `kind`, sorted by
/// equipment id.
pub fn distribute(
    config: &MappingConfig,
    evaluator: &FormulaEvaluator<'_>,
    kind: EquipmentKind,
    series: &str,
    version: u32,
) -> MappingResult<Vec<(MappingKey, Vec<f64>)>> {
    let Some(keys) = config.category(kind).keys_for(series) else {
        return Ok(Vec::new());
    };
    let mut keys: Vec<MappingKey> = keys.iter().cloned().collect();
    keys.sort_by(|a, b| {
        (a.id(), a.variable().name()).cmp(&(b.id(), b.variable().name()))
    });

    let weights = keys
        .iter()
        .map(|key| match config.distribution_key(key) {
            DistributionKey::Number(w) => Ok(Weights::Constant(w)),
            DistributionKey::TimeSeries(name) => {
                Ok(Weights::Points(evaluator.evaluate_name(&name, version)?))
            }
        })
        .collect::<MappingResult<Vec<_>>>()?;

    let values = evaluator.evaluate_name(series, version)?;
    let shares = apportion(series, &values, &weights)?;
    Ok(keys.into_iter().zip(shares).collect())
}

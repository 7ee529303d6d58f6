//! Point-wise evaluation of derived series.
//!
//! Names resolve first against the mapping's formulas, then against
//! calculated series of the store, and finally to stored arrays.

use std::collections::BTreeMap;

use tracing::debug;
use tsmap_core::{Formula, MappingError, MappingResult};

use crate::store::TimeSeriesStore;

enum Evaluated {
    Scalar(f64),
    Points(Vec<f64>),
}

impl Evaluated {
    fn map(self, f: impl Fn(f64) -> f64) -> Evaluated {
        match self {
            Evaluated::Scalar(v) => Evaluated::Scalar(f(v)),
            Evaluated::Points(mut points) => {
                points.iter_mut().for_each(|p| *p = f(*p));
                Evaluated::Points(points)
            }
        }
    }
}

/// Evaluates formulas and named series at one data version.
#[derive(Clone, Copy)]
pub struct FormulaEvaluator<'a> {
    store: &'a dyn TimeSeriesStore,
    formulas: Option<&'a BTreeMap<String, Formula>>,
    point_count: Option<usize>,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(store: &'a dyn TimeSeriesStore) -> Self {
        Self {
            store,
            formulas: None,
            point_count: None,
        }
    }

    /// Named formulas that take precedence over the store.
    pub fn with_formulas(mut self, formulas: &'a BTreeMap<String, Formula>) -> Self {
        self.formulas = Some(formulas);
        self
    }

    /// Length a constant-only formula is broadcast to.
    pub fn with_point_count(mut self, point_count: usize) -> Self {
        self.point_count = Some(point_count);
        self
    }

    pub fn evaluate_name(&self, name: &str, version: u32) -> MappingResult<Vec<f64>> {
        let mut stack = Vec::new();
        let value = self.eval_name(name, version, &mut stack)?;
        Ok(self.materialize(value))
    }

    pub fn evaluate(&self, formula: &Formula, version: u32) -> MappingResult<Vec<f64>> {
        let mut stack = Vec::new();
        let value = self.eval(formula, version, &mut stack)?;
        Ok(self.materialize(value))
    }

    fn materialize(&self, value: Evaluated) -> Vec<f64> {
        match value {
            Evaluated::Points(points) => points,
            Evaluated::Scalar(v) => vec![v; self.point_count.unwrap_or(1)],
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Formula> {
        self.formulas
            .and_then(|formulas| formulas.get(name))
            .or_else(|| self.store.formula(name))
    }

    fn eval_name(
        &self,
        name: &str,
        version: u32,
        stack: &mut Vec<String>,
    ) -> MappingResult<Evaluated> {
        if stack.iter().any(|n| n == name) {
            return Err(MappingError::FormulaCycle(name.to_string()));
        }
        match self.lookup(name) {
            Some(formula) => {
                stack.push(name.to_string());
                let value = self.eval(formula, version, stack);
                stack.pop();
                value
            }
            None => {
                debug!(name, version, "materializing stored series");
                Ok(Evaluated::Points(self.store.values(name, version)?))
            }
        }
    }

    fn eval(
        &self,
        formula: &Formula,
        version: u32,
        stack: &mut Vec<String>,
    ) -> MappingResult<Evaluated> {
        match formula {
            Formula::Constant { value } => Ok(Evaluated::Scalar(*value)),
            Formula::Series { name } => self.eval_name(name, version, stack),
            Formula::Unary { op, operand } => {
                Ok(self.eval(operand, version, stack)?.map(|v| op.apply(v)))
            }
            Formula::Binary { op, left, right } => {
                let left = self.eval(left, version, stack)?;
                let right = self.eval(right, version, stack)?;
                match (left, right) {
                    (Evaluated::Scalar(a), Evaluated::Scalar(b)) => {
                        Ok(Evaluated::Scalar(op.apply(a, b)))
                    }
                    (Evaluated::Scalar(a), points @ Evaluated::Points(_)) => {
                        Ok(points.map(|b| op.apply(a, b)))
                    }
                    (points @ Evaluated::Points(_), Evaluated::Scalar(b)) => {
                        Ok(points.map(|a| op.apply(a, b)))
                    }
                    (Evaluated::Points(a), Evaluated::Points(b)) => {
                        if a.len() != b.len() {
                            return Err(MappingError::InconsistentIndex(format!(
                                "cannot combine {} and {} points in {formula}",
                                a.len(),
                                b.len()
                            )));
                        }
                        Ok(Evaluated::Points(
                            a.into_iter().zip(b).map(|(x, y)| op.apply(x, y)).collect(),
                        ))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTimeSeriesStore, TimeSeriesIndex};
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> InMemoryTimeSeriesStore {
        let index = TimeSeriesIndex::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Duration::minutes(30),
            3,
        );
        let mut store = InMemoryTimeSeriesStore::new();
        store.insert("a", index, 1, vec![1.0, -2.0, 3.0]).unwrap();
        store.insert("b", index, 1, vec![10.0, 20.0, 30.0]).unwrap();
        store.insert_formula("stored_sum", Formula::series("a") + Formula::series("b"));
        store
    }

    #[test]
    fn evaluates_point_wise() {
        let store = store();
        let eval = FormulaEvaluator::new(&store);
        let f = Formula::series("a").abs() * 2.0 + Formula::series("b");
        assert_eq!(eval.evaluate(&f, 1).unwrap(), [12.0, 24.0, 36.0]);
        assert_eq!(eval.evaluate_name("stored_sum", 1).unwrap(), [11.0, 18.0, 33.0]);
    }

    #[test]
    fn mapping_formulas_take_precedence() {
        let store = store();
        let mut formulas = BTreeMap::new();
        formulas.insert("stored_sum".to_string(), Formula::series("a") - Formula::series("b"));
        let eval = FormulaEvaluator::new(&store).with_formulas(&formulas);
        assert_eq!(eval.evaluate_name("stored_sum", 1).unwrap(), [-9.0, -22.0, -27.0]);
    }

    #[test]
    fn constants_broadcast_to_point_count() {
        let store = store();
        let eval = FormulaEvaluator::new(&store).with_point_count(3);
        let f = Formula::constant(2.0) * 3.0;
        assert_eq!(eval.evaluate(&f, 1).unwrap(), [6.0, 6.0, 6.0]);
    }

    #[test]
    fn detects_cycles_and_missing_data() {
        let store = store();
        let mut formulas = BTreeMap::new();
        formulas.insert("x".to_string(), Formula::series("y") + 1.0);
        formulas.insert("y".to_string(), Formula::series("x"));
        let eval = FormulaEvaluator::new(&store).with_formulas(&formulas);
        assert!(matches!(
            eval.evaluate_name("x", 1),
            Err(MappingError::FormulaCycle(_))
        ));
        assert!(eval.evaluate_name("a", 2).is_err());
        assert!(eval.evaluate_name("zzz", 1).is_err());
    }
}

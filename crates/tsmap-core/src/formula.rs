//! Expression trees for derived time series.
//!
//! A [`Formula`] combines constants and named series point by point. The
//! core stores formulas and checks them for cycles; evaluation against a
//! store lives with the store.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Neg,
    Abs,
}

impl UnaryOp {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnaryOp::Neg => -value,
            UnaryOp::Abs => value.abs(),
        }
    }
}

/// Point-wise binary operator. Comparisons yield 1.0 or 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl BinaryOp {
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
            BinaryOp::Min => left.min(right),
            BinaryOp::Max => left.max(right),
            BinaryOp::Gt => truth(left > right),
            BinaryOp::Ge => truth(left >= right),
            BinaryOp::Lt => truth(left < right),
            BinaryOp::Le => truth(left <= right),
            BinaryOp::Eq => truth(left == right),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
        }
    }
}

/// Derived time-series expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Formula {
    Constant {
        value: f64,
    },
    /// Reference to a stored series or another named formula
    Series {
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Formula>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Formula>,
        right: Box<Formula>,
    },
}

impl Formula {
    pub fn constant(value: f64) -> Self {
        Formula::Constant { value }
    }

    pub fn series(name: impl Into<String>) -> Self {
        Formula::Series { name: name.into() }
    }

    pub fn binary(op: BinaryOp, left: Formula, right: Formula) -> Self {
        Formula::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn abs(self) -> Self {
        Formula::Unary {
            op: UnaryOp::Abs,
            operand: Box::new(self),
        }
    }

    pub fn min(self, other: Formula) -> Self {
        Self::binary(BinaryOp::Min, self, other)
    }

    pub fn max(self, other: Formula) -> Self {
        Self::binary(BinaryOp::Max, self, other)
    }

    /// Names referenced directly by this expression.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_dependencies(&mut names);
        names
    }

    fn collect_dependencies(&self, names: &mut BTreeSet<String>) {
        match self {
            Formula::Constant { .. } => {}
            Formula::Series { name } => {
                names.insert(name.clone());
            }
            Formula::Unary { operand, .. } => operand.collect_dependencies(names),
            Formula::Binary { left, right, .. } => {
                left.collect_dependencies(names);
                right.collect_dependencies(names);
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Constant { value } => write!(f, "{value}"),
            Formula::Series { name } => write!(f, "'{name}'"),
            Formula::Unary { op: UnaryOp::Neg, operand } => write!(f, "-({operand})"),
            Formula::Unary { op: UnaryOp::Abs, operand } => write!(f, "abs({operand})"),
            Formula::Binary { op, left, right } => match op {
                BinaryOp::Min | BinaryOp::Max => write!(f, "{}({left}, {right})", op.symbol()),
                _ => write!(f, "({left} {} {right})", op.symbol()),
            },
        }
    }
}

macro_rules! impl_formula_ops {
    ($($trait:ident, $method:ident => $op:expr);+ $(;)?) => {
        $(
            impl $trait for Formula {
                type Output = Formula;
                fn $method(self, rhs: Formula) -> Formula {
                    Formula::binary($op, self, rhs)
                }
            }

            impl $trait<f64> for Formula {
                type Output = Formula;
                fn $method(self, rhs: f64) -> Formula {
                    Formula::binary($op, self, Formula::constant(rhs))
                }
            }
        )+
    };
}

impl_formula_ops! {
    Add, add => BinaryOp::Add;
    Sub, sub => BinaryOp::Sub;
    Mul, mul => BinaryOp::Mul;
    Div, div => BinaryOp::Div;
}

impl Neg for Formula {
    type Output = Formula;
    fn neg(self) -> Formula {
        Formula::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(self),
        }
    }
}

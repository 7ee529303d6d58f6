//! Unified error type for the mapping core.
//!
//! [`MappingError`] covers configuration problems (variable providers,
//! malformed keys or documents) and consistency problems (contradictory
//! bindings, overlapping ranges, inconsistent indexes). Degenerate query
//! inputs never produce an error; they resolve to fallback values at the
//! call site.
//!
//! # Example
//!
//! ```
//! use tsmap_core::{MappingError, MappingResult};
//!
//! fn positive(lower: i64, upper: i64) -> MappingResult<()> {
//!     if lower < 0 {
//!         return Err(MappingError::MalformedRange { lower, upper });
//!     }
//!     Ok(())
//! }
//!
//! assert!(positive(-1, 3).is_err());
//! ```

use thiserror::Error;

/// Error type for all mapping operations.
#[derive(Error, Debug)]
pub enum MappingError {
    /// Malformed structured document
    #[error("Parse error: {0}")]
    Parse(String),

    /// No provider, or more than one, claims a variable family
    #[error("ambiguous or missing variable provider for field name '{0}'")]
    VariableProvider(String),

    /// A provider was found but does not know the variable name
    #[error("unknown variable '{name}' for field name '{family}'")]
    InvalidVariable { family: String, name: String },

    /// A mapping key could not be built from its parts
    #[error("malformed mapping key: {0}")]
    MalformedKey(String),

    /// Variable not applicable to the equipment category
    #[error("variable '{variable}' is not compatible with {kind} equipment")]
    IncompatibleVariable { kind: String, variable: String },

    /// Equipment bound on an aggregate variable and on one of its detailed components
    #[error("contradictory mapping for '{id}': mapped on '{existing}' and on '{requested}'")]
    ContradictoryMapping {
        id: String,
        existing: String,
        requested: String,
    },

    /// Equipment declared unmapped (and ignored) while owning a binding
    #[error("Equipment '{id}' is declared unmapped but mapped on time series '{time_series}'")]
    UnmappedContradiction { id: String, time_series: String },

    /// Forward and reverse indexes disagree
    #[error("mapping index integrity violated: {0}")]
    Integrity(String),

    /// Two point ranges are connected
    #[error("{first} overlaps with range {second}")]
    RangesOverlap { first: String, second: String },

    /// Negative lower bound or upper bound before lower bound
    #[error("malformed range [{lower}..{upper}]: bounds must satisfy 0 <= lower <= upper")]
    MalformedRange { lower: i64, upper: i64 },

    /// Chunk size below one
    #[error("Chunk size ({0}) has to be greater or equals to one")]
    InvalidChunkSize(i64),

    /// Series involved in one run disagree on index shape
    #[error("Time series involved in the mapping must have the same index: {0}")]
    InconsistentIndex(String),

    /// The store has no index to derive a default range from
    #[error("no time series index available: {0}")]
    MissingIndex(String),

    /// Named series absent from the store
    #[error("unknown time series '{0}'")]
    UnknownTimeSeries(String),

    /// Some requested versions are missing for a series
    #[error("The time series store does not contain values for ts {name} and version(s) {versions:?}")]
    MissingVersions { name: String, versions: Vec<u32> },

    /// Identifier unknown to the equipment catalog
    #[error("unknown {kind} equipment '{id}'")]
    UnknownEquipment { kind: String, id: String },

    /// Formula definitions reference themselves
    #[error("cyclic formula definition involving '{0}'")]
    FormulaCycle(String),

    /// Value that cannot be apportioned or evaluated
    #[error("Impossible to scale down {value} of ts {name} at point {point}")]
    InvalidValue { name: String, point: usize, value: f64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using MappingError.
pub type MappingResult<T> = Result<T, MappingError>;

impl From<serde_json::Error> for MappingError {
    fn from(err: serde_json::Error) -> Self {
        MappingError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MappingError::ContradictoryMapping {
            id: "LOAD_1".into(),
            existing: "p0".into(),
            requested: "fixedActivePower".into(),
        };
        let text = err.to_string();
        assert!(text.contains("LOAD_1"));
        assert!(text.contains("p0"));
        assert!(text.contains("fixedActivePower"));
    }

    #[test]
    fn test_range_errors_name_bounds() {
        let err = MappingError::MalformedRange { lower: -1, upper: 4 };
        assert!(err.to_string().contains("-1"));
        assert!(err.to_string().contains('4'));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MappingError = json_err.into();
        assert!(matches!(err, MappingError::Parse(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> MappingResult<()> {
            Err(MappingError::VariableProvider("foo".into()))
        }

        fn outer() -> MappingResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}

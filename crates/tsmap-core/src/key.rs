//! Mapping keys and distribution keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};
use crate::variable::{EquipmentVariable, MappingVariable};

/// Immutable `(variable, equipment id)` pair; the atomic unit of mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingKey {
    mapping_variable: MappingVariable,
    id: String,
}

impl MappingKey {
    /// Build a key. Empty ids and empty extension names are rejected.
    pub fn new(variable: impl Into<MappingVariable>, id: impl Into<String>) -> MappingResult<Self> {
        let variable = variable.into();
        let id = id.into();
        if id.trim().is_empty() {
            return Err(MappingError::MalformedKey(format!(
                "equipment id is empty for variable '{variable}'"
            )));
        }
        if let MappingVariable::Extension { family, name } = &variable {
            if family.is_empty() || name.is_empty() {
                return Err(MappingError::MalformedKey(format!(
                    "variable of '{id}' has an empty family or name"
                )));
            }
        }
        Ok(Self {
            mapping_variable: variable,
            id,
        })
    }

    pub fn variable(&self) -> &MappingVariable {
        &self.mapping_variable
    }

    pub fn equipment_variable(&self) -> Option<EquipmentVariable> {
        self.mapping_variable.as_equipment()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordering used for deterministic output only.
    pub(crate) fn sort_key(&self) -> (&str, &str, &str) {
        (
            &self.id,
            self.mapping_variable.family(),
            self.mapping_variable.name(),
        )
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.mapping_variable)
    }
}

/// Weight used to split one time series across the equipment sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DistributionKey {
    /// Constant, non-negative weight
    #[serde(rename = "number")]
    Number(f64),
    /// Weight read point by point from a time series
    #[serde(rename = "timeseries")]
    TimeSeries(String),
}

impl DistributionKey {
    /// Weight applied when no key is supplied.
    pub const UNIFORM_WEIGHT: f64 = 1.0;

    pub fn uniform() -> Self {
        DistributionKey::Number(Self::UNIFORM_WEIGHT)
    }

    /// Constant weight; must be finite and non-negative.
    pub fn number(weight: f64) -> MappingResult<Self> {
        let key = DistributionKey::Number(weight);
        key.validate()?;
        Ok(key)
    }

    /// Constant weights must be finite and non-negative, weight series named.
    pub fn validate(&self) -> MappingResult<()> {
        match self {
            DistributionKey::Number(weight) if !weight.is_finite() || *weight < 0.0 => {
                Err(MappingError::Config(format!(
                    "distribution weight must be a non-negative number, got {weight}"
                )))
            }
            DistributionKey::TimeSeries(name) if name.is_empty() => Err(MappingError::Config(
                "distribution weight series has an empty name".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn time_series(name: impl Into<String>) -> Self {
        DistributionKey::TimeSeries(name.into())
    }

    /// Name of the weight series, if any.
    pub fn series_name(&self) -> Option<&str> {
        match self {
            DistributionKey::Number(_) => None,
            DistributionKey::TimeSeries(name) => Some(name),
        }
    }
}

impl Default for DistributionKey {
    fn default() -> Self {
        Self::uniform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_compare_structurally() {
        let a = MappingKey::new(EquipmentVariable::TargetP, "GEN_1").unwrap();
        let b = MappingKey::new(EquipmentVariable::TargetP, "GEN_1").unwrap();
        let c = MappingKey::new(EquipmentVariable::MaxP, "GEN_1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert!(matches!(
            MappingKey::new(EquipmentVariable::P0, ""),
            Err(MappingError::MalformedKey(_))
        ));
        let ext = MappingVariable::Extension {
            family: "storage".into(),
            name: String::new(),
        };
        assert!(MappingKey::new(ext, "BAT_1").is_err());
    }

    #[test]
    fn key_json_shape() {
        let key = MappingKey::new(EquipmentVariable::TargetP, "GEN_1").unwrap();
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            r#"{"mappingVariable":{"equipment":"targetP"},"id":"GEN_1"}"#
        );
        assert_eq!(key.to_string(), "GEN_1:targetP");
    }

    #[test]
    fn distribution_key_json_shape() {
        assert_eq!(
            serde_json::to_string(&DistributionKey::uniform()).unwrap(),
            r#"{"number":1.0}"#
        );
        let key: DistributionKey = serde_json::from_str(r#"{"timeseries":"w"}"#).unwrap();
        assert_eq!(key, DistributionKey::time_series("w"));
        assert_eq!(key.series_name(), Some("w"));
    }

    #[test]
    fn negative_weight_rejected() {
        assert!(DistributionKey::number(-0.5).is_err());
        assert!(DistributionKey::number(f64::NAN).is_err());
        assert_eq!(DistributionKey::number(2.0).unwrap(), DistributionKey::Number(2.0));
        assert!(DistributionKey::Number(f64::INFINITY).validate().is_err());
        assert!(DistributionKey::time_series("").validate().is_err());
        assert!(DistributionKey::Number(0.0).validate().is_ok());
    }
}

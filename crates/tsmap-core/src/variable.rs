//! Variable identity: which physical quantity a time series drives.
//!
//! Built-in quantities form the closed [`EquipmentVariable`] enum, with a
//! compatibility table per [`EquipmentKind`]. Open-ended families go
//! through a [`VariableRegistry`] of [`VariableProvider`]s keyed by field
//! name. The registry is constructed explicitly and passed to whatever
//! needs to resolve serialized variables; there is no process-wide state.

use std::collections::BTreeSet;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::equipment::EquipmentKind;
use crate::error::{MappingError, MappingResult};

/// Field name of the built-in variable family.
pub const EQUIPMENT_FAMILY: &str = "equipment";

macro_rules! equipment_variables {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Built-in equipment variable.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EquipmentVariable {
            $($variant),+
        }

        impl EquipmentVariable {
            pub const ALL: &'static [EquipmentVariable] = &[$(EquipmentVariable::$variant),+];

            /// Stable textual name, used as serialization key.
            pub fn name(&self) -> &'static str {
                match self {
                    $(EquipmentVariable::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EquipmentVariable::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

equipment_variables! {
    TargetP => "targetP",
    TargetQ => "targetQ",
    MinP => "minP",
    MaxP => "maxP",
    P0 => "p0",
    Q0 => "q0",
    FixedActivePower => "fixedActivePower",
    VariableActivePower => "variableActivePower",
    FixedReactivePower => "fixedReactivePower",
    VariableReactivePower => "variableReactivePower",
    ActivePowerSetpoint => "activePowerSetpoint",
    Open => "open",
    PhaseTapPosition => "phaseTapPosition",
    RatioTapPosition => "ratioTapPosition",
    VoltageRegulatorOn => "voltageRegulatorOn",
    TargetV => "targetV",
    NominalV => "nominalV",
    RegulationMode => "regulationMode",
    RatedU1 => "ratedU1",
    RatedU2 => "ratedU2",
    LoadTapChangingCapabilities => "loadTapChangingCapabilities",
    PhaseRegulating => "phaseRegulating",
    RatioRegulating => "ratioRegulating",
    VoltageSetpoint => "voltageSetpoint",
    ReactivePowerSetpoint => "reactivePowerSetpoint",
    PowerFactor => "powerFactor",
    Disconnected => "disconnected",
    TargetDeadband => "targetDeadband",
}

impl EquipmentVariable {
    /// Variables a category accepts.
    pub fn compatible_with(kind: EquipmentKind) -> &'static [EquipmentVariable] {
        use EquipmentVariable::*;
        match kind {
            EquipmentKind::Generator => &[
                TargetP,
                TargetQ,
                MinP,
                MaxP,
                VoltageRegulatorOn,
                TargetV,
                Disconnected,
            ],
            EquipmentKind::HvdcLine => &[ActivePowerSetpoint, MinP, MaxP, NominalV],
            EquipmentKind::Load => &[
                P0,
                Q0,
                FixedActivePower,
                VariableActivePower,
                FixedReactivePower,
                VariableReactivePower,
            ],
            EquipmentKind::DanglingLine => &[P0],
            EquipmentKind::Breaker => &[Open],
            EquipmentKind::PhaseTapChanger => &[
                PhaseTapPosition,
                PhaseRegulating,
                RegulationMode,
                TargetDeadband,
            ],
            EquipmentKind::Transformer => &[RatedU1, RatedU2, Disconnected],
            EquipmentKind::RatioTapChanger => &[
                RatioTapPosition,
                LoadTapChangingCapabilities,
                RatioRegulating,
                TargetV,
            ],
            EquipmentKind::LccConverterStation => &[PowerFactor],
            EquipmentKind::VscConverterStation => {
                &[VoltageRegulatorOn, VoltageSetpoint, ReactivePowerSetpoint]
            }
            EquipmentKind::Line => &[Disconnected],
        }
    }

    pub fn is_compatible(&self, kind: EquipmentKind) -> bool {
        Self::compatible_with(kind).contains(self)
    }

    /// Variable a category is mapped on when a rule names none.
    pub fn default_for(kind: EquipmentKind) -> Option<Self> {
        use EquipmentVariable::*;
        match kind {
            EquipmentKind::Generator => Some(TargetP),
            EquipmentKind::HvdcLine => Some(ActivePowerSetpoint),
            EquipmentKind::Load | EquipmentKind::DanglingLine => Some(P0),
            EquipmentKind::Breaker => Some(Open),
            EquipmentKind::PhaseTapChanger => Some(PhaseTapPosition),
            EquipmentKind::RatioTapChanger => Some(RatioTapPosition),
            EquipmentKind::LccConverterStation => Some(PowerFactor),
            EquipmentKind::VscConverterStation => Some(VoltageSetpoint),
            EquipmentKind::Transformer | EquipmentKind::Line => None,
        }
    }

    /// Variables declared for a key when the declaration names none.
    pub fn default_set(kind: EquipmentKind) -> Vec<Self> {
        match kind {
            EquipmentKind::Load => vec![
                EquipmentVariable::P0,
                EquipmentVariable::FixedActivePower,
                EquipmentVariable::VariableActivePower,
            ],
            other => Self::default_for(other).into_iter().collect(),
        }
    }

    /// Binding a primary variable makes the equipment count as mapped.
    pub fn is_primary(&self, kind: EquipmentKind) -> bool {
        use EquipmentVariable::*;
        match kind {
            EquipmentKind::Load => matches!(self, P0 | FixedActivePower | VariableActivePower),
            other => Self::default_for(other) == Some(*self),
        }
    }

    /// Aggregate variable this detailed component decomposes.
    pub fn aggregate(&self) -> Option<Self> {
        use EquipmentVariable::*;
        match self {
            FixedActivePower | VariableActivePower => Some(P0),
            FixedReactivePower | VariableReactivePower => Some(Q0),
            _ => None,
        }
    }

    /// Detailed components of an aggregate variable.
    pub fn components(&self) -> &'static [Self] {
        use EquipmentVariable::*;
        match self {
            P0 => &[FixedActivePower, VariableActivePower],
            Q0 => &[FixedReactivePower, VariableReactivePower],
            _ => &[],
        }
    }
}

impl fmt::Display for EquipmentVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any variable a time series can be mapped on.
///
/// Compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingVariable {
    Equipment(EquipmentVariable),
    /// Variable contributed by a registered provider.
    Extension { family: String, name: String },
}

impl MappingVariable {
    pub fn family(&self) -> &str {
        match self {
            MappingVariable::Equipment(_) => EQUIPMENT_FAMILY,
            MappingVariable::Extension { family, .. } => family,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MappingVariable::Equipment(variable) => variable.name(),
            MappingVariable::Extension { name, .. } => name,
        }
    }

    pub fn as_equipment(&self) -> Option<EquipmentVariable> {
        match self {
            MappingVariable::Equipment(variable) => Some(*variable),
            MappingVariable::Extension { .. } => None,
        }
    }

    /// Extension variables are accepted by every category; their providers
    /// own their semantics.
    pub fn is_compatible(&self, kind: EquipmentKind) -> bool {
        match self {
            MappingVariable::Equipment(variable) => variable.is_compatible(kind),
            MappingVariable::Extension { .. } => true,
        }
    }
}

impl From<EquipmentVariable> for MappingVariable {
    fn from(variable: EquipmentVariable) -> Self {
        MappingVariable::Equipment(variable)
    }
}

impl fmt::Display for MappingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingVariable::Equipment(variable) => f.write_str(variable.name()),
            MappingVariable::Extension { family, name } => write!(f, "{family}.{name}"),
        }
    }
}

/// Serialized as a one-field object `{ "<family>": "<name>" }`.
impl Serialize for MappingVariable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.family(), self.name())?;
        map.end()
    }
}

// ============================================================================
// Provider registry
// ============================================================================

/// Source of variables for one serialized field name.
pub trait VariableProvider: Send + Sync {
    /// Field name claimed by this provider.
    fn field_name(&self) -> &str;

    /// Resolve a variable name, `None` if unknown to this provider.
    fn variable(&self, name: &str) -> Option<MappingVariable>;
}

/// Provider for the built-in [`EquipmentVariable`] family.
#[derive(Debug, Default, Clone, Copy)]
pub struct EquipmentVariableProvider;

impl VariableProvider for EquipmentVariableProvider {
    fn field_name(&self) -> &str {
        EQUIPMENT_FAMILY
    }

    fn variable(&self, name: &str) -> Option<MappingVariable> {
        EquipmentVariable::from_name(name).map(MappingVariable::Equipment)
    }
}

/// Provider for a fixed set of extension variable names.
#[derive(Debug, Clone)]
pub struct NamedVariableProvider {
    family: String,
    names: BTreeSet<String>,
}

impl NamedVariableProvider {
    pub fn new<I, S>(family: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            family: family.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl VariableProvider for NamedVariableProvider {
    fn field_name(&self) -> &str {
        &self.family
    }

    fn variable(&self, name: &str) -> Option<MappingVariable> {
        self.names.contains(name).then(|| MappingVariable::Extension {
            family: self.family.clone(),
            name: name.to_string(),
        })
    }
}

/// Registry of variable providers, one per field name.
pub struct VariableRegistry {
    providers: Vec<Box<dyn VariableProvider>>,
}

impl VariableRegistry {
    /// Registry with no provider at all.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Registry with the built-in equipment family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.providers.push(Box::new(EquipmentVariableProvider));
        registry
    }

    /// Add a provider. Fails if its field name is already claimed.
    pub fn register(&mut self, provider: Box<dyn VariableProvider>) -> MappingResult<()> {
        let field = provider.field_name().to_string();
        if field.is_empty() || self.providers.iter().any(|p| p.field_name() == field) {
            return Err(MappingError::VariableProvider(field));
        }
        debug!(field = %field, "registered variable provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Field names currently claimed, in registration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.field_name()).collect()
    }

    /// Resolve a serialized `(field name, variable name)` pair.
    pub fn resolve(&self, field: &str, name: &str) -> MappingResult<MappingVariable> {
        let mut matching = self.providers.iter().filter(|p| p.field_name() == field);
        let provider = match (matching.next(), matching.next()) {
            (Some(provider), None) => provider,
            _ => return Err(MappingError::VariableProvider(field.to_string())),
        };
        provider
            .variable(name)
            .ok_or_else(|| MappingError::InvalidVariable {
                family: field.to_string(),
                name: name.to_string(),
            })
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableRegistry")
            .field("providers", &self.field_names())
            .finish()
    }
}

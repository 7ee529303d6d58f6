//! Equipment categories, connectivity status and the catalog used to
//! validate identifiers.
//!
//! Each [`EquipmentKind`] owns a fixed set of document field names. The
//! strings are part of the persisted format: a new category reserves new
//! names and never reuses existing ones.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Equipment category a mapping key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EquipmentKind {
    Generator,
    Load,
    DanglingLine,
    HvdcLine,
    PhaseTapChanger,
    Breaker,
    Transformer,
    Line,
    RatioTapChanger,
    LccConverterStation,
    VscConverterStation,
}

/// Document field names reserved by one equipment category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFields {
    /// time-series name -> mapping keys
    pub forward: String,
    /// mapping key -> time-series names
    pub reverse: String,
    /// keys with a declared time series
    pub declared: String,
    pub unmapped: String,
    pub ignored_unmapped: String,
    pub disconnected: String,
    pub out_of_main_cc: String,
}

static CATEGORY_FIELDS: Lazy<HashMap<EquipmentKind, CategoryFields>> = Lazy::new(|| {
    EquipmentKind::ALL
        .iter()
        .map(|kind| {
            let plural = kind.plural();
            let singular = kind.singular();
            let fields = CategoryFields {
                forward: format!("timeSeriesTo{plural}Mapping"),
                reverse: format!("{singular}ToTimeSeriesMapping"),
                declared: format!("{singular}TimeSeries"),
                unmapped: format!("unmapped{plural}"),
                ignored_unmapped: format!("ignoredUnmapped{plural}"),
                disconnected: format!("disconnected{plural}"),
                out_of_main_cc: format!("outOfMainCc{plural}"),
            };
            (*kind, fields)
        })
        .collect()
});

impl EquipmentKind {
    /// Every category, in document order.
    pub const ALL: [EquipmentKind; 11] = [
        EquipmentKind::Generator,
        EquipmentKind::Load,
        EquipmentKind::DanglingLine,
        EquipmentKind::HvdcLine,
        EquipmentKind::PhaseTapChanger,
        EquipmentKind::Breaker,
        EquipmentKind::Transformer,
        EquipmentKind::Line,
        EquipmentKind::RatioTapChanger,
        EquipmentKind::LccConverterStation,
        EquipmentKind::VscConverterStation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Generator => "generator",
            EquipmentKind::Load => "load",
            EquipmentKind::DanglingLine => "dangling line",
            EquipmentKind::HvdcLine => "HVDC line",
            EquipmentKind::PhaseTapChanger => "phase tap changer",
            EquipmentKind::Breaker => "breaker",
            EquipmentKind::Transformer => "transformer",
            EquipmentKind::Line => "line",
            EquipmentKind::RatioTapChanger => "ratio tap changer",
            EquipmentKind::LccConverterStation => "LCC converter station",
            EquipmentKind::VscConverterStation => "VSC converter station",
        }
    }

    fn singular(&self) -> &'static str {
        match self {
            EquipmentKind::Generator => "generator",
            EquipmentKind::Load => "load",
            EquipmentKind::DanglingLine => "danglingLine",
            EquipmentKind::HvdcLine => "hvdcLine",
            EquipmentKind::PhaseTapChanger => "phaseTapChanger",
            EquipmentKind::Breaker => "breaker",
            EquipmentKind::Transformer => "transformer",
            EquipmentKind::Line => "line",
            EquipmentKind::RatioTapChanger => "ratioTapChanger",
            EquipmentKind::LccConverterStation => "lccConverterStation",
            EquipmentKind::VscConverterStation => "vscConverterStation",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            EquipmentKind::Generator => "Generators",
            EquipmentKind::Load => "Loads",
            EquipmentKind::DanglingLine => "DanglingLines",
            EquipmentKind::HvdcLine => "HvdcLines",
            EquipmentKind::PhaseTapChanger => "PhaseTapChangers",
            EquipmentKind::Breaker => "Breakers",
            EquipmentKind::Transformer => "Transformers",
            EquipmentKind::Line => "Lines",
            EquipmentKind::RatioTapChanger => "RatioTapChangers",
            EquipmentKind::LccConverterStation => "LccConverterStations",
            EquipmentKind::VscConverterStation => "VscConverterStations",
        }
    }

    /// Fixed document field names for this category.
    pub fn fields(&self) -> &'static CategoryFields {
        // The table is built from ALL, so every kind has an entry.
        &CATEGORY_FIELDS[self]
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity of a piece of equipment in the network model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    /// Connected to the main synchronous component
    MainComponent,
    /// Connected, but outside the main component
    OutOfMainComponent,
    Disconnected,
}

/// Read-only view of the network equipment, used to validate identifiers
/// and to seed completeness sets.
pub trait EquipmentCatalog {
    /// All equipment of one category with its status.
    fn equipment(&self, kind: EquipmentKind) -> Vec<(String, EquipmentStatus)>;

    fn contains(&self, kind: EquipmentKind, id: &str) -> bool {
        self.equipment(kind).iter().any(|(known, _)| known == id)
    }
}

/// Catalog backed by in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: BTreeMap<EquipmentKind, BTreeMap<String, EquipmentStatus>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register equipment connected to the main component.
    pub fn add(&mut self, kind: EquipmentKind, id: impl Into<String>) -> &mut Self {
        self.add_with_status(kind, id, EquipmentStatus::MainComponent)
    }

    pub fn add_with_status(
        &mut self,
        kind: EquipmentKind,
        id: impl Into<String>,
        status: EquipmentStatus,
    ) -> &mut Self {
        self.items.entry(kind).or_default().insert(id.into(), status);
        self
    }

    pub fn len(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EquipmentCatalog for InMemoryCatalog {
    fn equipment(&self, kind: EquipmentKind) -> Vec<(String, EquipmentStatus)> {
        self.items
            .get(&kind)
            .map(|items| {
                items
                    .iter()
                    .map(|(id, status)| (id.clone(), *status))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn contains(&self, kind: EquipmentKind, id: &str) -> bool {
        self.items
            .get(&kind)
            .is_some_and(|items| items.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_names_are_fixed() {
        let fields = EquipmentKind::Generator.fields();
        assert_eq!(fields.forward, "timeSeriesToGeneratorsMapping");
        assert_eq!(fields.reverse, "generatorToTimeSeriesMapping");
        assert_eq!(fields.declared, "generatorTimeSeries");
        assert_eq!(fields.unmapped, "unmappedGenerators");

        let fields = EquipmentKind::LccConverterStation.fields();
        assert_eq!(fields.forward, "timeSeriesToLccConverterStationsMapping");
        assert_eq!(fields.ignored_unmapped, "ignoredUnmappedLccConverterStations");
    }

    #[test]
    fn field_names_never_collide() {
        let mut seen = HashSet::new();
        for kind in EquipmentKind::ALL {
            let f = kind.fields();
            for name in [
                &f.forward,
                &f.reverse,
                &f.declared,
                &f.unmapped,
                &f.ignored_unmapped,
                &f.disconnected,
                &f.out_of_main_cc,
            ] {
                assert!(seen.insert(name.clone()), "duplicate field {name}");
            }
        }
    }

    #[test]
    fn catalog_lookup() {
        let mut catalog = InMemoryCatalog::new();
        catalog
            .add(EquipmentKind::Generator, "GEN_1")
            .add_with_status(EquipmentKind::Load, "LOAD_1", EquipmentStatus::Disconnected);

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains(EquipmentKind::Generator, "GEN_1"));
        assert!(!catalog.contains(EquipmentKind::Load, "GEN_1"));
        assert_eq!(
            catalog.equipment(EquipmentKind::Load),
            vec![("LOAD_1".to_string(), EquipmentStatus::Disconnected)]
        );
        assert!(catalog.equipment(EquipmentKind::Line).is_empty());
    }
}

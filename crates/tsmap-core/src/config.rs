//! The mapping configuration: a bidirectional index between time-series
//! names and mapping keys, kept per equipment category.
//!
//! The forward (`series -> keys`) and reverse (`key -> series`) directions
//! are owned together by [`CategoryIndex`] and only change through
//! [`MappingConfig::bind`], so a key sits in `forward[s]` exactly when `s`
//! sits in `reverse[key]`.
//!
//! A configuration is built single-threaded by the rule resolution phase,
//! then frozen and shared read-only with checkers and statistics.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::equipment::{EquipmentCatalog, EquipmentKind, EquipmentStatus};
use crate::error::{MappingError, MappingResult};
use crate::formula::Formula;
use crate::key::{DistributionKey, MappingKey};
use crate::variable::{EquipmentVariable, MappingVariable};

/// Index and completeness sets of one equipment category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryIndex {
    pub(crate) forward: BTreeMap<String, HashSet<MappingKey>>,
    pub(crate) reverse: HashMap<MappingKey, Vec<String>>,
    pub(crate) declared: HashSet<MappingKey>,
    pub(crate) unmapped: BTreeSet<String>,
    pub(crate) ignored_unmapped: BTreeSet<String>,
    pub(crate) disconnected: BTreeSet<String>,
    pub(crate) out_of_main_cc: BTreeSet<String>,
}

impl CategoryIndex {
    /// Keys fed by a time series.
    pub fn keys_for(&self, series: &str) -> Option<&HashSet<MappingKey>> {
        self.forward.get(series)
    }

    /// Candidate series for a key, in binding order.
    pub fn series_for(&self, key: &MappingKey) -> &[String] {
        self.reverse.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Series applied to a key: the first candidate bound.
    pub fn primary_series(&self, key: &MappingKey) -> Option<&str> {
        self.series_for(key).first().map(String::as_str)
    }

    pub fn time_series_names(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    pub fn mapped_keys(&self) -> impl Iterator<Item = (&MappingKey, &[String])> {
        self.reverse.iter().map(|(key, names)| (key, names.as_slice()))
    }

    pub fn is_bound(&self, key: &MappingKey) -> bool {
        self.reverse.contains_key(key)
    }

    /// True if any variable of the equipment has a binding.
    pub fn has_binding(&self, id: &str) -> bool {
        self.reverse.keys().any(|key| key.id() == id)
    }

    pub fn declared(&self) -> &HashSet<MappingKey> {
        &self.declared
    }

    pub fn unmapped(&self) -> &BTreeSet<String> {
        &self.unmapped
    }

    pub fn ignored_unmapped(&self) -> &BTreeSet<String> {
        &self.ignored_unmapped
    }

    pub fn disconnected(&self) -> &BTreeSet<String> {
        &self.disconnected
    }

    pub fn out_of_main_cc(&self) -> &BTreeSet<String> {
        &self.out_of_main_cc
    }

    /// Declared keys with no binding, sorted.
    pub fn not_mapped_keys(&self) -> Vec<MappingKey> {
        let mut keys: Vec<MappingKey> = self
            .declared
            .iter()
            .filter(|key| !self.reverse.contains_key(*key))
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        keys
    }

    fn insert(&mut self, series: &str, key: &MappingKey) -> bool {
        let names = self.reverse.entry(key.clone()).or_default();
        if names.iter().any(|name| name == series) {
            return false;
        }
        names.push(series.to_string());
        self.forward
            .entry(series.to_string())
            .or_default()
            .insert(key.clone());
        true
    }

    fn check_integrity(&self, kind: EquipmentKind) -> MappingResult<()> {
        for (key, names) in &self.reverse {
            if names.is_empty() {
                return Err(MappingError::Integrity(format!(
                    "{kind} key {key} has an empty time series list"
                )));
            }
            for name in names {
                if !self.forward.get(name).is_some_and(|keys| keys.contains(key)) {
                    return Err(MappingError::Integrity(format!(
                        "{kind} key {key} lists '{name}' but '{name}' does not feed it"
                    )));
                }
            }
        }
        for (name, keys) in &self.forward {
            for key in keys {
                if !self.series_for(key).iter().any(|n| n == name) {
                    return Err(MappingError::Integrity(format!(
                        "'{name}' feeds {kind} key {key} but the key does not list it"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Central mapping index.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingConfig {
    pub(crate) categories: BTreeMap<EquipmentKind, CategoryIndex>,
    pub(crate) distribution_keys: HashMap<MappingKey, DistributionKey>,
    pub(crate) formulas: BTreeMap<String, Formula>,
    pub(crate) mapped_time_series: BTreeSet<String>,
    pub(crate) ignore_limits: BTreeSet<String>,
    pub(crate) planned_outages: BTreeMap<String, BTreeSet<String>>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingConfig {
    pub fn new() -> Self {
        Self {
            categories: EquipmentKind::ALL
                .iter()
                .map(|kind| (*kind, CategoryIndex::default()))
                .collect(),
            distribution_keys: HashMap::new(),
            formulas: BTreeMap::new(),
            mapped_time_series: BTreeSet::new(),
            ignore_limits: BTreeSet::new(),
            planned_outages: BTreeMap::new(),
        }
    }

    /// Seed completeness sets from the network: equipment of the main
    /// component starts unmapped, the rest is recorded as disconnected or
    /// out of the main component.
    pub fn from_catalog(catalog: &dyn EquipmentCatalog) -> Self {
        let mut config = Self::new();
        for kind in EquipmentKind::ALL {
            let index = config.category_mut(kind);
            for (id, status) in catalog.equipment(kind) {
                match status {
                    EquipmentStatus::MainComponent => index.unmapped.insert(id),
                    EquipmentStatus::OutOfMainComponent => index.out_of_main_cc.insert(id),
                    EquipmentStatus::Disconnected => index.disconnected.insert(id),
                };
            }
        }
        config
    }

    pub fn category(&self, kind: EquipmentKind) -> &CategoryIndex {
        // Every kind is inserted by `new`.
        &self.categories[&kind]
    }

    fn category_mut(&mut self, kind: EquipmentKind) -> &mut CategoryIndex {
        self.categories.entry(kind).or_default()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Bind `series` to `key` in category `kind`.
    ///
    /// Binding the same pair twice leaves the index unchanged; a supplied
    /// distribution key still replaces the previous one. A second, different
    /// series for the same key is appended as a lower-priority candidate.
    /// Distribution weights must be finite and non-negative. Loads
    /// cannot be bound on an aggregate variable and on one of its detailed
    /// components at the same time.
    pub fn bind(
        &mut self,
        kind: EquipmentKind,
        series: &str,
        key: MappingKey,
        distribution: Option<DistributionKey>,
    ) -> MappingResult<()> {
        if series.is_empty() {
            return Err(MappingError::MalformedKey(format!(
                "empty time series name for {key}"
            )));
        }
        if !key.variable().is_compatible(kind) {
            return Err(MappingError::IncompatibleVariable {
                kind: kind.to_string(),
                variable: key.variable().to_string(),
            });
        }
        if let Some(variable) = key.equipment_variable() {
            self.check_exclusive(kind, &key, variable)?;
        }

        if let Some(distribution) = &distribution {
            distribution.validate()?;
        }

        let index = self.category_mut(kind);
        if index.insert(series, &key) {
            if key
                .equipment_variable()
                .is_some_and(|variable| variable.is_primary(kind))
            {
                index.unmapped.remove(key.id());
            }
            debug!(%kind, %key, series, "bound time series");
        } else {
            debug!(%kind, %key, series, "binding already present");
        }

        if let Some(distribution) = distribution {
            self.distribution_keys.insert(key, distribution);
        }
        self.mapped_time_series.insert(series.to_string());
        Ok(())
    }

    fn check_exclusive(
        &self,
        kind: EquipmentKind,
        key: &MappingKey,
        variable: EquipmentVariable,
    ) -> MappingResult<()> {
        let index = self.category(kind);
        let conflicting = variable
            .aggregate()
            .into_iter()
            .chain(variable.components().iter().copied());
        for other in conflicting {
            let other_key = MappingKey::new(other, key.id())?;
            if index.is_bound(&other_key) {
                return Err(MappingError::ContradictoryMapping {
                    id: key.id().to_string(),
                    existing: other.name().to_string(),
                    requested: variable.name().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn mark_unmapped(&mut self, kind: EquipmentKind, id: impl Into<String>) {
        self.category_mut(kind).unmapped.insert(id.into());
    }

    pub fn mark_ignored_unmapped(&mut self, kind: EquipmentKind, id: impl Into<String>) {
        self.category_mut(kind).ignored_unmapped.insert(id.into());
    }

    pub fn mark_disconnected(&mut self, kind: EquipmentKind, id: impl Into<String>) {
        self.category_mut(kind).disconnected.insert(id.into());
    }

    pub fn mark_out_of_main_cc(&mut self, kind: EquipmentKind, id: impl Into<String>) {
        self.category_mut(kind).out_of_main_cc.insert(id.into());
    }

    /// Record that a time series exists for `id` on `variables`; an empty
    /// slice stands for the category's default variable set.
    pub fn declare_time_series(
        &mut self,
        kind: EquipmentKind,
        id: &str,
        variables: &[MappingVariable],
    ) -> MappingResult<()> {
        let variables: Vec<MappingVariable> = if variables.is_empty() {
            EquipmentVariable::default_set(kind)
                .into_iter()
                .map(MappingVariable::from)
                .collect()
        } else {
            variables.to_vec()
        };
        if variables.is_empty() {
            return Err(MappingError::Config(format!(
                "{kind} has no default variable, name one to declare '{id}'"
            )));
        }
        for variable in variables {
            if !variable.is_compatible(kind) {
                return Err(MappingError::IncompatibleVariable {
                    kind: kind.to_string(),
                    variable: variable.to_string(),
                });
            }
            let key = MappingKey::new(variable, id)?;
            self.category_mut(kind).declared.insert(key);
        }
        Ok(())
    }

    /// Store a derived series. Definitions that would make a name depend on
    /// itself are rejected.
    pub fn add_formula(&mut self, name: impl Into<String>, formula: Formula) -> MappingResult<()> {
        let name = name.into();
        let mut stack: Vec<String> = formula.dependencies().into_iter().collect();
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == name {
                return Err(MappingError::FormulaCycle(name));
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(existing) = self.formulas.get(&current) {
                stack.extend(existing.dependencies());
            }
        }
        if self.formulas.insert(name.clone(), formula).is_some() {
            warn!(name = %name, "replaced formula definition");
        }
        Ok(())
    }

    pub fn add_planned_outages<I, S>(&mut self, series: impl Into<String>, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.planned_outages
            .entry(series.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
    }

    pub fn add_ignore_limits(&mut self, series: impl Into<String>) {
        self.ignore_limits.insert(series.into());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Per category, declared keys that have no binding.
    pub fn not_mapped_keys(&self) -> BTreeMap<EquipmentKind, Vec<MappingKey>> {
        self.categories
            .iter()
            .map(|(kind, index)| (*kind, index.not_mapped_keys()))
            .filter(|(_, keys)| !keys.is_empty())
            .collect()
    }

    /// Distribution key of a bound key; uniform when none was supplied.
    pub fn distribution_key(&self, key: &MappingKey) -> DistributionKey {
        self.distribution_keys
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn formula(&self, name: &str) -> Option<&Formula> {
        self.formulas.get(name)
    }

    pub fn formulas(&self) -> &BTreeMap<String, Formula> {
        &self.formulas
    }

    pub fn mapped_time_series_names(&self) -> &BTreeSet<String> {
        &self.mapped_time_series
    }

    pub fn ignore_limits_time_series_names(&self) -> &BTreeSet<String> {
        &self.ignore_limits
    }

    pub fn planned_outages(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.planned_outages
    }

    /// Names the run reads: bound series, planned outage series and
    /// distribution-key weight series.
    pub fn find_used_time_series_names(&self) -> BTreeSet<String> {
        let mut names = self.mapped_time_series.clone();
        names.extend(self.planned_outages.keys().cloned());
        names.extend(
            self.distribution_keys
                .values()
                .filter_map(|key| key.series_name().map(str::to_string)),
        );
        names
    }

    /// Used names with every formula replaced by the stored series it
    /// ultimately reads.
    pub fn find_time_series_names_to_load(&self) -> BTreeSet<String> {
        let mut to_load = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<String> = self.find_used_time_series_names().into_iter().collect();
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            match self.formulas.get(&name) {
                Some(formula) => stack.extend(formula.dependencies()),
                None => {
                    to_load.insert(name);
                }
            }
        }
        to_load
    }

    /// Verify both index directions agree in every category.
    pub fn check_integrity(&self) -> MappingResult<()> {
        for (kind, index) in &self.categories {
            index.check_integrity(*kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::InMemoryCatalog;

    fn key(variable: EquipmentVariable, id: &str) -> MappingKey {
        MappingKey::new(variable, id).unwrap()
    }

    #[test]
    fn bind_keeps_both_directions_in_sync() {
        let mut config = MappingConfig::new();
        let gen = key(EquipmentVariable::TargetP, "GEN_1");
        config
            .bind(EquipmentKind::Generator, "ts_a", gen.clone(), None)
            .unwrap();
        config
            .bind(EquipmentKind::Generator, "ts_b", gen.clone(), None)
            .unwrap();
        config
            .bind(EquipmentKind::Generator, "ts_a", gen.clone(), None)
            .unwrap();

        let index = config.category(EquipmentKind::Generator);
        assert_eq!(index.series_for(&gen), ["ts_a".to_string(), "ts_b".to_string()]);
        assert_eq!(index.primary_series(&gen), Some("ts_a"));
        assert!(index.keys_for("ts_b").unwrap().contains(&gen));
        config.check_integrity().unwrap();
    }

    #[test]
    fn bind_rejects_incompatible_variable() {
        let mut config = MappingConfig::new();
        let err = config
            .bind(EquipmentKind::Load, "ts", key(EquipmentVariable::TargetP, "L"), None)
            .unwrap_err();
        assert!(matches!(err, MappingError::IncompatibleVariable { .. }));
    }

    #[test]
    fn bind_rejects_aggregate_and_component() {
        let mut config = MappingConfig::new();
        config
            .bind(EquipmentKind::Load, "ts_p0", key(EquipmentVariable::P0, "LOAD_1"), None)
            .unwrap();
        let err = config
            .bind(
                EquipmentKind::Load,
                "ts_fixed",
                key(EquipmentVariable::FixedActivePower, "LOAD_1"),
                None,
            )
            .unwrap_err();
        match err {
            MappingError::ContradictoryMapping { id, existing, requested } => {
                assert_eq!(id, "LOAD_1");
                assert_eq!(existing, "p0");
                assert_eq!(requested, "fixedActivePower");
            }
            other => panic!("unexpected error {other}"),
        }
        // Reactive side is independent of the active side.
        config
            .bind(
                EquipmentKind::Load,
                "ts_q",
                key(EquipmentVariable::FixedReactivePower, "LOAD_1"),
                None,
            )
            .unwrap();
    }

    #[test]
    fn primary_binding_clears_unmapped() {
        let mut catalog = InMemoryCatalog::new();
        catalog
            .add(EquipmentKind::Generator, "GEN_1")
            .add(EquipmentKind::Generator, "GEN_2")
            .add_with_status(
                EquipmentKind::Generator,
                "GEN_3",
                EquipmentStatus::Disconnected,
            );
        let mut config = MappingConfig::from_catalog(&catalog);
        assert_eq!(config.category(EquipmentKind::Generator).unmapped().len(), 2);

        config
            .bind(EquipmentKind::Generator, "ts", key(EquipmentVariable::MaxP, "GEN_1"), None)
            .unwrap();
        assert!(config.category(EquipmentKind::Generator).unmapped().contains("GEN_1"));

        config
            .bind(EquipmentKind::Generator, "ts", key(EquipmentVariable::TargetP, "GEN_1"), None)
            .unwrap();
        let index = config.category(EquipmentKind::Generator);
        assert!(!index.unmapped().contains("GEN_1"));
        assert!(index.disconnected().contains("GEN_3"));
    }

    #[test]
    fn not_mapped_keys_reports_drift() {
        let mut config = MappingConfig::new();
        config
            .declare_time_series(EquipmentKind::Load, "LOAD_1", &[])
            .unwrap();
        config
            .bind(EquipmentKind::Load, "ts", key(EquipmentVariable::P0, "LOAD_1"), None)
            .unwrap();

        let drift = config.not_mapped_keys();
        let loads = &drift[&EquipmentKind::Load];
        assert_eq!(loads.len(), 2);
        assert!(loads.contains(&key(EquipmentVariable::FixedActivePower, "LOAD_1")));
        assert!(!drift.contains_key(&EquipmentKind::Generator));

        assert!(config
            .declare_time_series(EquipmentKind::Line, "LINE_1", &[])
            .is_err());
    }

    #[test]
    fn formula_cycles_are_rejected() {
        let mut config = MappingConfig::new();
        config
            .add_formula("a", Formula::series("b") + Formula::series("raw"))
            .unwrap();
        config.add_formula("b", Formula::series("c") * 2.0).unwrap();
        let err = config.add_formula("c", Formula::series("a")).unwrap_err();
        assert!(matches!(err, MappingError::FormulaCycle(name) if name == "c"));
        assert!(config.add_formula("d", Formula::series("d")).is_err());
    }

    #[test]
    fn used_and_loaded_names() {
        let mut config = MappingConfig::new();
        config.add_formula("sum", Formula::series("x") + Formula::series("y")).unwrap();
        config
            .bind(
                EquipmentKind::Generator,
                "sum",
                key(EquipmentVariable::TargetP, "G"),
                Some(DistributionKey::time_series("weights")),
            )
            .unwrap();
        config.add_planned_outages("outages", ["G"]);

        let used: Vec<_> = config.find_used_time_series_names().into_iter().collect();
        assert_eq!(used, ["outages", "sum", "weights"]);
        let to_load: Vec<_> = config.find_time_series_names_to_load().into_iter().collect();
        assert_eq!(to_load, ["outages", "weights", "x", "y"]);
    }

    #[test]
    fn distribution_key_defaults_to_uniform() {
        let mut config = MappingConfig::new();
        let k = key(EquipmentVariable::P0, "LOAD_1");
        assert_eq!(config.distribution_key(&k), DistributionKey::uniform());
        config
            .bind(EquipmentKind::Load, "ts", k.clone(), Some(DistributionKey::Number(3.0)))
            .unwrap();
        assert_eq!(config.distribution_key(&k), DistributionKey::Number(3.0));

        config
            .bind(EquipmentKind::Load, "ts", k.clone(), Some(DistributionKey::Number(5.0)))
            .unwrap();
        assert_eq!(config.distribution_key(&k), DistributionKey::Number(5.0));
        assert_eq!(config.category(EquipmentKind::Load).series_for(&k).len(), 1);
        config
            .bind(EquipmentKind::Load, "ts", k.clone(), None)
            .unwrap();
        assert_eq!(config.distribution_key(&k), DistributionKey::Number(5.0));
    }

    #[test]
    fn bind_rejects_invalid_weights() {
        let mut config = MappingConfig::new();
        let k = key(EquipmentVariable::P0, "LOAD_1");
        for weight in [-2.0, f64::NAN, f64::INFINITY] {
            let err = config
                .bind(EquipmentKind::Load, "ts", k.clone(), Some(DistributionKey::Number(weight)))
                .unwrap_err();
            assert!(matches!(err, MappingError::Config(_)));
        }
        assert!(!config.category(EquipmentKind::Load).is_bound(&k));
        assert!(config.mapped_time_series_names().is_empty());
    }
}

//! Validation and completeness counts over a frozen [`MappingConfig`].

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::config::MappingConfig;
use crate::diagnostics::{CategoryCounts, DiagnosticIssue, Diagnostics, MappingReport, Severity};
use crate::equipment::{EquipmentCatalog, EquipmentKind};
use crate::error::{MappingError, MappingResult};
use crate::key::MappingKey;
use crate::variable::{EquipmentVariable, MappingVariable};

/// Read-only checker borrowing a configuration.
///
/// Every query is pure, so a checker can be shared between threads once
/// the configuration is frozen.
#[derive(Debug, Clone, Copy)]
pub struct MappingConfigChecker<'a> {
    config: &'a MappingConfig,
}

impl<'a> MappingConfigChecker<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    /// Integrity of the dual index, then [`Self::check_mapped_variables`].
    pub fn check(&self) -> MappingResult<()> {
        self.config.check_integrity()?;
        self.check_mapped_variables()
    }

    /// Rejects loads bound on an aggregate variable together with one of its
    /// detailed components, then ignored-unmapped equipment that owns a
    /// binding without being unmapped.
    pub fn check_mapped_variables(&self) -> MappingResult<()> {
        let loads = self.config.category(EquipmentKind::Load);
        let mut by_id: BTreeMap<&str, BTreeSet<&'static str>> = BTreeMap::new();
        for (key, _) in loads.mapped_keys() {
            if let Some(variable) = key.equipment_variable() {
                by_id.entry(key.id()).or_default().insert(variable.name());
            }
        }
        for (id, variables) in &by_id {
            for aggregate in [EquipmentVariable::P0, EquipmentVariable::Q0] {
                if !variables.contains(aggregate.name()) {
                    continue;
                }
                if let Some(component) = aggregate
                    .components()
                    .iter()
                    .find(|c| variables.contains(c.name()))
                {
                    return Err(MappingError::ContradictoryMapping {
                        id: id.to_string(),
                        existing: aggregate.name().to_string(),
                        requested: component.name().to_string(),
                    });
                }
            }
        }

        for kind in EquipmentKind::ALL {
            let index = self.config.category(kind);
            let mut bound: Vec<(&MappingKey, &[String])> = index.mapped_keys().collect();
            bound.sort_by(|a, b| a.0.sort_key().cmp(&b.0.sort_key()));
            for (key, names) in bound {
                if !index.ignored_unmapped().contains(key.id())
                    || index.unmapped().contains(key.id())
                {
                    continue;
                }
                return Err(MappingError::UnmappedContradiction {
                    id: key.id().to_string(),
                    time_series: names.first().cloned().unwrap_or_default(),
                });
            }
        }
        debug!("mapped variables are consistent");
        Ok(())
    }

    /// True iff every unmapped id is also ignored-unmapped.
    pub fn is_mapping_complete(&self) -> bool {
        EquipmentKind::ALL
            .iter()
            .all(|kind| self.nb_unmapped(*kind) == 0)
    }

    /// Distinct equipment ids with at least one binding.
    pub fn nb_mapped(&self, kind: EquipmentKind) -> usize {
        self.config
            .category(kind)
            .mapped_keys()
            .map(|(key, _)| key.id())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Keys bound on `variable`; `None` when the variable does not apply to
    /// the category.
    pub fn nb_mapped_for(&self, kind: EquipmentKind, variable: &MappingVariable) -> Option<usize> {
        if !variable.is_compatible(kind) {
            return None;
        }
        Some(
            self.config
                .category(kind)
                .mapped_keys()
                .filter(|(key, _)| key.variable() == variable)
                .count(),
        )
    }

    /// Keys with more than one candidate series.
    pub fn nb_multi_mapped(&self, kind: EquipmentKind) -> usize {
        self.config
            .category(kind)
            .mapped_keys()
            .filter(|(_, names)| names.len() > 1)
            .count()
    }

    /// Unmapped ids not exempted by ignored-unmapped.
    pub fn nb_unmapped(&self, kind: EquipmentKind) -> usize {
        let index = self.config.category(kind);
        index
            .unmapped()
            .difference(index.ignored_unmapped())
            .count()
    }

    /// Declared keys that are bound.
    pub fn equipment_time_series_keys(&self, kind: EquipmentKind) -> Vec<MappingKey> {
        let index = self.config.category(kind);
        let mut keys: Vec<MappingKey> = index
            .declared()
            .iter()
            .filter(|key| index.is_bound(key))
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        keys
    }

    /// Declared keys that are not bound.
    pub fn not_mapped_keys(&self, kind: EquipmentKind) -> Vec<MappingKey> {
        self.config.category(kind).not_mapped_keys()
    }

    /// Every id the configuration names must exist in the catalog under the
    /// same category.
    pub fn check_equipment_ids(&self, catalog: &dyn EquipmentCatalog) -> MappingResult<()> {
        for kind in EquipmentKind::ALL {
            let index = self.config.category(kind);
            let ids: BTreeSet<&str> = index
                .mapped_keys()
                .map(|(key, _)| key.id())
                .chain(index.declared().iter().map(MappingKey::id))
                .chain(index.unmapped().iter().map(String::as_str))
                .chain(index.ignored_unmapped().iter().map(String::as_str))
                .collect();
            if let Some(unknown) = ids.into_iter().find(|id| !catalog.contains(kind, id)) {
                return Err(MappingError::UnknownEquipment {
                    kind: kind.to_string(),
                    id: unknown.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Counts per category and every finding, without failing.
    pub fn report(&self) -> MappingReport {
        let mut diagnostics = Diagnostics::new();
        if let Err(err) = self.check() {
            diagnostics.add(consistency_issue(&err));
        }

        let mut categories = Vec::new();
        for kind in EquipmentKind::ALL {
            let index = self.config.category(kind);
            let not_mapped = index.not_mapped_keys();
            for key in &not_mapped {
                diagnostics.add(
                    DiagnosticIssue::new(
                        Severity::Warning,
                        "drift",
                        format!("{kind} time series declared for '{}' but not bound", key.variable()),
                    )
                    .with_entity(key.id()),
                );
            }
            for id in index.unmapped().difference(index.ignored_unmapped()) {
                diagnostics.add_warning_with_entity(
                    "unmapped",
                    &format!("{kind} has no time series bound"),
                    id,
                );
            }
            let counts = CategoryCounts {
                mapped: self.nb_mapped(kind),
                multi_mapped: self.nb_multi_mapped(kind),
                unmapped: self.nb_unmapped(kind),
                ignored_unmapped: index.ignored_unmapped().len(),
                not_mapped_keys: not_mapped.len(),
            };
            if counts != CategoryCounts::default() {
                categories.push((kind, counts));
            }
        }

        let report = MappingReport {
            complete: self.is_mapping_complete(),
            categories,
            diagnostics,
        };
        info!(
            complete = report.complete,
            summary = %report.diagnostics.summary(),
            "mapping report"
        );
        report
    }
}

/// Error finding with the equipment and series it names, when it names any.
fn consistency_issue(err: &MappingError) -> DiagnosticIssue {
    let issue = DiagnosticIssue::new(Severity::Error, "consistency", err.to_string());
    match err {
        MappingError::UnmappedContradiction { id, time_series } => {
            issue.with_entity(id.as_str()).with_time_series(time_series.as_str())
        }
        MappingError::ContradictoryMapping { id, .. } => issue.with_entity(id.as_str()),
        _ => issue,
    }
}

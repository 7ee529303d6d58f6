//! Diagnostics collected while checking a mapping configuration.
//!
//! Checker errors abort at the first inconsistency; the report built here
//! instead gathers every drift and completeness finding so a caller can
//! print or serialize them in one go.
//!
//! # Example
//!
//! ```
//! use tsmap_core::diagnostics::{DiagnosticIssue, Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity("unmapped", "no time series bound", "GEN_1");
//! diag.add(
//!     DiagnosticIssue::new(Severity::Error, "consistency", "declared unmapped but bound")
//!         .with_entity("GEN_2")
//!         .with_time_series("wind_farm_a"),
//! );
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! ```

use serde::Serialize;

use crate::equipment::EquipmentKind;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Drift that does not prevent a run (e.g. declared but unbound key)
    Warning,
    /// Configuration that must be fixed before a run
    Error,
}

/// A single finding about a mapping configuration
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping label ("unmapped", "drift", "integrity", ...)
    pub category: String,
    pub message: String,
    /// Equipment id the issue is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Time series the issue is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
            time_series: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_time_series(mut self, name: impl Into<String>) -> Self {
        self.time_series = Some(name.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        if let Some(name) = &self.time_series {
            write!(f, " on '{}'", name)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

// ============================================================================
// Mapping Report
// ============================================================================

/// Completeness counters for one equipment category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    /// distinct equipment ids with at least one binding
    pub mapped: usize,
    /// keys fed by more than one candidate series
    pub multi_mapped: usize,
    /// unmapped ids not exempted by ignored-unmapped
    pub unmapped: usize,
    pub ignored_unmapped: usize,
    /// declared keys without a binding
    pub not_mapped_keys: usize,
}

/// Counters per category plus the issues found
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingReport {
    pub complete: bool,
    pub categories: Vec<(EquipmentKind, CategoryCounts)>,
    pub diagnostics: Diagnostics,
}

impl MappingReport {
    pub fn counts(&self, kind: EquipmentKind) -> Option<&CategoryCounts> {
        self.categories
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, counts)| counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = DiagnosticIssue::new(Severity::Warning, "drift", "declared but not bound")
            .with_entity("GEN_1")
            .with_time_series("ts_gen");
        assert_eq!(
            issue.to_string(),
            "[warning:drift] declared but not bound (GEN_1) on 'ts_gen'"
        );
    }

    #[test]
    fn test_counts_and_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning_with_entity("unmapped", "a", "GEN_1");
        diag.add_warning_with_entity("unmapped", "b", "GEN_2");
        diag.add(DiagnosticIssue::new(Severity::Error, "consistency", "c").with_entity("LOAD_1"));

        assert_eq!(diag.summary(), "2 warnings, 1 error");
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.issues_by_category("unmapped").count(), 2);
        assert!(diag.to_string().starts_with("Diagnostics: 2 warnings, 1 error"));
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let issue = DiagnosticIssue::new(Severity::Error, "integrity", "broken");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(!json.contains("entity"));
        assert!(json.contains(r#""severity":"error""#));
    }
}

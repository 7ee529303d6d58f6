//! # tsmap-core: time-series to equipment mapping
//!
//! Binds named time series to individual variables of power-grid equipment
//! and keeps track of what is left unbound.
//!
//! ## Core Data Structures
//!
//! - [`MappingKey`] - `(variable, equipment id)`, the unit of mapping
//! - [`MappingVariable`] - built-in [`EquipmentVariable`] or a registered extension
//! - [`DistributionKey`] - weight splitting one series across equipment
//! - [`MappingConfig`] - forward/reverse index per [`EquipmentKind`], plus
//!   completeness sets, formulas and planned outages
//! - [`MappingConfigChecker`] - invariants and completeness counts
//! - [`PointRange`] - closed point-index interval
//!
//! ## Quick Start
//!
//! ```
//! use tsmap_core::*;
//!
//! let mut config = MappingConfig::new();
//! config.mark_unmapped(EquipmentKind::Generator, "GEN_1");
//! config.bind(
//!     EquipmentKind::Generator,
//!     "wind_farm_a",
//!     MappingKey::new(EquipmentVariable::TargetP, "GEN_1")?,
//!     None,
//! )?;
//!
//! let checker = MappingConfigChecker::new(&config);
//! checker.check()?;
//! assert!(checker.is_mapping_complete());
//!
//! let text = json::to_json(&config)?;
//! let registry = VariableRegistry::with_defaults();
//! assert_eq!(json::from_json(&text, &registry)?, config);
//! # Ok::<(), MappingError>(())
//! ```

pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod equipment;
pub mod error;
pub mod formula;
pub mod json;
pub mod key;
pub mod range;
pub mod variable;

pub use checker::MappingConfigChecker;
pub use config::{CategoryIndex, MappingConfig};
pub use diagnostics::{Diagnostics, MappingReport, Severity};
pub use equipment::{EquipmentCatalog, EquipmentKind, EquipmentStatus, InMemoryCatalog};
pub use error::{MappingError, MappingResult};
pub use formula::{BinaryOp, Formula, UnaryOp};
pub use key::{DistributionKey, MappingKey};
pub use range::PointRange;
pub use variable::{
    EquipmentVariable, MappingVariable, NamedVariableProvider, VariableProvider, VariableRegistry,
};

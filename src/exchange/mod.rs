//! CSV import and export of model records.
//!
//! Import is two-phase: [`plan_import`] parses, coerces and resolves every row
//! without writing anything, and [`commit_import`] applies the plan under a
//! [`Policy`] inside one datastore transaction. Export writes the same columns,
//! in the same order, that import expects.

mod coerce;
mod export;
mod import;
mod source;

pub use export::{default_export_path, export, ExportSummary};
pub use import::{commit_import, import, plan_import, Policy};
pub use source::SourceTable;

use super::coerce::{check_range, coerce_scalar};
use super::source::{SourceRow, SourceTable};
use crate::config::ExchangeSettings;
use crate::error::{ExchangeError, Result};
use crate::schema::{FieldDescriptor, FieldKind, ModelSchema};
use crate::store::{Datastore, KeyLookup, Record, RecordRef, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How imported records meet the ones already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Replace,
    Merge,
    Cancel,
}

impl Policy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r" | "replace" => Some(Self::Replace),
            "m" | "merge" => Some(Self::Merge),
            "c" | "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Merge => "merge",
            Self::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub line: u64,
    pub record: Record,
}

/// Result of the dry run: what a commit would insert, and what it would skip.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub id: Uuid,
    pub model: &'static str,
    pub rows_total: usize,
    pub existing: usize,
    pub ignored_columns: Vec<String>,
    pub candidates: Vec<Candidate>,
    pub row_errors: Vec<RowError>,
}

impl ImportPlan {
    pub fn needs_policy(&self) -> bool {
        self.existing > 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub id: Uuid,
    pub model: &'static str,
    pub policy: Policy,
    pub rows_total: usize,
    pub imported: usize,
    pub deleted: usize,
    pub row_errors: Vec<RowError>,
}

/// Validates and converts `source` against `model` without touching storage.
pub fn plan_import<S: Datastore>(
    store: &S,
    model: &ModelSchema,
    source: &SourceTable,
    settings: &ExchangeSettings,
) -> Result<ImportPlan> {
    let missing: Vec<String> = model
        .fields()
        .iter()
        .filter(|f| source.column(f.name).is_none())
        .map(|f| f.name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ExchangeError::SchemaMismatch {
            model: model.name.to_string(),
            missing,
        });
    }
    let ignored_columns: Vec<String> = source
        .headers
        .iter()
        .filter(|h| model.field(h).is_none())
        .cloned()
        .collect();
    if !ignored_columns.is_empty() {
        log::warn!(
            "{}: ignoring extra columns: {}",
            model.name,
            ignored_columns.join(", ")
        );
    }

    let columns: Vec<(&FieldDescriptor, usize)> = model
        .fields()
        .iter()
        .filter_map(|f| source.column(f.name).map(|idx| (f, idx)))
        .collect();

    let mut candidates = Vec::new();
    let mut row_errors = Vec::new();
    for row in &source.rows {
        match build_record(store, model, &columns, row, settings)? {
            Ok(record) => candidates.push(Candidate {
                line: row.line,
                record,
            }),
            Err(e) => {
                log::debug!("{}: line {}: {}", model.name, e.line, e.message);
                row_errors.push(e);
            }
        }
    }
    if !row_errors.is_empty() {
        log::warn!(
            "{}: {} of {} rows rejected",
            model.name,
            row_errors.len(),
            source.rows.len()
        );
    }

    Ok(ImportPlan {
        id: Uuid::new_v4(),
        model: model.name,
        rows_total: source.rows.len(),
        existing: store.count(model)?,
        ignored_columns,
        candidates,
        row_errors,
    })
}

/// Persists a plan under `policy`. A non-empty model requires an explicit policy.
pub fn commit_import<S: Datastore>(
    store: &S,
    model: &ModelSchema,
    plan: ImportPlan,
    policy: Option<Policy>,
) -> Result<ImportOutcome> {
    let existing = store.count(model)?;
    let policy = match (existing, policy) {
        (0, Some(Policy::Cancel)) => Policy::Cancel,
        (0, _) => Policy::Merge,
        (_, Some(p)) => p,
        (n, None) => {
            return Err(ExchangeError::PolicyRequired {
                model: model.name.to_string(),
                existing: n,
            })
        }
    };

    let mut outcome = ImportOutcome {
        id: plan.id,
        model: model.name,
        policy,
        rows_total: plan.rows_total,
        imported: 0,
        deleted: 0,
        row_errors: plan.row_errors,
    };
    if policy == Policy::Cancel {
        log::info!("{}: import cancelled", model.name);
        return Ok(outcome);
    }
    if plan.candidates.is_empty() {
        log::info!("{}: nothing to import", model.name);
        return Ok(outcome);
    }

    let candidates = plan.candidates;
    let records: Vec<Record> = candidates.iter().map(|c| c.record.clone()).collect();
    let (deleted, imported) = store
        .atomic(|s| {
            let deleted = if policy == Policy::Replace {
                s.delete_all(model)?
            } else {
                0
            };
            let imported = s.bulk_insert(model, &records)?;
            Ok((deleted, imported))
        })
        .map_err(|e| match e {
            ExchangeError::UniqueViolation {
                model,
                index,
                message,
            } => ExchangeError::ReconciliationConflict {
                model,
                line: candidates.get(index).map(|c| c.line).unwrap_or_default(),
                message,
            },
            other => other,
        })?;

    outcome.deleted = deleted;
    outcome.imported = imported;
    log::info!(
        "{}: imported {} records ({}, {} deleted, {} rows rejected)",
        model.name,
        imported,
        policy.as_str(),
        deleted,
        outcome.row_errors.len()
    );
    Ok(outcome)
}

/// Plan and commit in one call, for callers that confirm up front.
pub fn import<S: Datastore>(
    store: &S,
    model: &ModelSchema,
    source: &SourceTable,
    policy: Option<Policy>,
    settings: &ExchangeSettings,
) -> Result<ImportOutcome> {
    let plan = plan_import(store, model, source, settings)?;
    commit_import(store, model, plan, policy)
}

/// Outer error: storage failure (fatal). Inner error: this row is rejected.
fn build_record<S: Datastore>(
    store: &S,
    model: &ModelSchema,
    columns: &[(&FieldDescriptor, usize)],
    row: &SourceRow,
    settings: &ExchangeSettings,
) -> Result<std::result::Result<Record, RowError>> {
    let reject = |field: &FieldDescriptor, code: &'static str, message: String| RowError {
        line: row.line,
        field: Some(field.name.to_string()),
        code,
        message,
    };

    let mut record = Record::new(model.name);
    for &(field, idx) in columns {
        let Some(raw) = row.cells.get(idx) else {
            return Ok(Err(reject(
                field,
                "missing_value",
                format!("no value for {}", field.name),
            )));
        };
        let value = match &field.kind {
            FieldKind::Relation {
                model: target,
                lookup_field,
                key_type,
            } => {
                let key = match coerce_scalar(*key_type, raw, &settings.date_formats) {
                    Ok(k) => k,
                    Err(msg) => {
                        return Ok(Err(reject(
                            field,
                            "invalid_reference",
                            format!("Error with {} '{}' - {}", field.name, raw, msg),
                        )))
                    }
                };
                let target_schema = store.describe_fields(target)?;
                match store.find_by_natural_key(target_schema, lookup_field, &key)? {
                    KeyLookup::Found(_) => Value::Ref(RecordRef {
                        model: *target,
                        key: Box::new(key),
                    }),
                    KeyLookup::Missing => {
                        return Ok(Err(reject(
                            field,
                            "missing_reference",
                            format!(
                                "Related {} with {} '{}' not found",
                                field.name, lookup_field, raw
                            ),
                        )))
                    }
                    KeyLookup::Ambiguous => {
                        return Ok(Err(reject(
                            field,
                            "ambiguous_reference",
                            format!(
                                "Related {} with {} '{}' matches more than one {}",
                                field.name, lookup_field, raw, target
                            ),
                        )))
                    }
                }
            }
            FieldKind::Scalar { scalar_type } => {
                match coerce_scalar(*scalar_type, raw, &settings.date_formats)
                    .and_then(|v| check_range(&v, field.range).map(|_| v))
                {
                    Ok(v) => v,
                    Err(msg) => {
                        return Ok(Err(reject(
                            field,
                            "invalid_value",
                            format!("{}: {}", field.name, msg),
                        )))
                    }
                }
            }
        };
        record.set(field.name, value);
    }
    Ok(Ok(record))
}

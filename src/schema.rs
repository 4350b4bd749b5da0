use crate::error::{ExchangeError, Result};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Integer,
    Boolean,
    Date,
}

/// Values the datastore fills in itself; such fields never appear in CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generated {
    RowId,
    CreatedAt,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    Scalar(ScalarType),
    ForeignKey {
        model: &'static str,
        to_field: &'static str,
    },
}

/// One column of a model as declared in source.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub column: &'static str,
    pub ty: FieldType,
    pub unique: bool,
    pub generated: Option<Generated>,
    pub range: Option<(i64, i64)>,
}

impl FieldDef {
    pub const fn scalar(name: &'static str, ty: ScalarType) -> Self {
        Self {
            name,
            column: name,
            ty: FieldType::Scalar(ty),
            unique: false,
            generated: None,
            range: None,
        }
    }

    pub const fn foreign_key(
        name: &'static str,
        column: &'static str,
        model: &'static str,
        to_field: &'static str,
    ) -> Self {
        Self {
            name,
            column,
            ty: FieldType::ForeignKey { model, to_field },
            unique: false,
            generated: None,
            range: None,
        }
    }

    pub const fn row_id(name: &'static str) -> Self {
        Self {
            generated: Some(Generated::RowId),
            unique: true,
            ..Self::scalar(name, ScalarType::Integer)
        }
    }

    pub const fn created_at(name: &'static str) -> Self {
        Self {
            generated: Some(Generated::CreatedAt),
            ..Self::scalar(name, ScalarType::String)
        }
    }

    pub const fn column(self, column: &'static str) -> Self {
        Self { column, ..self }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn range(self, min: i64, max: i64) -> Self {
        Self {
            range: Some((min, max)),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelDef {
    pub app: &'static str,
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub ordering: &'static [OrderBy],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        scalar_type: ScalarType,
    },
    Relation {
        model: &'static str,
        lookup_field: &'static str,
        key_type: ScalarType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: &'static str,
    #[serde(skip)]
    pub column: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated: Option<Generated>,
}

impl FieldDescriptor {
    pub fn is_auto_generated(&self) -> bool {
        self.generated.is_some()
    }
}

/// A model with its fields resolved and split into importable and generated.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub app: &'static str,
    pub name: &'static str,
    pub table: &'static str,
    pub ordering: &'static [OrderBy],
    fields: Vec<FieldDescriptor>,
    generated: Vec<FieldDescriptor>,
}

impl ModelSchema {
    /// Importable fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn generated_fields(&self) -> &[FieldDescriptor] {
        &self.generated
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[cfg(test)]
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    pub fn column_of(&self, name: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .chain(self.generated.iter())
            .find(|f| f.name == name)
            .map(|f| f.column)
    }

    pub fn references(&self, model: &str) -> bool {
        self.fields.iter().any(|f| {
            matches!(f.kind, FieldKind::Relation { model: target, .. } if target == model)
        })
    }
}

/// Every model the process knows about, validated once at start-up.
#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<ModelSchema>,
}

impl Registry {
    pub fn build(defs: &[ModelDef]) -> Result<Self> {
        let mut names = HashSet::new();
        for def in defs {
            if !names.insert(def.name.to_ascii_lowercase()) {
                return Err(invalid(def, "model declared twice"));
            }
            let mut field_names = HashSet::new();
            for f in def.fields {
                if !field_names.insert(f.name) {
                    return Err(invalid(def, format!("field {} declared twice", f.name)));
                }
            }
        }

        let mut models = Vec::with_capacity(defs.len());
        for def in defs {
            let mut fields = Vec::new();
            let mut generated = Vec::new();
            for f in def.fields {
                let descriptor = describe_field(defs, def, f)?;
                if descriptor.is_auto_generated() {
                    generated.push(descriptor);
                } else {
                    fields.push(descriptor);
                }
            }
            for order in def.ordering {
                if !def.fields.iter().any(|f| f.name == order.field) {
                    return Err(invalid(
                        def,
                        format!("ordering uses unknown field {}", order.field),
                    ));
                }
            }
            models.push(ModelSchema {
                app: def.app,
                name: def.name,
                table: def.table,
                ordering: def.ordering,
                fields,
                generated,
            });
        }
        Ok(Self { models })
    }

    /// Looks a model up by name, case-insensitively.
    pub fn describe(&self, model: &str) -> Result<&ModelSchema> {
        let wanted = model.trim();
        self.models
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ExchangeError::UnknownModel(wanted.to_string()))
    }

    pub fn models(&self) -> &[ModelSchema] {
        &self.models
    }

    pub fn apps(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for m in &self.models {
            if !out.contains(&m.app) {
                out.push(m.app);
            }
        }
        out
    }

    pub fn app_models(&self, app: &str) -> Vec<&ModelSchema> {
        self.models
            .iter()
            .filter(|m| m.app.eq_ignore_ascii_case(app.trim()))
            .collect()
    }

    /// Orders `selected` so that a model comes before every model it references.
    pub fn dependents_first<'a>(&self, selected: &[&'a ModelSchema]) -> Vec<&'a ModelSchema> {
        let mut remaining: Vec<&'a ModelSchema> = selected.to_vec();
        let mut out = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let pick = remaining.iter().position(|candidate| {
                !remaining
                    .iter()
                    .any(|other| other.name != candidate.name && other.references(candidate.name))
            });
            // A reference cycle; fall back to declaration order for the rest.
            let idx = pick.unwrap_or(0);
            out.push(remaining.remove(idx));
        }
        out
    }
}

fn describe_field(defs: &[ModelDef], def: &ModelDef, f: &FieldDef) -> Result<FieldDescriptor> {
    let kind = match f.ty {
        FieldType::Scalar(scalar_type) => FieldKind::Scalar { scalar_type },
        FieldType::ForeignKey { model, to_field } => {
            let target = defs.iter().find(|d| d.name == model).ok_or_else(|| {
                invalid(def, format!("{} references unknown model {}", f.name, model))
            })?;
            let lookup = target
                .fields
                .iter()
                .find(|t| t.name == to_field)
                .ok_or_else(|| {
                    invalid(
                        def,
                        format!("{} references unknown field {}.{}", f.name, model, to_field),
                    )
                })?;
            let key_type = match lookup.ty {
                FieldType::Scalar(t) => t,
                FieldType::ForeignKey { .. } => {
                    return Err(invalid(
                        def,
                        format!("{}.{} is a relation and cannot be a lookup key", model, to_field),
                    ))
                }
            };
            if lookup.generated.is_some() || !lookup.unique {
                return Err(invalid(
                    def,
                    format!("{}.{} is not a unique natural key", model, to_field),
                ));
            }
            FieldKind::Relation {
                model: target.name,
                lookup_field: lookup.name,
                key_type,
            }
        }
    };
    if f.range.is_some() && kind != (FieldKind::Scalar { scalar_type: ScalarType::Integer }) {
        return Err(invalid(def, format!("range on non-integer field {}", f.name)));
    }
    Ok(FieldDescriptor {
        name: f.name,
        column: f.column,
        kind,
        range: f.range,
        generated: f.generated,
    })
}

fn invalid(def: &ModelDef, message: impl Into<String>) -> ExchangeError {
    ExchangeError::InvalidSchema {
        model: def.name.to_string(),
        message: message.into(),
    }
}

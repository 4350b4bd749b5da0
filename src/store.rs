use crate::error::{ExchangeError, Result};
use crate::schema::{FieldDescriptor, FieldKind, Generated, ModelSchema, OrderBy, Registry, ScalarType};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{ToSqlOutput, Type};
use rusqlite::{Connection, ErrorCode, Row, ToSql};
use std::collections::BTreeMap;
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    Ref(RecordRef),
}

/// A resolved relation: the referenced model and the natural key it was found by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordRef {
    pub model: &'static str,
    pub key: Box<Value>,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Ref(r) => write!(f, "{}", r.key),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(n) => ToSqlOutput::from(*n),
            Value::Boolean(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Date(d) => ToSqlOutput::from(d.format(DATE_FORMAT).to_string()),
            Value::Ref(r) => return r.key.to_sql(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub model: &'static str,
    values: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, field: &'static str, value: Value) {
        self.values.insert(field, value);
    }

    #[cfg(test)]
    pub fn with(mut self, field: &'static str, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    Found(Record),
    Missing,
    Ambiguous,
}

/// The record-model surface the exchange engine needs from storage.
pub trait Datastore {
    fn registry(&self) -> &Registry;

    fn describe_fields(&self, model: &str) -> Result<&ModelSchema> {
        self.registry().describe(model)
    }

    fn find_by_natural_key(
        &self,
        model: &ModelSchema,
        field: &str,
        key: &Value,
    ) -> Result<KeyLookup>;

    fn count(&self, model: &ModelSchema) -> Result<usize>;

    fn delete_all(&self, model: &ModelSchema) -> Result<usize>;

    /// Inserts every record or none of them.
    fn bulk_insert(&self, model: &ModelSchema, records: &[Record]) -> Result<usize>;

    fn iterate_all(&self, model: &ModelSchema, order: &[OrderBy]) -> Result<Vec<Record>>;

    /// Runs `f` as one unit: any error rolls back everything it wrote.
    fn atomic<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
    registry: &'a Registry,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection, registry: &'a Registry) -> Self {
        Self { conn, registry }
    }
}

impl Datastore for SqliteStore<'_> {
    fn registry(&self) -> &Registry {
        self.registry
    }

    fn find_by_natural_key(
        &self,
        model: &ModelSchema,
        field: &str,
        key: &Value,
    ) -> Result<KeyLookup> {
        let column = model.column_of(field).ok_or_else(|| ExchangeError::InvalidSchema {
            model: model.name.to_string(),
            message: format!("no field named {}", field),
        })?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? LIMIT 2",
            select_list(model),
            ident(model.table),
            ident(column)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut found = stmt
            .query_map([key], |row| read_record(model, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(match found.len() {
            0 => KeyLookup::Missing,
            1 => KeyLookup::Found(found.remove(0)),
            _ => KeyLookup::Ambiguous,
        })
    }

    fn count(&self, model: &ModelSchema) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", ident(model.table));
        let n: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }

    fn delete_all(&self, model: &ModelSchema) -> Result<usize> {
        let sql = format!("DELETE FROM {}", ident(model.table));
        Ok(self.conn.execute(&sql, [])?)
    }

    fn bulk_insert(&self, model: &ModelSchema, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let stamped: Vec<&FieldDescriptor> = model
            .generated_fields()
            .iter()
            .filter(|f| f.generated == Some(Generated::CreatedAt))
            .collect();
        let columns: Vec<String> = model
            .fields()
            .iter()
            .chain(stamped.iter().copied())
            .map(|f| ident(f.column))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {}({}) VALUES({})",
            ident(model.table),
            columns.join(", "),
            placeholders
        );
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        self.atomic(|store| {
            let mut stmt = store.conn.prepare(&sql)?;
            for (index, record) in records.iter().enumerate() {
                let mut params: Vec<&dyn ToSql> = Vec::with_capacity(columns.len());
                for f in model.fields() {
                    match record.get(f.name) {
                        Some(v) => params.push(v),
                        None => params.push(&rusqlite::types::Null),
                    }
                }
                for _ in &stamped {
                    params.push(&now);
                }
                stmt.execute(params.as_slice())
                    .map_err(|e| unique_violation(model, index, e))?;
            }
            Ok(records.len())
        })
    }

    fn iterate_all(&self, model: &ModelSchema, order: &[OrderBy]) -> Result<Vec<Record>> {
        let mut order_sql = Vec::with_capacity(order.len() + 1);
        for o in order {
            let column = model.column_of(o.field).ok_or_else(|| ExchangeError::InvalidSchema {
                model: model.name.to_string(),
                message: format!("cannot order by unknown field {}", o.field),
            })?;
            order_sql.push(format!(
                "{} {}",
                ident(column),
                if o.descending { "DESC" } else { "ASC" }
            ));
        }
        order_sql.push("rowid ASC".to_string());
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list(model),
            ident(model.table),
            order_sql.join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |row| read_record(model, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn atomic<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if !self.conn.is_autocommit() {
            // Already inside an outer unit; it owns commit and rollback.
            return f(self);
        }
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}

fn unique_violation(model: &ModelSchema, index: usize, e: rusqlite::Error) -> ExchangeError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => ExchangeError::UniqueViolation {
            model: model.name.to_string(),
            index,
            message: e.to_string(),
        },
        _ => ExchangeError::Store(e),
    }
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_list(model: &ModelSchema) -> String {
    model
        .fields()
        .iter()
        .map(|f| ident(f.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_record(model: &ModelSchema, row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new(model.name);
    for (idx, f) in model.fields().iter().enumerate() {
        let value = match &f.kind {
            FieldKind::Scalar { scalar_type } => read_scalar(*scalar_type, row, idx)?,
            FieldKind::Relation {
                model: target,
                key_type,
                ..
            } => Value::Ref(RecordRef {
                model: *target,
                key: Box::new(read_scalar(*key_type, row, idx)?),
            }),
        };
        record.set(f.name, value);
    }
    Ok(record)
}

fn read_scalar(ty: ScalarType, row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    match ty {
        ScalarType::String => row.get::<_, String>(idx).map(Value::Text),
        ScalarType::Integer => row.get::<_, i64>(idx).map(Value::Integer),
        ScalarType::Boolean => row.get::<_, bool>(idx).map(Value::Boolean),
        ScalarType::Date => {
            let raw: String = row.get(idx)?;
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, models};

    fn setup() -> (Connection, Registry) {
        let conn = Connection::open_in_memory().expect("open memory db");
        db::init_schema(&conn).expect("init schema");
        let registry = Registry::build(models::RECORDS).expect("registry");
        (conn, registry)
    }

    fn profile(id: &str, first: &str) -> Record {
        Record::new("StudentProfile")
            .with("student_id", Value::Text(id.to_string()))
            .with("first_name", Value::Text(first.to_string()))
            .with("last_name", Value::Text("Chan".to_string()))
            .with(
                "date_of_birth",
                Value::Date(NaiveDate::from_ymd_opt(2010, 3, 4).expect("date")),
            )
            .with("contact_number", Value::Text("5550100".to_string()))
    }

    #[test]
    fn bulk_insert_then_find_by_natural_key() {
        let (conn, registry) = setup();
        let store = SqliteStore::new(&conn, &registry);
        let model = registry.describe("StudentProfile").expect("model");
        let n = store
            .bulk_insert(model, &[profile("S2", "Bo"), profile("S1", "Al")])
            .expect("insert");
        assert_eq!(n, 2);
        assert_eq!(store.count(model).expect("count"), 2);

        let hit = store
            .find_by_natural_key(model, "student_id", &Value::Text("S1".into()))
            .expect("lookup");
        assert_eq!(hit, KeyLookup::Found(profile("S1", "Al")));
        let miss = store
            .find_by_natural_key(model, "student_id", &Value::Text("S9".into()))
            .expect("lookup");
        assert_eq!(miss, KeyLookup::Missing);

        let all = store.iterate_all(model, model.ordering).expect("iterate");
        assert_eq!(all, vec![profile("S1", "Al"), profile("S2", "Bo")]);
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let (conn, registry) = setup();
        let store = SqliteStore::new(&conn, &registry);
        let model = registry.describe("StudentProfile").expect("model");
        store.bulk_insert(model, &[profile("S1", "Al")]).expect("seed");

        let e = store
            .bulk_insert(model, &[profile("S2", "Bo"), profile("S1", "Again")])
            .expect_err("duplicate key");
        assert!(matches!(e, ExchangeError::UniqueViolation { index: 1, .. }));
        assert_eq!(store.count(model).expect("count"), 1);
    }

    #[test]
    fn generated_timestamp_is_filled_in() {
        let (conn, registry) = setup();
        let store = SqliteStore::new(&conn, &registry);
        let profiles = registry.describe("StudentProfile").expect("model");
        store.bulk_insert(profiles, &[profile("S1", "Al")]).expect("seed");

        let history = registry.describe("StudentClassHistory").expect("model");
        let row = Record::new("StudentClassHistory")
            .with(
                "student",
                Value::Ref(RecordRef {
                    model: "StudentProfile",
                    key: Box::new(Value::Text("S1".into())),
                }),
            )
            .with("academic_year", Value::Integer(2023))
            .with("form_class", Value::Text("2B".into()))
            .with("is_current", Value::Boolean(true));
        store.bulk_insert(history, &[row.clone()]).expect("insert");

        let created: String = conn
            .query_row("SELECT created_at FROM student_class_history", [], |r| r.get(0))
            .expect("created_at");
        assert!(!created.is_empty());
        assert_eq!(store.iterate_all(history, history.ordering).expect("iterate"), vec![row]);
    }

    #[test]
    fn canonical_strings() {
        assert_eq!(Value::Boolean(true).to_string(), "True");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2009, 1, 2).expect("date")).to_string(),
            "2009-01-02"
        );
        let r = Value::Ref(RecordRef {
            model: "StudentProfile",
            key: Box::new(Value::Text("S7".into())),
        });
        assert_eq!(r.to_string(), "S7");
    }
}

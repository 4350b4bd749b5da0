use crate::error::{ExchangeError, Result};
use crate::schema::ModelSchema;
use crate::store::Datastore;
use serde::Serialize;

/// Which models a clean-up touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    App(String),
    Model(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCount {
    pub app: &'static str,
    pub model: &'static str,
    pub count: usize,
}

pub fn select<'r, S: Datastore>(store: &'r S, scope: &Scope) -> Result<Vec<&'r ModelSchema>> {
    let registry = store.registry();
    match scope {
        Scope::All => Ok(registry.models().iter().collect()),
        Scope::App(app) => {
            let models = registry.app_models(app);
            if models.is_empty() {
                return Err(ExchangeError::UnknownModel(format!("app {}", app)));
            }
            Ok(models)
        }
        Scope::Model(name) => Ok(vec![registry.describe(name)?]),
    }
}

/// Record counts per model in scope; nothing is modified.
pub fn survey<S: Datastore>(store: &S, scope: &Scope) -> Result<Vec<ModelCount>> {
    select(store, scope)?
        .into_iter()
        .map(|m| {
            Ok(ModelCount {
                app: m.app,
                model: m.name,
                count: store.count(m)?,
            })
        })
        .collect()
}

/// Deletes every record of the models in scope as one unit, referencing models
/// first. Counts are what each delete removed directly.
pub fn purge<S: Datastore>(store: &S, scope: &Scope) -> Result<Vec<ModelCount>> {
    let selected = select(store, scope)?;
    let ordered = store.registry().dependents_first(&selected);
    let deleted = store.atomic(|s| {
        let mut out = Vec::with_capacity(ordered.len());
        for m in &ordered {
            let count = s.delete_all(m)?;
            out.push(ModelCount {
                app: m.app,
                model: m.name,
                count,
            });
        }
        Ok(out)
    })?;
    for c in deleted.iter().filter(|c| c.count > 0) {
        log::info!("deleted {} records from {}", c.count, c.model);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeSettings;
    use crate::exchange::{import, SourceTable};
    use crate::schema::Registry;
    use crate::store::SqliteStore;
    use crate::{db, models};
    use rusqlite::Connection;

    fn seeded() -> (Connection, Registry) {
        let conn = Connection::open_in_memory().expect("open memory db");
        db::init_schema(&conn).expect("init schema");
        let registry = Registry::build(models::RECORDS).expect("registry");
        {
            let store = SqliteStore::new(&conn, &registry);
            let settings = ExchangeSettings::default();
            let people = SourceTable::from_rows(
                ["student_id", "first_name", "last_name", "date_of_birth", "contact_number"],
                [["S1", "Al", "Chan", "2010-01-01", "555"]],
            );
            let profiles = registry.describe("StudentProfile").expect("model");
            import(&store, profiles, &people, None, &settings).expect("profiles");
            let history = SourceTable::from_rows(
                ["student", "academic_year", "form_class", "is_current"],
                [["S1", "2022", "1A", "False"], ["S1", "2023", "2A", "True"]],
            );
            let classes = registry.describe("StudentClassHistory").expect("model");
            import(&store, classes, &history, None, &settings).expect("history");
        }
        (conn, registry)
    }

    #[test]
    fn survey_counts_without_deleting() {
        let (conn, registry) = seeded();
        let store = SqliteStore::new(&conn, &registry);
        let counts = survey(&store, &Scope::App("records".into())).expect("survey");
        let pairs: Vec<(&str, usize)> = counts.iter().map(|c| (c.model, c.count)).collect();
        assert_eq!(
            pairs,
            vec![
                ("StudentProfile", 1),
                ("StudentClassHistory", 2),
                ("AcademicRecord", 0)
            ]
        );
        assert_eq!(survey(&store, &Scope::All).expect("again"), counts);
    }

    #[test]
    fn purge_all_deletes_dependents_first() {
        let (conn, registry) = seeded();
        let store = SqliteStore::new(&conn, &registry);
        let deleted = purge(&store, &Scope::All).expect("purge");
        let pairs: Vec<(&str, usize)> = deleted.iter().map(|c| (c.model, c.count)).collect();
        assert_eq!(
            pairs,
            vec![
                ("StudentClassHistory", 2),
                ("AcademicRecord", 0),
                ("StudentProfile", 1)
            ]
        );
        assert!(survey(&store, &Scope::All)
            .expect("survey")
            .iter()
            .all(|c| c.count == 0));
    }

    #[test]
    fn purge_single_model_leaves_others() {
        let (conn, registry) = seeded();
        let store = SqliteStore::new(&conn, &registry);
        purge(&store, &Scope::Model("studentclasshistory".into())).expect("purge");
        let profiles = registry.describe("StudentProfile").expect("model");
        assert_eq!(store.count(profiles).expect("count"), 1);
    }

    #[test]
    fn unknown_app_is_an_error() {
        let (conn, registry) = seeded();
        let store = SqliteStore::new(&conn, &registry);
        assert!(survey(&store, &Scope::App("billing".into())).is_err());
    }
}

use crate::ipc::error::{exchange_err, ok};
use crate::ipc::helpers::require_model;
use crate::ipc::types::{AppState, Request};
use crate::schema::ModelSchema;
use crate::store::{Datastore, SqliteStore};
use serde_json::json;

fn model_json(model: &ModelSchema, count: Option<usize>) -> serde_json::Value {
    json!({
        "app": model.app,
        "model": model.name,
        "table": model.table,
        "count": count,
        "fields": model.fields(),
        "generatedFields": model.generated_fields(),
        "ordering": model.ordering,
    })
}

fn handle_models_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut models = Vec::new();
    for m in state.registry.models() {
        // Counts are only available once a workspace is open.
        let count = match state.db.as_ref() {
            Some(conn) => match SqliteStore::new(conn, &state.registry).count(m) {
                Ok(n) => Some(n),
                Err(e) => return exchange_err(&req.id, &e),
            },
            None => None,
        };
        models.push(model_json(m, count));
    }
    ok(
        &req.id,
        json!({ "apps": state.registry.apps(), "models": models }),
    )
}

fn handle_models_describe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let model = match require_model(state, req) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let count = match state.db.as_ref() {
        Some(conn) => match SqliteStore::new(conn, &state.registry).count(model) {
            Ok(n) => Some(n),
            Err(e) => return exchange_err(&req.id, &e),
        },
        None => None,
    };
    ok(&req.id, model_json(model, count))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "models.list" => Some(handle_models_list(state, req)),
        "models.describe" => Some(handle_models_describe(state, req)),
        _ => None,
    }
}

use crate::cleanup::{self, ModelCount, Scope};
use crate::ipc::error::{err, exchange_err, ok};
use crate::ipc::helpers::{require_db, snapshot_if_requested, str_param};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;

fn parse_scope(req: &Request) -> Result<Scope, serde_json::Value> {
    match str_param(req, "scope").map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("all") => Ok(Scope::All),
        Some("app") => str_param(req, "app")
            .map(|a| Scope::App(a.to_string()))
            .ok_or_else(|| err(&req.id, "bad_params", "missing app", None)),
        Some("model") => str_param(req, "model")
            .map(|m| Scope::Model(m.to_string()))
            .ok_or_else(|| err(&req.id, "bad_params", "missing model", None)),
        Some(other) => Err(err(
            &req.id,
            "bad_params",
            "scope must be one of: all, app, model",
            Some(json!({ "scope": other })),
        )),
        None => Err(err(&req.id, "bad_params", "missing scope", None)),
    }
}

fn total(counts: &[ModelCount]) -> usize {
    counts.iter().map(|c| c.count).sum()
}

fn handle_cleanup_survey(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn, &state.registry);
    match cleanup::survey(&store, &scope) {
        Ok(counts) => ok(
            &req.id,
            json!({ "models": counts, "total": total(&counts) }),
        ),
        Err(e) => exchange_err(&req.id, &e),
    }
}

fn handle_cleanup_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match parse_scope(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let backup = match snapshot_if_requested(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn, &state.registry);
    match cleanup::purge(&store, &scope) {
        Ok(deleted) => ok(
            &req.id,
            json!({
                "ok": true,
                "deleted": deleted,
                "total": total(&deleted),
                "backup": backup
            }),
        ),
        Err(e) => exchange_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cleanup.survey" => Some(handle_cleanup_survey(state, req)),
        "cleanup.apply" => Some(handle_cleanup_apply(state, req)),
        _ => None,
    }
}

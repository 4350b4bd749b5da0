use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{load_settings, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_exchange_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match load_settings(conn, req) {
        Ok(settings) => ok(&req.id, json!({ "settings": settings })),
        Err(e) => e,
    }
}

fn handle_exchange_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut settings = match load_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(msg) = settings.apply_patch(patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = settings.save(conn) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    log::debug!("exchange settings updated: {:?}", settings);
    ok(&req.id, json!({ "ok": true, "settings": settings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.exchange.get" => Some(handle_exchange_settings_get(state, req)),
        "settings.exchange.update" => Some(handle_exchange_settings_update(state, req)),
        _ => None,
    }
}

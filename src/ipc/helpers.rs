use crate::backup;
use crate::config::ExchangeSettings;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schema::ModelSchema;
use crate::store::Record;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

/// A trimmed, non-empty string parameter.
pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn require_db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_model<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a ModelSchema, serde_json::Value> {
    let Some(name) = str_param(req, "model") else {
        return Err(err(&req.id, "bad_params", "missing model", None));
    };
    state
        .registry
        .describe(name)
        .map_err(|e| crate::ipc::error::exchange_err(&req.id, &e))
}

pub fn load_settings(conn: &Connection, req: &Request) -> Result<ExchangeSettings, serde_json::Value> {
    ExchangeSettings::load(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

/// `params.workspacePath`, falling back to the selected workspace.
pub fn workspace_path(state: &AppState, req: &Request) -> Option<PathBuf> {
    str_param(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
}

/// Writes a workspace bundle to `params.backupPath` when the caller asked for one.
pub fn snapshot_if_requested(
    state: &AppState,
    req: &Request,
) -> Result<Option<serde_json::Value>, serde_json::Value> {
    let Some(backup_path) = str_param(req, "backupPath") else {
        return Ok(None);
    };
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }
    match backup::export_workspace_bundle(workspace, &PathBuf::from(backup_path)) {
        Ok(summary) => {
            log::info!("workspace snapshot written to {}", backup_path);
            Ok(Some(json!({
                "path": backup_path,
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256
            })))
        }
        Err(e) => Err(err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": backup_path })),
        )),
    }
}

pub fn record_json(model: &ModelSchema, record: &Record) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for f in model.fields() {
        let v = record
            .get(f.name)
            .map(|v| serde_json::Value::String(v.to_string()))
            .unwrap_or(serde_json::Value::Null);
        obj.insert(f.name.to_string(), v);
    }
    serde_json::Value::Object(obj)
}

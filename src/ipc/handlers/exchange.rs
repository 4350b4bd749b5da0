use crate::config::ExchangeSettings;
use crate::exchange::{self, Policy, SourceTable};
use crate::ipc::error::{err, exchange_err, ok};
use crate::ipc::helpers::{
    load_settings, record_json, require_db, require_model, snapshot_if_requested, str_param,
};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::PathBuf;

fn read_source(
    req: &Request,
    settings: &ExchangeSettings,
) -> Result<(String, SourceTable), serde_json::Value> {
    let Some(in_path) = str_param(req, "inPath") else {
        return Err(err(&req.id, "bad_params", "missing inPath", None));
    };
    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return Err(err(
            &req.id,
            "not_found",
            "source file not found",
            Some(json!({ "path": in_path })),
        ));
    }
    let delimiter = settings
        .delimiter_byte()
        .map_err(|e| exchange_err(&req.id, &e))?;
    let table =
        SourceTable::read_path(&src, delimiter).map_err(|e| exchange_err(&req.id, &e))?;
    Ok((in_path.to_string(), table))
}

fn handle_export_model_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let model = match require_model(state, req) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let delimiter = match settings.delimiter_byte() {
        Ok(d) => d,
        Err(e) => return exchange_err(&req.id, &e),
    };
    let out = match str_param(req, "outPath") {
        Some(p) => PathBuf::from(p),
        None => {
            let Some(dir) = settings.export_dir.clone().or_else(|| state.workspace.clone()) else {
                return err(&req.id, "bad_params", "missing outPath", None);
            };
            exchange::default_export_path(&dir, model)
        }
    };

    let store = SqliteStore::new(conn, &state.registry);
    match exchange::export(&store, model, &out, delimiter) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "ok": true,
                "model": summary.model,
                "rowsExported": summary.exported,
                "path": summary.path.map(|p| p.to_string_lossy().to_string())
            }),
        ),
        Err(e) => exchange_err(&req.id, &e),
    }
}

fn handle_preview_model_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let model = match require_model(state, req) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let (in_path, source) = match read_source(req, &settings) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let store = SqliteStore::new(conn, &state.registry);
    let plan = match exchange::plan_import(&store, model, &source, &settings) {
        Ok(p) => p,
        Err(e) => return exchange_err(&req.id, &e),
    };
    let preview_rows: Vec<serde_json::Value> = plan
        .candidates
        .iter()
        .take(settings.preview_limit)
        .map(|c| json!({ "line": c.line, "values": record_json(model, &c.record) }))
        .collect();
    ok(
        &req.id,
        json!({
            "ok": true,
            "planId": plan.id.to_string(),
            "model": plan.model,
            "path": in_path,
            "rowsTotal": plan.rows_total,
            "rowsValid": plan.candidates.len(),
            "rowsRejected": plan.row_errors.len(),
            "existing": plan.existing,
            "needsPolicy": plan.needs_policy(),
            "ignoredColumns": plan.ignored_columns,
            "rowErrors": plan.row_errors,
            "previewRows": preview_rows
        }),
    )
}

fn handle_apply_model_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let policy = match str_param(req, "policy") {
        Some(raw) => match Policy::parse(raw) {
            Some(p) => Some(p),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "policy must be one of: replace, merge, cancel",
                    Some(json!({ "policy": raw })),
                )
            }
        },
        None => None,
    };
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let model = match require_model(state, req) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let settings = match load_settings(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let (in_path, source) = match read_source(req, &settings) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let store = SqliteStore::new(conn, &state.registry);
    let (result, backup) = if str_param(req, "backupPath").is_some() {
        // Snapshot only when the commit is about to wipe existing records.
        let plan = match exchange::plan_import(&store, model, &source, &settings) {
            Ok(p) => p,
            Err(e) => return exchange_err(&req.id, &e),
        };
        let backup = if plan.needs_policy() && policy == Some(Policy::Replace) {
            match snapshot_if_requested(state, req) {
                Ok(b) => b,
                Err(e) => return e,
            }
        } else {
            None
        };
        (exchange::commit_import(&store, model, plan, policy), backup)
    } else {
        (exchange::import(&store, model, &source, policy, &settings), None)
    };
    match result {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "ok": true,
                "importId": outcome.id.to_string(),
                "model": outcome.model,
                "path": in_path,
                "policy": outcome.policy,
                "rowsTotal": outcome.rows_total,
                "imported": outcome.imported,
                "deleted": outcome.deleted,
                "rowsRejected": outcome.row_errors.len(),
                "rowErrors": outcome.row_errors,
                "backup": backup
            }),
        ),
        Err(e) => exchange_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportModelCsv" => Some(handle_export_model_csv(state, req)),
        "exchange.previewModelCsv" => Some(handle_preview_model_csv(state, req)),
        "exchange.applyModelCsv" => Some(handle_apply_model_csv(state, req)),
        _ => None,
    }
}

mod backup;
mod cleanup;
mod config;
mod db;
mod error;
mod exchange;
mod ipc;
mod models;
mod schema;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let registry = match schema::Registry::build(models::RECORDS) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("invalid model registry: {e}");
            std::process::exit(1);
        }
    };
    let mut state = ipc::AppState::new(registry);

    if let Some(ws) = config::workspace_from_env() {
        if let Err(e) = ipc::select_workspace(&mut state, &ws) {
            log::error!("failed to open {}: {e:?}", ws.to_string_lossy());
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("request {} {}", req.id, req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

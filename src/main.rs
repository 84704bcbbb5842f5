mod backup;
mod config;
mod db;
mod fees;
mod ipc;
mod ledger;
mod store;

use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = config::DaemonConfig::from_env();
    config::init_tracing(&cfg);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "feeledgerd starting");

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_ref() {
        match db::open_db(path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.to_string_lossy(), "workspace opened from environment");
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => {
                tracing::error!(workspace = %path.to_string_lossy(), error = %format!("{e:#}"), "failed to open workspace");
            }
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "bad request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };

        let text = match serde_json::to_string(&resp) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "response serialization failed");
                "{\"ok\":false}".to_string()
            }
        };
        if writeln!(stdout, "{}", text).and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }
    tracing::info!("stdin closed; exiting");
}

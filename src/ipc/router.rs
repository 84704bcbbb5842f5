use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    let families: [fn(&mut AppState, &Request) -> Option<serde_json::Value>; 9] = [
        handlers::core::try_handle,
        handlers::schools::try_handle,
        handlers::setup::try_handle,
        handlers::classes::try_handle,
        handlers::fee_types::try_handle,
        handlers::students::try_handle,
        handlers::payments::try_handle,
        handlers::ledger::try_handle,
        handlers::backup::try_handle,
    ];
    for try_handle in families {
        if let Some(resp) = try_handle(state, &req) {
            if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
                tracing::warn!(
                    id = %req.id,
                    method = %req.method,
                    code = resp.pointer("/error/code").and_then(|v| v.as_str()).unwrap_or(""),
                    "request failed"
                );
            }
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

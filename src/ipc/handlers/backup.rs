use crate::backup::{self, SchoolTally};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn target_workspace(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    optional_str(&req.params, "workspacePath")?
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn existing_file(req: &Request, key: &str) -> Result<PathBuf, HandlerErr> {
    let path = PathBuf::from(required_str(req, key)?);
    if !path.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": path.to_string_lossy() })));
    }
    Ok(path)
}

fn io_failed(e: anyhow::Error, path: &Path) -> HandlerErr {
    HandlerErr::new("io_failed", format!("{e:#}"))
        .with_details(json!({ "path": path.to_string_lossy() }))
}

fn export_bundle(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let workspace = state
        .workspace
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let out = PathBuf::from(required_str(req, "outPath")?);

    let export = backup::export_workspace_bundle(conn, workspace, &out)
        .map_err(|e| io_failed(e, &out))?;
    tracing::info!(
        path = %out.to_string_lossy(),
        schools = export.schools.len(),
        sha256 = %export.db_sha256,
        "workspace bundle exported"
    );
    Ok(json!({
        "path": out.to_string_lossy(),
        "bundleFormat": export.bundle_format,
        "dbSha256": export.db_sha256,
        "schools": export.schools,
    }))
}

fn inspect_bundle(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let src = existing_file(req, "inPath")?;
    let info = backup::inspect_bundle(&src).map_err(|e| io_failed(e, &src))?;
    Ok(json!({
        "bundleFormat": info.bundle_format,
        "exportedAt": info.exported_at,
        "schools": info.schools,
    }))
}

/// Reopens the workspace left in place by a failed import. When even that
/// fails the workspace is deselected rather than left without a handle.
fn restore_previous(state: &mut AppState, workspace: &Path) {
    match db::open_db(workspace) {
        Ok(conn) => state.db = Some(conn),
        Err(e) => {
            tracing::error!(
                workspace = %workspace.to_string_lossy(),
                error = %format!("{e:#}"),
                "failed to reopen workspace after import error"
            );
            state.workspace = None;
            state.db = None;
            state.school_id = None;
        }
    }
}

/// The selected school survives an import only if the restored roster has it.
fn carried_school(selected: Option<String>, schools: &[SchoolTally]) -> Option<String> {
    selected.filter(|id| schools.iter().any(|s| &s.id == id))
}

fn import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let src = existing_file(req, "inPath")?;
    let workspace = target_workspace(state, req)?;

    // Release the handle before the file underneath it is replaced.
    let replacing_open = state.workspace.as_deref() == Some(workspace.as_path());
    if replacing_open {
        state.db = None;
    }

    let import = match backup::import_workspace_bundle(&src, &workspace) {
        Ok(v) => v,
        Err(e) => {
            if replacing_open {
                restore_previous(state, &workspace);
            }
            return Err(io_failed(e, &src));
        }
    };

    let conn = match db::open_db(&workspace) {
        Ok(c) => c,
        Err(e) => {
            state.workspace = None;
            state.db = None;
            state.school_id = None;
            return Err(HandlerErr::db("db_open_failed", format!("{e:#}")));
        }
    };
    let selected = if replacing_open {
        state.school_id.take()
    } else {
        None
    };
    state.workspace = Some(workspace.clone());
    state.db = Some(conn);
    state.school_id = carried_school(selected, &import.schools);
    tracing::info!(
        workspace = %workspace.to_string_lossy(),
        format = %import.bundle_format_detected,
        schools = import.schools.len(),
        "workspace bundle imported"
    );

    Ok(json!({
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbSha256": import.db_sha256,
        "schools": import.schools,
        "schoolId": state.school_id,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, req),
        "backup.inspectBundle" => inspect_bundle(req),
        "backup.importWorkspaceBundle" => import_bundle(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(id: &str) -> SchoolTally {
        SchoolTally {
            id: id.to_string(),
            name: id.to_uppercase(),
            classes: 0,
            students: 0,
            fee_types: 0,
            payments: 0,
            total_paid: 0.0,
        }
    }

    #[test]
    fn selection_survives_only_when_the_school_was_restored() {
        let schools = vec![tally("a"), tally("b")];
        assert_eq!(carried_school(Some("b".into()), &schools), Some("b".into()));
        assert_eq!(carried_school(Some("z".into()), &schools), None);
        assert_eq!(carried_school(None, &schools), None);
    }
}

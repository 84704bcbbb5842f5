use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, school_scope};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    match scope.list_classes() {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(_) => return err(&req.id, "bad_params", "class name cannot be empty", None),
    };

    match scope.class_name_taken(&name) {
        Ok(true) => {
            return err(
                &req.id,
                "conflict",
                format!(
                    "class \"{}\" already exists; choose a different name",
                    name
                ),
                Some(json!({ "name": name })),
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match scope.insert_class(&name) {
        Ok(class_id) => {
            tracing::info!(school_id = scope.school_id(), class_id = %class_id, "class created");
            ok(&req.id, json!({ "classId": class_id, "name": name }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        ),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let name = match scope.class_name(&class_id) {
        Ok(Some(n)) => n,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match scope.class_student_count(&class_id) {
        Ok(0) => {}
        Ok(n) => {
            return err(
                &req.id,
                "conflict",
                format!("class \"{}\" still has {} student(s)", name, n),
                Some(json!({ "studentCount": n })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = scope.delete_class(&class_id) {
        return err(
            &req.id,
            "db_delete_failed",
            format!("{e:#}"),
            Some(json!({ "table": "classes" })),
        );
    }
    tracing::info!(school_id = scope.school_id(), class_id = %class_id, "class deleted");
    ok(&req.id, json!({ "ok": true, "name": name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "schools": [] }));
    };
    match store::list_schools(conn) {
        Ok(schools) => ok(&req.id, json!({ "schools": schools })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store::school_name_taken(conn, &name) {
        Ok(true) => {
            return err(
                &req.id,
                "conflict",
                format!("school \"{}\" already exists", name),
                None,
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    match store::insert_school(conn, &name) {
        Ok(school_id) => {
            tracing::info!(school_id = %school_id, "school created");
            ok(&req.id, json!({ "schoolId": school_id, "name": name }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        ),
    }
}

fn handle_schools_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let school_id = match required_str(req, "schoolId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store::school_exists(conn, &school_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "school not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    tracing::info!(school_id = %school_id, "school selected");
    state.school_id = Some(school_id.clone());
    ok(&req.id, json!({ "schoolId": school_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(handle_schools_list(state, req)),
        "schools.create" => Some(handle_schools_create(state, req)),
        "schools.select" => Some(handle_schools_select(state, req)),
        _ => None,
    }
}

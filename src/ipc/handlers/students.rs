use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_amount, optional_str, required_str, school_scope};
use crate::ipc::types::{AppState, Request};
use crate::store::{AssignmentDraft, SchoolScope, StudentDraft};
use serde_json::{json, Value};

fn ensure_class(scope: &SchoolScope<'_>, class_id: Option<&str>) -> Result<(), HandlerErr> {
    let Some(class_id) = class_id else {
        return Ok(());
    };
    match scope.class_name(class_id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id }))),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

fn ensure_student(scope: &SchoolScope<'_>, student_id: &str) -> Result<(), HandlerErr> {
    match scope.get_student(student_id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(HandlerErr::new("not_found", "student not found")),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

fn ensure_fee_type(scope: &SchoolScope<'_>, fee_type_id: &str) -> Result<(), HandlerErr> {
    match scope.get_fee_type(fee_type_id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(HandlerErr::new("not_found", "fee type not found")),
        Err(e) => Err(HandlerErr::db("db_query_failed", e)),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match optional_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match scope.list_students(class_id.as_deref()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn parse_student_draft(scope: &SchoolScope<'_>, params: &Value) -> Result<StudentDraft, HandlerErr> {
    let name = optional_str(params, "name")?
        .ok_or_else(|| HandlerErr::bad_params("student name is required"))?;
    let class_id = optional_str(params, "classId")?;
    ensure_class(scope, class_id.as_deref())?;
    Ok(StudentDraft {
        name,
        class_id,
        roll_no: optional_str(params, "rollNo")?,
        academic_year: optional_str(params, "academicYear")?,
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let draft = match parse_student_draft(&scope, &req.params) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    match scope.insert_student(&draft) {
        Ok(student_id) => {
            tracing::info!(school_id = scope.school_id(), student_id = %student_id, "student created");
            ok(&req.id, json!({ "studentId": student_id }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn apply_student_patch(
    scope: &SchoolScope<'_>,
    draft: &mut StudentDraft,
    patch: &serde_json::Map<String, Value>,
) -> Result<(), HandlerErr> {
    let patch_value = Value::Object(patch.clone());
    for key in patch.keys() {
        match key.as_str() {
            "name" => {
                draft.name = optional_str(&patch_value, "name")?
                    .ok_or_else(|| HandlerErr::bad_params("student name is required"))?;
            }
            "classId" => {
                let class_id = optional_str(&patch_value, "classId")?;
                ensure_class(scope, class_id.as_deref())?;
                draft.class_id = class_id;
            }
            "rollNo" => draft.roll_no = optional_str(&patch_value, "rollNo")?,
            "academicYear" => draft.academic_year = optional_str(&patch_value, "academicYear")?,
            other => {
                return Err(HandlerErr::bad_params(format!("unknown student field: {}", other)))
            }
        }
    }
    Ok(())
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let current = match scope.get_student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut draft = StudentDraft {
        name: current.name,
        class_id: current.class_id,
        roll_no: current.roll_no,
        academic_year: current.academic_year,
    };
    if let Err(e) = apply_student_patch(&scope, &mut draft, patch) {
        return e.response(&req.id);
    }
    if let Err(e) = scope.update_student(&student_id, &draft) {
        return err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = ensure_student(&scope, &student_id) {
        return e.response(&req.id);
    }
    if let Err(e) = scope.delete_student(&student_id) {
        return err(
            &req.id,
            "db_delete_failed",
            format!("{e:#}"),
            Some(json!({ "table": "students" })),
        );
    }
    tracing::info!(school_id = scope.school_id(), student_id = %student_id, "student deleted");
    ok(&req.id, json!({ "ok": true }))
}

fn parse_assignment(
    scope: &SchoolScope<'_>,
    req: &Request,
) -> Result<(String, String, AssignmentDraft), HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let fee_type_id = required_str(req, "feeTypeId")?;
    ensure_student(scope, &student_id)?;
    ensure_fee_type(scope, &fee_type_id)?;
    let draft = AssignmentDraft {
        assigned_amount: optional_amount(&req.params, "assignedAmount")?,
        discount: optional_amount(&req.params, "discount")?.unwrap_or(0.0),
        discount_description: optional_str(&req.params, "discountDescription")?,
    };
    Ok((student_id, fee_type_id, draft))
}

fn handle_student_fees_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let (student_id, fee_type_id, draft) = match parse_assignment(&scope, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match scope.upsert_assignment(&student_id, &fee_type_id, &draft) {
        Ok(assignment_id) => {
            tracing::info!(
                school_id = scope.school_id(),
                student_id = %student_id,
                fee_type_id = %fee_type_id,
                "fee assigned"
            );
            ok(&req.id, json!({ "assignmentId": assignment_id }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "student_fee_types" })),
        ),
    }
}

fn parse_class_assignment(
    scope: &SchoolScope<'_>,
    req: &Request,
) -> Result<(String, String), HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let fee_type_id = required_str(req, "feeTypeId")?;
    ensure_class(scope, Some(class_id.as_str()))?;
    ensure_fee_type(scope, &fee_type_id)?;
    Ok((class_id, fee_type_id))
}

fn handle_student_fees_assign_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let (class_id, fee_type_id) = match parse_class_assignment(&scope, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match scope.assign_to_class(&class_id, &fee_type_id) {
        Ok(assigned) => {
            tracing::info!(
                school_id = scope.school_id(),
                class_id = %class_id,
                fee_type_id = %fee_type_id,
                assigned,
                "fee assigned to class"
            );
            ok(&req.id, json!({ "assigned": assigned }))
        }
        Err(e) => err(
            &req.id,
            "db_tx_failed",
            format!("{e:#}"),
            Some(json!({ "table": "student_fee_types" })),
        ),
    }
}

fn handle_student_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = ensure_student(&scope, &student_id) {
        return e.response(&req.id);
    }
    match scope.student_assignments(&student_id) {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_student_fees_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let fee_type_id = match required_str(req, "feeTypeId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match scope.remove_assignment(&student_id, &fee_type_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "fee assignment not found", None),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            format!("{e:#}"),
            Some(json!({ "table": "student_fee_types" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "studentFees.assign" => Some(handle_student_fees_assign(state, req)),
        "studentFees.assignClass" => Some(handle_student_fees_assign_class(state, req)),
        "studentFees.list" => Some(handle_student_fees_list(state, req)),
        "studentFees.remove" => Some(handle_student_fees_remove(state, req)),
        _ => None,
    }
}

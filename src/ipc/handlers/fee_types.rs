use crate::fees;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    optional_amount, optional_date, optional_str, parse_today, required_str, school_scope,
    string_list,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{FeeTypeDraft, FeeTypeRecord};
use serde_json::{json, Value};

/// Picker years at or below this mean "no start date".
const PICKER_UNSET_YEAR: i64 = 1900;

fn picker_part(parts: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match parts.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("applicableFrom.{} must be an integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("applicableFrom.{} must be an integer", key))),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "applicableFrom.{} must be an integer",
            key
        ))),
    }
}

/// `applicableFrom` arrives either as a `YYYY-MM-DD` string or as date-picker
/// parts `{ day, month, year }` with a 0-based month.
fn parse_applicable_from(params: &Value) -> Result<Option<String>, HandlerErr> {
    let Some(parts @ Value::Object(_)) = params.get("applicableFrom") else {
        return optional_date(params, "applicableFrom");
    };
    let year = picker_part(parts, "year")?;
    let Some(year) = year.filter(|y| *y > PICKER_UNSET_YEAR) else {
        return Ok(None);
    };
    let day = picker_part(parts, "day")?.unwrap_or(1);
    let month = picker_part(parts, "month")?.unwrap_or(0);
    fees::format_full_date(day, month, year).map(Some).ok_or_else(|| {
        HandlerErr::bad_params(
            "invalid 'Applicable From' date; check day, month, and year",
        )
        .with_details(json!({ "applicableFrom": parts }))
    })
}

fn record_to_draft(rec: &FeeTypeRecord) -> FeeTypeDraft {
    FeeTypeDraft {
        name: rec.fee.name.clone(),
        description: rec.description.clone(),
        default_amount: rec.fee.default_amount.unwrap_or(0.0),
        applicable_from: rec.fee.applicable_from.clone(),
        applicable_until: rec.fee.applicable_until.clone(),
        scheduled_date: rec.fee.scheduled_date.clone(),
        class_ids: rec.classes.iter().map(|c| c.id.clone()).collect(),
    }
}

/// Builds a draft from request params. With a `base`, keys absent from the
/// params keep the base value; without one, absent keys take form defaults.
fn parse_draft(params: &Value, base: Option<&FeeTypeDraft>) -> Result<FeeTypeDraft, HandlerErr> {
    let has = |key: &str| params.get(key).is_some();

    let name = if has("name") || base.is_none() {
        optional_str(params, "name")?
            .ok_or_else(|| HandlerErr::bad_params("fee type name is required"))?
    } else {
        base.map(|b| b.name.clone()).unwrap_or_default()
    };
    let description = match base {
        Some(b) if !has("description") => b.description.clone(),
        _ => optional_str(params, "description")?,
    };
    let default_amount = match base {
        Some(b) if !has("defaultAmount") => b.default_amount,
        _ => optional_amount(params, "defaultAmount")?.unwrap_or(0.0),
    };
    let applicable_from = match base {
        Some(b) if !has("applicableFrom") => b.applicable_from.clone(),
        _ => parse_applicable_from(params)?,
    };
    let applicable_until = match base {
        Some(b) if !has("applicableUntil") => b.applicable_until.clone(),
        _ => optional_date(params, "applicableUntil")?,
    };
    let scheduled_date = match base {
        Some(b) if !has("scheduledDate") => b.scheduled_date.clone(),
        _ => optional_date(params, "scheduledDate")?,
    };
    let class_ids = match string_list(params, "classIds")? {
        Some(ids) => ids,
        None => base.map(|b| b.class_ids.clone()).unwrap_or_default(),
    };

    if let (Some(from), Some(until)) = (
        applicable_from.as_deref().and_then(fees::parse_ymd),
        applicable_until.as_deref().and_then(fees::parse_ymd),
    ) {
        if until < from {
            return Err(HandlerErr::bad_params(
                "applicableUntil must not be earlier than applicableFrom",
            ));
        }
    }

    Ok(FeeTypeDraft {
        name,
        description,
        default_amount,
        applicable_from,
        applicable_until,
        scheduled_date,
        class_ids,
    })
}

fn handle_fee_types_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let today = match parse_today(req) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    let records = match scope.list_fee_types() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let fee_types: Vec<Value> = records
        .into_iter()
        .map(|rec| {
            let is_active = fees::is_within_window(&rec.fee, today);
            let mut v = json!(rec);
            v["isActive"] = Value::Bool(is_active);
            v
        })
        .collect();
    ok(
        &req.id,
        json!({ "feeTypes": fee_types, "today": today.format("%Y-%m-%d").to_string() }),
    )
}

fn handle_fee_types_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let draft = match parse_draft(&req.params, None) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    match scope.insert_fee_type(&draft) {
        Ok(fee_type_id) => {
            tracing::info!(
                school_id = scope.school_id(),
                fee_type_id = %fee_type_id,
                classes = draft.class_ids.len(),
                "fee type created"
            );
            ok(&req.id, json!({ "feeTypeId": fee_type_id, "name": draft.name }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "fee_types" })),
        ),
    }
}

fn handle_fee_types_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let fee_type_id = match required_str(req, "feeTypeId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let existing = match scope.get_fee_type(&fee_type_id) {
        Ok(Some(rec)) => rec,
        Ok(None) => return err(&req.id, "not_found", "fee type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let base = record_to_draft(&existing);
    let draft = match parse_draft(&req.params, Some(&base)) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = scope.update_fee_type(&fee_type_id, &draft) {
        return err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "table": "fee_types" })),
        );
    }
    tracing::info!(school_id = scope.school_id(), fee_type_id = %fee_type_id, "fee type updated");
    ok(&req.id, json!({ "ok": true, "feeTypeId": fee_type_id }))
}

fn handle_fee_types_duplicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let fee_type_id = match required_str(req, "feeTypeId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let existing = match scope.get_fee_type(&fee_type_id) {
        Ok(Some(rec)) => rec,
        Ok(None) => return err(&req.id, "not_found", "fee type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut draft = record_to_draft(&existing);
    draft.name = format!("Copy of {}", existing.fee.name);
    match scope.insert_fee_type(&draft) {
        Ok(new_id) => {
            tracing::info!(
                school_id = scope.school_id(),
                source_id = %fee_type_id,
                fee_type_id = %new_id,
                "fee type duplicated"
            );
            ok(&req.id, json!({ "feeTypeId": new_id, "name": draft.name }))
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "fee_types" })),
        ),
    }
}

fn handle_fee_types_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let fee_type_id = match required_str(req, "feeTypeId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let existing = match scope.get_fee_type(&fee_type_id) {
        Ok(Some(rec)) => rec,
        Ok(None) => return err(&req.id, "not_found", "fee type not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Deletion needs the exact name typed back.
    let confirm = req.params.get("confirmName").and_then(|v| v.as_str());
    if confirm != Some(existing.fee.name.as_str()) {
        return err(
            &req.id,
            "confirm_mismatch",
            "name did not match; deletion aborted",
            Some(json!({ "expected": existing.fee.name })),
        );
    }

    match scope.delete_fee_type(&fee_type_id) {
        Ok(detached) => {
            tracing::info!(
                school_id = scope.school_id(),
                fee_type_id = %fee_type_id,
                detached,
                "fee type deleted"
            );
            ok(
                &req.id,
                json!({ "ok": true, "detachedAssignments": detached }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            format!("{e:#}"),
            Some(json!({ "table": "fee_types" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feeTypes.list" => Some(handle_fee_types_list(state, req)),
        "feeTypes.create" => Some(handle_fee_types_create(state, req)),
        "feeTypes.update" => Some(handle_fee_types_update(state, req)),
        "feeTypes.duplicate" => Some(handle_fee_types_duplicate(state, req)),
        "feeTypes.delete" => Some(handle_fee_types_delete(state, req)),
        _ => None,
    }
}

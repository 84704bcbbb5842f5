use crate::fees::{self, FeeView};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::store::SchoolScope;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Data access for the selected school. Fails when no workspace or school is
/// selected.
pub fn school_scope(state: &AppState) -> Result<SchoolScope<'_>, HandlerErr> {
    let conn = db_conn(state)?;
    let school_id = state
        .school_id
        .as_deref()
        .ok_or_else(|| HandlerErr::new("no_school", "select a school first"))?;
    Ok(SchoolScope::new(conn, school_id))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed string value; empty strings and nulls read as `None`.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

/// Accepts a JSON number or a numeric string (form inputs arrive as text).
/// Empty strings and nulls read as `None`.
pub fn optional_amount(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    let n = match params.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match n {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(HandlerErr::bad_params(format!(
            "{} must be a valid non-negative number or empty",
            key
        ))
        .with_details(json!({ key: params.get(key) }))),
    }
}

/// Strict `YYYY-MM-DD` value normalized to zero-padded form.
pub fn optional_date(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = optional_str(params, key)? else {
        return Ok(None);
    };
    match fees::parse_ymd(&raw) {
        Some(d) => Ok(Some(d.format("%Y-%m-%d").to_string())),
        None => Err(HandlerErr::bad_params(format!(
            "{} must be a YYYY-MM-DD date",
            key
        ))
        .with_details(json!({ key: raw }))),
    }
}

/// The reference day for applicability checks. Defaults to the current UTC
/// date.
pub fn parse_today(req: &Request) -> Result<NaiveDate, HandlerErr> {
    match optional_str(&req.params, "today")? {
        None => Ok(chrono::Utc::now().date_naive()),
        Some(raw) => fees::parse_ymd(&raw).ok_or_else(|| {
            HandlerErr::bad_params("today must be a YYYY-MM-DD date")
                .with_details(json!({ "today": raw }))
        }),
    }
}

pub fn parse_fee_view(req: &Request, default: FeeView) -> Result<FeeView, HandlerErr> {
    match optional_str(&req.params, "feeView")? {
        None => Ok(default),
        Some(raw) => FeeView::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("feeView must be one of: total, due")
                .with_details(json!({ "feeView": raw }))
        }),
    }
}

pub fn string_list(params: &Value, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Some(s) = item.as_str() else {
                    return Err(HandlerErr::bad_params(format!(
                        "{} must be an array of strings",
                        key
                    )));
                };
                if !out.iter().any(|x: &String| x == s) {
                    out.push(s.to_string());
                }
            }
            Ok(Some(out))
        }
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be an array of strings",
            key
        ))),
    }
}

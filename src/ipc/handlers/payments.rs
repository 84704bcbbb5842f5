use crate::fees::{self, Payment};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{optional_str, required_str, school_scope};
use crate::ipc::types::{AppState, Request};
use crate::store::SchoolScope;
use serde_json::{json, Value};

pub const PAYMENT_MODES: [&str; 7] = [
    "cash",
    "cheque",
    "bank_transfer",
    "online",
    "upi",
    "card",
    "other",
];

fn parse_payment(scope: &SchoolScope<'_>, req: &Request) -> Result<(String, Payment), HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    match scope.get_student(&student_id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(HandlerErr::new("not_found", "student not found")),
        Err(e) => return Err(HandlerErr::db("db_query_failed", e)),
    }

    let raw_date = required_str(req, "date")?;
    let date = fees::parse_ymd(&raw_date).ok_or_else(|| {
        HandlerErr::bad_params("date must be a YYYY-MM-DD date")
            .with_details(json!({ "date": raw_date }))
    })?;

    let amount_paid = match req.params.get("amountPaid") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite() && *v > 0.0)
    .ok_or_else(|| HandlerErr::bad_params("amountPaid must be a number greater than 0"))?;

    let mode = required_str(req, "modeOfPayment")?.to_ascii_lowercase();
    if !PAYMENT_MODES.contains(&mode.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "modeOfPayment must be one of: {}",
            PAYMENT_MODES.join(", ")
        )));
    }

    let receipt_number = optional_str(&req.params, "receiptNumber")?;
    if let Some(receipt) = receipt_number.as_deref() {
        match scope.receipt_taken(receipt) {
            Ok(false) => {}
            Ok(true) => {
                return Err(HandlerErr::new(
                    "conflict",
                    format!("receipt number {} is already recorded", receipt),
                )
                .with_details(json!({ "receiptNumber": receipt })))
            }
            Err(e) => return Err(HandlerErr::db("db_query_failed", e)),
        }
    }

    Ok((
        student_id,
        Payment {
            date: date.format("%Y-%m-%d").to_string(),
            amount_paid,
            mode_of_payment: mode,
            receipt_number,
        },
    ))
}

fn handle_payments_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let (student_id, payment) = match parse_payment(&scope, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let recorded_at = chrono::Utc::now().to_rfc3339();
    match scope.insert_payment(&student_id, &payment, &recorded_at) {
        Ok(payment_id) => {
            tracing::info!(
                school_id = scope.school_id(),
                student_id = %student_id,
                payment_id = %payment_id,
                amount = payment.amount_paid,
                "payment recorded"
            );
            ok(
                &req.id,
                json!({ "paymentId": payment_id, "recordedAt": recorded_at }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "payments" })),
        ),
    }
}

fn handle_payments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match scope.get_student(&student_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let mut payments = match scope.student_payments(&student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    fees::sort_newest_first(&mut payments, |r| &r.payment);
    let total_paid: f64 = payments.iter().map(|p| p.payment.amount_paid).sum();
    ok(
        &req.id,
        json!({ "payments": payments, "totalPaid": total_paid }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.record" => Some(handle_payments_record(state, req)),
        "payments.list" => Some(handle_payments_list(state, req)),
        _ => None,
    }
}

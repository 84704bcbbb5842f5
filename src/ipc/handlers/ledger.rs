use crate::fees::{self, FeeView};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup::{self, LedgerPrefs};
use crate::ipc::helpers::{db_conn, optional_str, parse_fee_view, parse_today, required_str, school_scope};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, CsvOptions, LedgerRow};
use crate::store::SchoolScope;
use chrono::NaiveDate;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerView {
    School,
    Class,
}

impl LedgerView {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "school" => Some(Self::School),
            "class" => Some(Self::Class),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::School => "school",
            Self::Class => "class",
        }
    }
}

/// What the master ledger is currently showing.
struct Selection {
    view: LedgerView,
    class_id: Option<String>,
    search: String,
    fee_view: FeeView,
    today: NaiveDate,
}

impl Selection {
    /// Class filter applied to the student query.
    fn class_filter(&self) -> Option<&str> {
        match self.view {
            LedgerView::Class => self.class_id.as_deref(),
            LedgerView::School => None,
        }
    }
}

fn load_prefs(state: &AppState) -> Result<LedgerPrefs, HandlerErr> {
    let conn = db_conn(state)?;
    setup::ledger_prefs(conn).map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn default_view(state: &AppState) -> Result<LedgerView, HandlerErr> {
    let conn = db_conn(state)?;
    let saved = setup::load_section(conn, setup::SetupSection::Ledger)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(saved
        .get("defaultView")
        .and_then(|v| v.as_str())
        .and_then(LedgerView::parse)
        .unwrap_or(LedgerView::School))
}

fn parse_selection(state: &AppState, req: &Request, prefs: &LedgerPrefs) -> Result<Selection, HandlerErr> {
    let view = match optional_str(&req.params, "view")? {
        Some(raw) => LedgerView::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("view must be one of: school, class")
                .with_details(json!({ "view": raw }))
        })?,
        None => default_view(state)?,
    };
    Ok(Selection {
        view,
        class_id: optional_str(&req.params, "classId")?,
        search: optional_str(&req.params, "search")?.unwrap_or_default(),
        fee_view: parse_fee_view(req, prefs.default_fee_view)?,
        today: parse_today(req)?,
    })
}

fn load_rows(scope: &SchoolScope<'_>, sel: &Selection) -> Result<Vec<LedgerRow>, HandlerErr> {
    if let Some(class_id) = sel.class_filter() {
        match scope.class_name(class_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(HandlerErr::new("not_found", "class not found")
                    .with_details(json!({ "classId": class_id })))
            }
            Err(e) => return Err(HandlerErr::db("db_query_failed", e)),
        }
    }
    let students = scope
        .load_ledger_students(sel.class_filter())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = ledger::build_rows(&students, sel.fee_view, sel.today);
    Ok(ledger::filter_rows(rows, &sel.search))
}

fn handle_ledger_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefs = match load_prefs(state) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let fee_view = match parse_fee_view(req, prefs.default_fee_view) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let today = match parse_today(req) {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    let student = match scope.get_student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let assignments = match scope.student_assignments(&student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut records = match scope.student_payments(&student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let payments: Vec<fees::Payment> = records.iter().map(|r| r.payment.clone()).collect();

    let summary = fees::aggregate(&assignments, &payments, today);
    let balance = summary.balance(fee_view);
    let status = summary.status(fee_view);
    let last_payment = fees::last_payment(&payments).cloned();

    fees::sort_newest_first(&mut records, |r| &r.payment);

    ok(
        &req.id,
        json!({
            "student": student,
            "feeView": fee_view.as_str(),
            "today": today.format("%Y-%m-%d").to_string(),
            "totalAssigned": summary.total_assigned,
            "currentlyDue": summary.total_due,
            "fees": summary.fees_for(fee_view),
            "totalPaid": summary.total_paid,
            "balance": balance,
            "isAdvance": fees::is_advance(balance),
            "status": status,
            "statusLabel": status.label(),
            "components": summary.components,
            "payments": records,
            "lastPayment": last_payment,
        }),
    )
}

fn handle_ledger_rows(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefs = match load_prefs(state) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let sel = match parse_selection(state, req, &prefs) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let rows = match load_rows(&scope, &sel) {
        Ok(r) => r,
        Err(e) => return e.response(&req.id),
    };

    let fees_total: f64 = rows.iter().map(|r| r.fees).sum();
    let paid_total: f64 = rows.iter().map(|r| r.total_paid).sum();
    ok(
        &req.id,
        json!({
            "view": sel.view.as_str(),
            "classId": sel.class_filter(),
            "feeView": sel.fee_view.as_str(),
            "today": sel.today.format("%Y-%m-%d").to_string(),
            "currencyLabel": prefs.currency_label,
            "totals": {
                "students": rows.len(),
                "fees": fees_total,
                "paid": paid_total,
                "balance": fees_total - paid_total,
            },
            "rows": rows,
        }),
    )
}

fn handle_ledger_class_groups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefs = match load_prefs(state) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let sel = match parse_selection(state, req, &prefs) {
        Ok(s) => Selection {
            view: LedgerView::School,
            ..s
        },
        Err(e) => return e.response(&req.id),
    };
    let rows = match load_rows(&scope, &sel) {
        Ok(r) => r,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "feeView": sel.fee_view.as_str(),
            "today": sel.today.format("%Y-%m-%d").to_string(),
            "groups": ledger::group_by_class(&rows),
        }),
    )
}

fn handle_ledger_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefs = match load_prefs(state) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let scope = match school_scope(state) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let sel = match parse_selection(state, req, &prefs) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let out_path = match (
        optional_str(&req.params, "outPath"),
        optional_str(&req.params, "outDir"),
    ) {
        (Ok(Some(p)), _) => PathBuf::from(p),
        (Ok(None), Ok(Some(dir))) => PathBuf::from(dir).join(ledger::export_file_name(
            &prefs.filename_prefix,
            sel.view.as_str(),
            sel.class_filter(),
            sel.fee_view,
            sel.today,
        )),
        (Ok(None), Ok(None)) => {
            return err(&req.id, "bad_params", "missing outPath or outDir", None)
        }
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };
    let rows = match load_rows(&scope, &sel) {
        Ok(r) => r,
        Err(e) => return e.response(&req.id),
    };
    if rows.is_empty() {
        return err(&req.id, "bad_params", "no data to export", None);
    }

    let opts = CsvOptions {
        currency_label: prefs.currency_label.clone(),
        include_academic_year: prefs.include_academic_year,
    };
    let csv = ledger::render_csv(&rows, sel.fee_view, &opts);
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::write(&out_path, csv.as_bytes()) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path.to_string_lossy() })),
        );
    }
    tracing::info!(
        school_id = scope.school_id(),
        path = %out_path.to_string_lossy(),
        rows = rows.len(),
        "ledger exported"
    );
    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "rowCount": rows.len(),
            "bytes": csv.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ledger.student" => Some(handle_ledger_student(state, req)),
        "ledger.rows" => Some(handle_ledger_rows(state, req)),
        "ledger.classGroups" => Some(handle_ledger_class_groups(state, req)),
        "ledger.exportCsv" => Some(handle_ledger_export_csv(state, req)),
        _ => None,
    }
}

use crate::fees::{self, FeeView, Payment, PaymentStatus, StudentFeeAssignment};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub class_id: Option<String>,
    pub class_name: Option<String>,
    pub roll_no: Option<String>,
    pub academic_year: Option<String>,
}

/// Everything the ledger needs about one student, already loaded.
#[derive(Debug, Clone)]
pub struct LedgerStudent {
    pub student: StudentRecord,
    pub assignments: Vec<StudentFeeAssignment>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub student_id: String,
    pub name: String,
    pub class_id: Option<String>,
    pub class_name: String,
    pub roll_no: Option<String>,
    pub academic_year: Option<String>,
    pub total_assigned: f64,
    pub currently_due: f64,
    pub fees: f64,
    pub total_paid: f64,
    pub balance: f64,
    pub is_advance: bool,
    pub status: PaymentStatus,
    pub status_label: &'static str,
    pub last_payment: Option<Payment>,
}

pub fn build_row(s: &LedgerStudent, view: FeeView, today: NaiveDate) -> LedgerRow {
    let summary = fees::aggregate(&s.assignments, &s.payments, today);
    let balance = summary.balance(view);
    let status = summary.status(view);
    LedgerRow {
        student_id: s.student.id.clone(),
        name: s.student.name.clone(),
        class_id: s.student.class_id.clone(),
        class_name: s
            .student
            .class_name
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        roll_no: s.student.roll_no.clone(),
        academic_year: s.student.academic_year.clone(),
        total_assigned: summary.total_assigned,
        currently_due: summary.total_due,
        fees: summary.fees_for(view),
        total_paid: summary.total_paid,
        balance,
        is_advance: fees::is_advance(balance),
        status,
        status_label: status.badge(),
        last_payment: fees::last_payment(&s.payments).cloned(),
    }
}

pub fn build_rows(students: &[LedgerStudent], view: FeeView, today: NaiveDate) -> Vec<LedgerRow> {
    students.iter().map(|s| build_row(s, view, today)).collect()
}

/// Case-insensitive substring match over name, roll number and class name.
/// An empty term matches everything.
pub fn matches_search(row: &LedgerRow, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    row.name.to_lowercase().contains(&term)
        || row
            .roll_no
            .as_deref()
            .map(|r| r.to_lowercase().contains(&term))
            .unwrap_or(false)
        || row.class_name.to_lowercase().contains(&term)
}

pub fn filter_rows(rows: Vec<LedgerRow>, term: &str) -> Vec<LedgerRow> {
    rows.into_iter().filter(|r| matches_search(r, term)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub class_id: Option<String>,
    pub class_name: String,
    pub student_count: usize,
    pub fees: f64,
    pub paid: f64,
    pub balance: f64,
    pub is_advance: bool,
    pub unpaid_count: usize,
    pub partially_paid_count: usize,
    pub paid_count: usize,
    pub no_fees_due_count: usize,
}

fn compare_class_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// School overview: one group per class name, sorted by name.
pub fn group_by_class(rows: &[LedgerRow]) -> Vec<ClassGroup> {
    let mut groups: Vec<ClassGroup> = Vec::new();
    for row in rows {
        let idx = match groups.iter().position(|g| g.class_name == row.class_name) {
            Some(i) => i,
            None => {
                groups.push(ClassGroup {
                    class_id: row.class_id.clone(),
                    class_name: row.class_name.clone(),
                    student_count: 0,
                    fees: 0.0,
                    paid: 0.0,
                    balance: 0.0,
                    is_advance: false,
                    unpaid_count: 0,
                    partially_paid_count: 0,
                    paid_count: 0,
                    no_fees_due_count: 0,
                });
                groups.len() - 1
            }
        };
        let g = &mut groups[idx];
        g.student_count += 1;
        g.fees += row.fees;
        g.paid += row.total_paid;
        match row.status {
            PaymentStatus::Unpaid => g.unpaid_count += 1,
            PaymentStatus::PartiallyPaid => g.partially_paid_count += 1,
            PaymentStatus::Paid => g.paid_count += 1,
            PaymentStatus::NoFeesDue => g.no_fees_due_count += 1,
        }
    }
    for g in &mut groups {
        g.balance = g.fees - g.paid;
        g.is_advance = fees::is_advance(g.balance);
    }
    groups.sort_by(|a, b| compare_class_names(&a.class_name, &b.class_name));
    groups
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub currency_label: String,
    pub include_academic_year: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            currency_label: "₹".to_string(),
            include_academic_year: true,
        }
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn payment_mode_label(mode: &str) -> String {
    mode.replace('_', " ")
}

pub fn render_csv(rows: &[LedgerRow], view: FeeView, opts: &CsvOptions) -> String {
    let cur = &opts.currency_label;
    let fees_header = match view {
        FeeView::Total => format!("Total Assigned ({})", cur),
        FeeView::Due => format!("Total Due ({})", cur),
    };
    let mut header: Vec<String> = vec![
        "Student Name".to_string(),
        "Class".to_string(),
        "Roll No".to_string(),
        fees_header,
        format!("Total Paid ({})", cur),
        format!("Balance ({})", cur),
        "Status".to_string(),
        "Last Payment Date".to_string(),
        format!("Last Payment Amount ({})", cur),
        "Last Payment Mode".to_string(),
    ];
    if opts.include_academic_year {
        header.push("Academic Year".to_string());
    }
    header.push("Last Receipt #".to_string());

    let mut out = String::new();
    out.push_str(
        &header
            .iter()
            .map(|h| csv_quote(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');

    for row in rows {
        let last = row.last_payment.as_ref();
        let mut cells: Vec<String> = vec![
            row.name.clone(),
            row.class_name.clone(),
            row.roll_no.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            format!("{:.2}", row.fees),
            format!("{:.2}", row.total_paid),
            format!("{:.2}", row.balance),
            row.status.label().to_string(),
            last.map(|p| p.date.clone()).unwrap_or_else(|| "-".to_string()),
            last.map(|p| format!("{:.2}", p.amount_paid))
                .unwrap_or_else(|| "-".to_string()),
            last.map(|p| payment_mode_label(&p.mode_of_payment))
                .unwrap_or_else(|| "-".to_string()),
        ];
        if opts.include_academic_year {
            cells.push(
                row.academic_year
                    .clone()
                    .filter(|y| !y.is_empty())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
        cells.push(
            last.and_then(|p| p.receipt_number.clone())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "-".to_string()),
        );
        out.push_str(&cells.iter().map(|c| csv_quote(c)).collect::<Vec<_>>().join(","));
        out.push('\n');
    }
    out
}

pub fn export_file_name(
    prefix: &str,
    scope: &str,
    class_id: Option<&str>,
    view: FeeView,
    today: NaiveDate,
) -> String {
    format!(
        "{}-{}-{}-{}-{}.csv",
        prefix,
        scope,
        class_id.filter(|c| !c.is_empty()).unwrap_or("all"),
        view.as_str(),
        today.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeType;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("date")
    }

    fn student(id: &str, name: &str, class: Option<&str>, roll: Option<&str>) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            name: name.to_string(),
            class_id: class.map(|c| format!("cls-{}", c)),
            class_name: class.map(str::to_string),
            roll_no: roll.map(str::to_string),
            academic_year: Some("2024-25".to_string()),
        }
    }

    fn tuition(amount: f64, scheduled: Option<&str>) -> StudentFeeAssignment {
        StudentFeeAssignment {
            id: "a1".to_string(),
            assigned_amount: None,
            discount: None,
            discount_description: None,
            fee_type: Some(FeeType {
                id: "ft-tuition".to_string(),
                name: "Tuition".to_string(),
                default_amount: Some(amount),
                applicable_from: None,
                applicable_until: None,
                scheduled_date: scheduled.map(str::to_string),
            }),
        }
    }

    fn paid(date: &str, amount: f64, mode: &str, receipt: Option<&str>) -> Payment {
        Payment {
            date: date.to_string(),
            amount_paid: amount,
            mode_of_payment: mode.to_string(),
            receipt_number: receipt.map(str::to_string),
        }
    }

    fn sample() -> Vec<LedgerStudent> {
        vec![
            LedgerStudent {
                student: student("s1", "Asha", Some("Grade 2"), Some("R-01")),
                assignments: vec![tuition(1000.0, None)],
                payments: vec![paid("2024-04-01", 400.0, "bank_transfer", Some("RC-9"))],
            },
            LedgerStudent {
                student: student("s2", "Bilal", Some("Grade 1"), None),
                assignments: vec![tuition(500.0, Some("2099-01-01"))],
                payments: vec![],
            },
            LedgerStudent {
                student: student("s3", "Chen", None, Some("R-07")),
                assignments: vec![],
                payments: vec![paid("2024-05-01", 50.0, "cash", None)],
            },
        ]
    }

    #[test]
    fn fee_view_changes_status() {
        let total = build_rows(&sample(), FeeView::Total, today());
        assert_eq!(total[1].status, PaymentStatus::Unpaid);
        assert_eq!(total[1].fees, 500.0);

        let due = build_rows(&sample(), FeeView::Due, today());
        assert_eq!(due[1].status, PaymentStatus::NoFeesDue);
        assert_eq!(due[1].fees, 0.0);
        assert_eq!(due[0].status, PaymentStatus::PartiallyPaid);
        assert_eq!(due[0].balance, 600.0);
    }

    #[test]
    fn credit_balance_is_flagged_as_advance() {
        let rows = build_rows(&sample(), FeeView::Total, today());
        assert_eq!(rows[2].class_name, NOT_AVAILABLE);
        assert_eq!(rows[2].status, PaymentStatus::Paid);
        assert!(rows[2].is_advance);
        assert!(!rows[0].is_advance);
    }

    #[test]
    fn search_covers_name_roll_and_class() {
        let rows = build_rows(&sample(), FeeView::Total, today());
        assert_eq!(filter_rows(rows.clone(), "").len(), 3);
        assert_eq!(filter_rows(rows.clone(), "  ASHA ").len(), 1);
        assert_eq!(filter_rows(rows.clone(), "r-07")[0].student_id, "s3");
        assert_eq!(filter_rows(rows.clone(), "grade").len(), 2);
        assert!(filter_rows(rows, "zzz").is_empty());
    }

    #[test]
    fn class_groups_sum_and_count_statuses() {
        let rows = build_rows(&sample(), FeeView::Total, today());
        let groups = group_by_class(&rows);
        let names: Vec<&str> = groups.iter().map(|g| g.class_name.as_str()).collect();
        assert_eq!(names, vec!["Grade 1", "Grade 2", "N/A"]);
        assert_eq!(groups[1].fees, 1000.0);
        assert_eq!(groups[1].paid, 400.0);
        assert_eq!(groups[1].balance, 600.0);
        assert_eq!(groups[1].partially_paid_count, 1);
        assert_eq!(groups[0].unpaid_count, 1);
        assert!(groups[2].is_advance);
    }

    #[test]
    fn csv_has_header_and_formatted_rows() {
        let rows = build_rows(&sample(), FeeView::Total, today());
        let csv = render_csv(&rows, FeeView::Total, &CsvOptions::default());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Student Name,Class,Roll No,Total Assigned (₹),"));
        assert!(lines[0].ends_with("Academic Year,Last Receipt #"));
        assert_eq!(
            lines[1],
            "Asha,Grade 2,R-01,1000.00,400.00,600.00,Partially paid,2024-04-01,400.00,bank transfer,2024-25,RC-9"
        );
        assert_eq!(
            lines[2],
            "Bilal,Grade 1,N/A,500.00,0.00,500.00,Unpaid,-,-,-,2024-25,-"
        );
    }

    #[test]
    fn csv_quotes_commas_and_quotes() {
        let mut students = sample();
        students[0].student.name = "Khan, \"Asha\"".to_string();
        let rows = build_rows(&students[..1], FeeView::Due, today());
        let opts = CsvOptions {
            currency_label: "$".to_string(),
            include_academic_year: false,
        };
        let csv = render_csv(&rows, FeeView::Due, &opts);
        assert!(csv.contains("Total Due ($)"));
        assert!(!csv.contains("Academic Year"));
        assert!(csv.contains("\"Khan, \"\"Asha\"\"\""));
    }

    #[test]
    fn export_name_defaults_class_to_all() {
        assert_eq!(
            export_file_name("master-ledger", "school", None, FeeView::Due, today()),
            "master-ledger-school-all-due-2024-06-01.csv"
        );
        assert_eq!(
            export_file_name("x", "class", Some("c1"), FeeView::Total, today()),
            "x-class-c1-total-2024-06-01.csv"
        );
    }
}

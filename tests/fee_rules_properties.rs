#![allow(dead_code)]

#[path = "../src/fees.rs"]
mod fees;
#[path = "../src/ledger.rs"]
mod ledger;

use chrono::{Duration, NaiveDate};
use fees::{FeeType, FeeView, Payment, PaymentStatus, StudentFeeAssignment};

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("base date") + Duration::days(offset)
}

fn ymd(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn fee(from: Option<NaiveDate>, until: Option<NaiveDate>, scheduled: Option<NaiveDate>) -> FeeType {
    FeeType {
        id: "ft".to_string(),
        name: "Fee".to_string(),
        default_amount: Some(100.0),
        applicable_from: from.map(ymd),
        applicable_until: until.map(ymd),
        scheduled_date: scheduled.map(ymd),
    }
}

#[test]
fn start_bound_splits_days_around_it() {
    // Every d1 < d2 < d3 over a short span.
    for d1 in 0..12 {
        for d2 in (d1 + 1)..12 {
            for d3 in (d2 + 1)..13 {
                let f = fee(Some(day(d2)), None, None);
                assert!(!fees::is_within_window(&f, day(d1)));
                assert!(fees::is_within_window(&f, day(d2)));
                assert!(fees::is_within_window(&f, day(d3)));
            }
        }
    }
}

#[test]
fn window_and_schedule_agree_with_ledger_due_figures() {
    let today = day(30);
    for offset in -3..=3 {
        let scheduled = fee(None, None, Some(day(30 + offset)));
        let windowed = fee(Some(day(30 + offset)), Some(day(40)), None);
        for f in [scheduled, windowed] {
            let assignments = vec![StudentFeeAssignment {
                id: "a".to_string(),
                assigned_amount: None,
                discount: None,
                discount_description: None,
                fee_type: Some(f.clone()),
            }];
            let summary = fees::aggregate(&assignments, &[], today);
            let expect_due = fees::is_applicable(&f, today).counts_as_due();
            assert_eq!(expect_due, offset <= 0, "offset {}", offset);
            assert_eq!(summary.total_assigned, 100.0);
            assert_eq!(summary.total_due, if expect_due { 100.0 } else { 0.0 });
        }
    }
}

#[test]
fn malformed_fields_never_count_as_due() {
    let today = day(100);
    for raw in ["2024-13-01", "2024/01/01", "01-01", "", "soon", "2024-02-30"] {
        let f = FeeType {
            id: "ft".to_string(),
            name: "Fee".to_string(),
            default_amount: Some(10.0),
            applicable_from: None,
            applicable_until: None,
            scheduled_date: Some(raw.to_string()),
        };
        // Empty strings read as absent.
        assert_eq!(fees::is_applicable(&f, today).is_scheduled, raw.is_empty(), "{:?}", raw);
    }
}

#[test]
fn ledger_status_tracks_classifier_for_both_views() {
    let today = day(10);
    let student = ledger::LedgerStudent {
        student: ledger::StudentRecord {
            id: "s".to_string(),
            name: "Student".to_string(),
            class_id: None,
            class_name: None,
            roll_no: None,
            academic_year: None,
        },
        assignments: vec![
            StudentFeeAssignment {
                id: "a1".to_string(),
                assigned_amount: Some(500.0),
                discount: None,
                discount_description: None,
                fee_type: Some(fee(None, None, Some(day(0)))),
            },
            StudentFeeAssignment {
                id: "a2".to_string(),
                assigned_amount: Some(100.0),
                discount: None,
                discount_description: None,
                fee_type: Some(fee(None, None, Some(day(400)))),
            },
        ],
        payments: vec![Payment {
            date: ymd(day(5)),
            amount_paid: 500.0,
            mode_of_payment: "cash".to_string(),
            receipt_number: None,
        }],
    };
    let total = ledger::build_row(&student, FeeView::Total, today);
    let due = ledger::build_row(&student, FeeView::Due, today);
    assert_eq!(total.fees, 600.0);
    assert_eq!(total.status, PaymentStatus::PartiallyPaid);
    assert_eq!(due.fees, 500.0);
    assert_eq!(due.status, PaymentStatus::Paid);
    assert_eq!(due.class_name, ledger::NOT_AVAILABLE);
    assert_eq!(total.status, fees::classify(total.fees, total.total_paid));
}

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Amounts within this distance of zero are treated as zero.
pub const AMOUNT_TOLERANCE: f64 = 0.009;

pub const UNKNOWN_FEE_TYPE_NAME: &str = "Unknown Fee Type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeType {
    pub id: String,
    pub name: String,
    pub default_amount: Option<f64>,
    pub applicable_from: Option<String>,
    pub applicable_until: Option<String>,
    pub scheduled_date: Option<String>,
}

/// One student's fee component. `fee_type` is `None` when the linked fee type
/// could not be loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFeeAssignment {
    pub id: String,
    pub assigned_amount: Option<f64>,
    pub discount: Option<f64>,
    pub discount_description: Option<String>,
    pub fee_type: Option<FeeType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub date: String,
    pub amount_paid: f64,
    pub mode_of_payment: String,
    pub receipt_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicability {
    pub is_scheduled: bool,
    pub is_within_window: bool,
}

impl Applicability {
    pub fn counts_as_due(self) -> bool {
        self.is_scheduled && self.is_within_window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateField {
    Absent,
    Valid(NaiveDate),
    Malformed,
}

fn date_field(raw: Option<&str>) -> DateField {
    match raw {
        None => DateField::Absent,
        Some("") => DateField::Absent,
        Some(s) => parse_ymd(s).map_or(DateField::Malformed, DateField::Valid),
    }
}

/// Strict `Y-M-D` parse. Anything other than three numeric parts naming a real
/// calendar day yields `None`.
pub fn parse_ymd(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Builds a `YYYY-MM-DD` string from date-picker parts (`month_index` is 0-based).
pub fn format_full_date(day: i64, month_index: i64, year: i64) -> Option<String> {
    if !(1900..=2200).contains(&year)
        || !(0..=11).contains(&month_index)
        || !(1..=31).contains(&day)
    {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year as i32, (month_index + 1) as u32, day as u32)?;
    Some(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

/// Whether `today` falls inside the fee type's active window. A malformed
/// bound closes the window.
pub fn is_within_window(fee: &FeeType, today: NaiveDate) -> bool {
    let after_start = match date_field(fee.applicable_from.as_deref()) {
        DateField::Absent => true,
        DateField::Valid(from) => today >= from,
        DateField::Malformed => false,
    };
    if !after_start {
        return false;
    }
    match date_field(fee.applicable_until.as_deref()) {
        DateField::Absent => true,
        DateField::Valid(until) => today <= until,
        DateField::Malformed => false,
    }
}

pub fn is_applicable(fee: &FeeType, today: NaiveDate) -> Applicability {
    let is_scheduled = match date_field(fee.scheduled_date.as_deref()) {
        DateField::Absent => true,
        DateField::Valid(scheduled) => scheduled <= today,
        DateField::Malformed => false,
    };
    Applicability {
        is_scheduled,
        is_within_window: is_within_window(fee, today),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeComponentLine {
    pub id: String,
    pub fee_type_id: Option<String>,
    pub name: String,
    pub assigned_amount: f64,
    pub discount: f64,
    pub discount_description: Option<String>,
    pub net_payable: f64,
    pub scheduled_date: Option<String>,
    pub applicable_from: Option<String>,
    pub applicable_until: Option<String>,
    pub counts_as_due: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub total_assigned: f64,
    pub total_due: f64,
    pub total_paid: f64,
    pub components: Vec<FeeComponentLine>,
}

impl BalanceSummary {
    pub fn fees_for(&self, view: FeeView) -> f64 {
        match view {
            FeeView::Total => self.total_assigned,
            FeeView::Due => self.total_due,
        }
    }

    pub fn balance(&self, view: FeeView) -> f64 {
        self.fees_for(view) - self.total_paid
    }

    pub fn status(&self, view: FeeView) -> PaymentStatus {
        classify(self.fees_for(view), self.total_paid)
    }
}

pub fn aggregate(
    assignments: &[StudentFeeAssignment],
    payments: &[Payment],
    today: NaiveDate,
) -> BalanceSummary {
    let mut total_assigned = 0.0;
    let mut total_due = 0.0;
    let mut components = Vec::with_capacity(assignments.len());

    for a in assignments {
        let fee = a.fee_type.as_ref();
        let assigned_amount = a
            .assigned_amount
            .or_else(|| fee.and_then(|f| f.default_amount))
            .unwrap_or(0.0);
        let discount = a.discount.unwrap_or(0.0);
        // Unclamped: a discount larger than the amount yields a credit.
        let net_payable = assigned_amount - discount;
        total_assigned += net_payable;

        let counts_as_due = fee
            .map(|f| is_applicable(f, today).counts_as_due())
            .unwrap_or(false);
        if counts_as_due {
            total_due += net_payable;
        }

        components.push(FeeComponentLine {
            id: fee
                .map(|f| f.id.clone())
                .unwrap_or_else(|| format!("sft-{}", a.id)),
            fee_type_id: fee.map(|f| f.id.clone()),
            name: fee
                .map(|f| f.name.clone())
                .unwrap_or_else(|| UNKNOWN_FEE_TYPE_NAME.to_string()),
            assigned_amount,
            discount,
            discount_description: a.discount_description.clone(),
            net_payable,
            scheduled_date: fee.and_then(|f| f.scheduled_date.clone()),
            applicable_from: fee.and_then(|f| f.applicable_from.clone()),
            applicable_until: fee.and_then(|f| f.applicable_until.clone()),
            counts_as_due,
        });
    }

    let total_paid = payments.iter().map(|p| p.amount_paid).sum();

    BalanceSummary {
        total_assigned,
        total_due,
        total_paid,
        components,
    }
}

/// Orders payments newest first: by date descending, with later recordings
/// ahead of earlier ones on the same date. Unreadable dates sort oldest.
/// `items` must arrive in recording order.
pub fn sort_newest_first<T>(items: &mut [T], payment: impl Fn(&T) -> &Payment) {
    items.reverse();
    items.sort_by(|a, b| parse_ymd(&payment(b).date).cmp(&parse_ymd(&payment(a).date)));
}

/// Head of [`sort_newest_first`] over payments in recording order.
pub fn last_payment(payments: &[Payment]) -> Option<&Payment> {
    let mut newest: Vec<&Payment> = payments.iter().collect();
    sort_newest_first(&mut newest, |p| *p);
    newest.first().copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeView {
    Total,
    Due,
}

impl FeeView {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "total" => Some(Self::Total),
            "due" => Some(Self::Due),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Due => "due",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    PartiallyPaid,
    Unpaid,
    NoFeesDue,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::PartiallyPaid => "partially_paid",
            Self::Unpaid => "unpaid",
            Self::NoFeesDue => "no_fees_due",
        }
    }

    /// Report label, e.g. for CSV exports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::PartiallyPaid => "Partially paid",
            Self::Unpaid => "Unpaid",
            Self::NoFeesDue => "No Fees Due",
        }
    }

    /// Badge text used in compact table views.
    pub fn badge(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::PartiallyPaid => "Partial",
            Self::Unpaid => "Unpaid",
            Self::NoFeesDue => "No Dues",
        }
    }
}

pub fn classify(amount_due: f64, amount_paid: f64) -> PaymentStatus {
    // Due at or below the tolerance (including credits) means nothing is owed.
    if amount_due <= AMOUNT_TOLERANCE {
        return if amount_paid > AMOUNT_TOLERANCE {
            PaymentStatus::Paid
        } else {
            PaymentStatus::NoFeesDue
        };
    }
    if amount_paid >= amount_due {
        PaymentStatus::Paid
    } else if amount_paid > 0.0 {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

pub fn is_advance(balance: f64) -> bool {
    balance < -AMOUNT_TOLERANCE
}

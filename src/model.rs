use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Holiday,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Holiday => "holiday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "holiday" => Some(Self::Holiday),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeCycle {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "yearly")]
    Yearly,
    #[serde(rename = "one-time")]
    OneTime,
}

impl FeeCycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::OneTime => "one-time",
        }
    }

    /// Also accepts the `one_time` / `onetime` spellings found in older fee setups.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "quarterly" => Some(Self::Quarterly),
            "yearly" | "annual" => Some(Self::Yearly),
            "one-time" | "one_time" | "onetime" => Some(Self::OneTime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeType {
    #[serde(rename = "class-fee")]
    ClassFee,
    #[serde(rename = "transport-fee")]
    TransportFee,
    #[serde(rename = "custom-fee")]
    CustomFee,
}

impl FeeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassFee => "class-fee",
            Self::TransportFee => "transport-fee",
            Self::CustomFee => "custom-fee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class-fee" => Some(Self::ClassFee),
            "transport-fee" => Some(Self::TransportFee),
            "custom-fee" => Some(Self::CustomFee),
            _ => None,
        }
    }
}

/// Persisted payment state. `Overdue` is derived for display and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "partially-paid")]
    PartiallyPaid,
    #[serde(rename = "paid")]
    Paid,
    #[serde(rename = "overdue")]
    Overdue,
}

impl ComponentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyPaid => "partially-paid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "partially-paid" | "partially_paid" => Some(Self::PartiallyPaid),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyPaid | Self::Overdue)
    }

    pub fn from_amounts(fee_amount: Decimal, paid_amount: Decimal) -> Self {
        if paid_amount <= Decimal::ZERO {
            Self::Pending
        } else if paid_amount >= fee_amount {
            Self::Paid
        } else {
            Self::PartiallyPaid
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetablePeriod {
    pub id: String,
    pub teacher_id: String,
    pub day_of_week: u32,
    pub academic_year: i32,
    pub period_number: i64,
    pub start_time: NaiveTime,
    pub class_group_id: String,
    pub class_name: String,
    pub section_id: Option<String>,
    pub section_name: Option<String>,
    pub subject_id: Option<String>,
    pub subject_name: Option<String>,
}

impl TimetablePeriod {
    /// Human label such as `Grade 5 A - Math, Period 2`.
    pub fn label(&self) -> String {
        let mut out = self.class_name.clone();
        if let Some(section) = &self.section_name {
            out.push(' ');
            out.push_str(section);
        }
        if let Some(subject) = &self.subject_name {
            out.push_str(" - ");
            out.push_str(subject);
        }
        format!("{}, Period {}", out, self.period_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLock {
    pub id: String,
    pub school_id: String,
    pub class_group_id: String,
    pub section_id: Option<String>,
    pub teacher_id: String,
    pub attendance_date: NaiveDate,
    pub locked_at: String,
}

impl AttendanceLock {
    pub fn covers(&self, class_group_id: &str, section_id: Option<&str>) -> bool {
        self.class_group_id == class_group_id && self.section_id.as_deref() == section_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRow {
    pub id: String,
    pub school_id: String,
    pub class_group_id: String,
    pub section_id: Option<String>,
    pub admission_date: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceInput {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeOverride {
    pub id: String,
    pub student_id: String,
    /// `None` targets the transport fee.
    pub fee_category_id: Option<String>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_full_free: bool,
    pub custom_fee_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

impl FeeOverride {
    /// Both ends of the window are inclusive; an open end never expires.
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeCategoryRow {
    pub id: String,
    pub name: String,
    pub amount: Decimal,
    pub fee_cycle: FeeCycle,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportAssignment {
    pub route_id: String,
    pub route_name: String,
    pub base_fee: Decimal,
    pub escort_fee: Decimal,
    pub fuel_surcharge: Decimal,
    pub fee_cycle: FeeCycle,
    pub route_start_date: Option<NaiveDate>,
    pub assigned_from: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFeeComponent {
    pub id: String,
    pub student_id: String,
    pub school_id: String,
    pub fee_category_id: Option<String>,
    pub fee_type: FeeType,
    pub fee_cycle: FeeCycle,
    pub description: String,
    pub period_year: i32,
    pub period_month: u32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub fee_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
    pub status: ComponentStatus,
    pub due_date: NaiveDate,
    pub effective_from: Option<NaiveDate>,
}

/// Money is held to two decimal places with trailing zeros dropped.
pub fn money(d: Decimal) -> Decimal {
    d.round_dp(2).normalize()
}

use crate::error::{CoreError, Result};
use crate::model::{money, FeeCategoryRow, FeeCycle, FeeOverride, FeeType, StudentRow};
use crate::store;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

/// Which charge a fee line represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FeeKind {
    #[serde(rename_all = "camelCase")]
    Class { fee_category_id: String },
    #[serde(rename_all = "camelCase")]
    Transport { route_id: String },
    #[serde(rename_all = "camelCase")]
    Custom { fee_category_id: String },
}

impl FeeKind {
    pub fn fee_type(&self) -> FeeType {
        match self {
            Self::Class { .. } => FeeType::ClassFee,
            Self::Transport { .. } => FeeType::TransportFee,
            Self::Custom { .. } => FeeType::CustomFee,
        }
    }

    /// Category id stored on components; transport rows carry none.
    pub fn fee_category_id(&self) -> Option<&str> {
        match self {
            Self::Class { fee_category_id } | Self::Custom { fee_category_id } => Some(fee_category_id),
            Self::Transport { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppliedOverride {
    FullWaiver,
    CustomAmount,
    Discount,
}

/// One configured charge for a student, before splitting into billing periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLine {
    #[serde(flatten)]
    pub kind: FeeKind,
    pub name: String,
    pub fee_cycle: FeeCycle,
    /// First day this line can be billed: the later of the definition's start and
    /// the student's admission (or route assignment).
    pub start_date: NaiveDate,
    pub base_amount: Decimal,
    /// `base_amount` with the override effective on the structure's as-of date.
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_override: Option<AppliedOverride>,
    #[serde(skip)]
    overrides: Vec<FeeOverride>,
}

impl FeeLine {
    fn new(kind: FeeKind, name: String, cycle: FeeCycle, start_date: NaiveDate, base: Decimal, overrides: Vec<FeeOverride>, as_of: NaiveDate) -> Self {
        let (amount, applied) = resolve_amount(base, &overrides, as_of);
        Self {
            kind,
            name,
            fee_cycle: cycle,
            start_date,
            base_amount: base,
            amount,
            applied_override: applied,
            overrides,
        }
    }

    /// The configured amount after the override effective on `date`, if any.
    pub fn amount_on(&self, date: NaiveDate) -> Decimal {
        resolve_amount(self.base_amount, &self.overrides, date).0
    }
}

/// Everything a student is assigned to pay. Absent charges are absent, never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStructure {
    pub student_id: String,
    pub school_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<NaiveDate>,
    pub as_of: NaiveDate,
    pub lines: Vec<FeeLine>,
}

impl FeeStructure {
    pub fn class_fee(&self) -> Option<&FeeLine> {
        self.lines.iter().find(|l| matches!(l.kind, FeeKind::Class { .. }))
    }

    pub fn transport_fee(&self) -> Option<&FeeLine> {
        self.lines.iter().find(|l| matches!(l.kind, FeeKind::Transport { .. }))
    }

    pub fn custom_fees(&self) -> impl Iterator<Item = &FeeLine> {
        self.lines.iter().filter(|l| matches!(l.kind, FeeKind::Custom { .. }))
    }
}

/// Picks the override effective on `date` (latest `effective_from` wins) and applies it.
/// Precedence within one override: full waiver, then custom amount, then discount.
fn resolve_amount(base: Decimal, overrides: &[FeeOverride], date: NaiveDate) -> (Decimal, Option<AppliedOverride>) {
    let effective = overrides
        .iter()
        .filter(|o| o.is_effective_on(date))
        .max_by(|a, b| a.effective_from.cmp(&b.effective_from).then_with(|| b.id.cmp(&a.id)));
    let Some(o) = effective else {
        return (base, None);
    };
    if o.is_full_free {
        return (Decimal::ZERO, Some(AppliedOverride::FullWaiver));
    }
    if let Some(custom) = o.custom_fee_amount {
        return (money(custom.max(Decimal::ZERO)), Some(AppliedOverride::CustomAmount));
    }
    if let Some(discount) = o.discount_amount {
        return (
            money((base - discount).max(Decimal::ZERO)),
            Some(AppliedOverride::Discount),
        );
    }
    (base, None)
}

fn line_start(definition_start: Option<NaiveDate>, floor: Option<NaiveDate>, as_of: NaiveDate) -> NaiveDate {
    match (definition_start, floor) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => as_of,
    }
}

fn category_line(kind: FeeKind, cat: FeeCategoryRow, student: &StudentRow, overrides: &[FeeOverride], as_of: NaiveDate) -> FeeLine {
    let own: Vec<FeeOverride> = overrides
        .iter()
        .filter(|o| o.fee_category_id.as_deref() == Some(cat.id.as_str()))
        .cloned()
        .collect();
    FeeLine::new(
        kind,
        cat.name,
        cat.fee_cycle,
        line_start(cat.start_date, student.admission_date, as_of),
        cat.amount,
        own,
        as_of,
    )
}

/// Resolves the class, transport and custom fees assigned to a student, with the
/// overrides effective on `as_of` applied.
pub fn load_assigned_fee_structure(conn: &Connection, student_id: &str, school_id: &str, as_of: NaiveDate) -> Result<FeeStructure> {
    let Some(student) = store::find_student(conn, student_id, school_id)? else {
        return Err(CoreError::not_found("student", student_id));
    };
    let overrides = store::overrides_for_student(conn, student_id)?;
    let mut lines = Vec::new();

    if let Some(cat) = store::class_fee_default(conn, school_id, &student.class_group_id)? {
        let kind = FeeKind::Class {
            fee_category_id: cat.id.clone(),
        };
        lines.push(category_line(kind, cat, &student, &overrides, as_of));
    }

    if let Some(t) = store::transport_assignment(conn, student_id)? {
        let base = money(t.base_fee + t.escort_fee + t.fuel_surcharge);
        let floor = match (t.assigned_from, student.admission_date) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let own: Vec<FeeOverride> = overrides
            .iter()
            .filter(|o| o.fee_category_id.is_none())
            .cloned()
            .collect();
        lines.push(FeeLine::new(
            FeeKind::Transport {
                route_id: t.route_id,
            },
            format!("Transport ({})", t.route_name),
            t.fee_cycle,
            line_start(t.route_start_date, floor, as_of),
            base,
            own,
            as_of,
        ));
    }

    for cat in store::custom_fee_categories(conn, school_id, &student.class_group_id)? {
        let kind = FeeKind::Custom {
            fee_category_id: cat.id.clone(),
        };
        lines.push(category_line(kind, cat, &student, &overrides, as_of));
    }

    Ok(FeeStructure {
        student_id: student.id,
        school_id: student.school_id,
        admission_date: student.admission_date,
        as_of,
        lines,
    })
}

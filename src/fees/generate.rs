use super::cycle::{period_amount, should_bill_this_month};
use super::structure::{load_assigned_fee_structure, FeeStructure};
use crate::clock::Clock;
use crate::config::SchoolPolicy;
use crate::error::{CoreError, Result};
use crate::model::{ComponentStatus, MonthlyFeeComponent};
use crate::period::YearMonth;
use crate::store;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

/// Components billed to the student in one month. Pure: nothing is read or written.
pub fn generate_monthly_fee_components(
    structure: &FeeStructure,
    policy: &SchoolPolicy,
    year: i32,
    month: u32,
) -> Result<Vec<MonthlyFeeComponent>> {
    let Some(ym) = YearMonth::new(year, month) else {
        return Err(CoreError::invalid(format!("month out of range: {}", month)));
    };
    let period_start = ym.first_day();
    let period_end = ym.last_day();
    let due_date = ym.clamped_day(policy.due_day_of_month);

    let mut out = Vec::new();
    for line in &structure.lines {
        if !should_bill_this_month(line.fee_cycle, line.start_date, year, month) {
            continue;
        }
        let billing_date = period_start.max(line.start_date);
        let fee_amount = period_amount(line.fee_cycle, line.amount_on(billing_date));
        out.push(MonthlyFeeComponent {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: structure.student_id.clone(),
            school_id: structure.school_id.clone(),
            fee_category_id: line.kind.fee_category_id().map(str::to_string),
            fee_type: line.kind.fee_type(),
            fee_cycle: line.fee_cycle,
            description: line.name.clone(),
            period_year: year,
            period_month: month,
            period_start,
            period_end,
            fee_amount,
            paid_amount: Decimal::ZERO,
            pending_amount: fee_amount,
            status: ComponentStatus::Pending,
            due_date,
            effective_from: Some(line.start_date),
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub generated: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub months: usize,
}

/// Walks every month from admission to `target` (default: the current month) and
/// upserts the student's components on their natural key, all in one transaction.
///
/// Existing rows keep their `paid_amount` and `status`; only the amount and
/// descriptive fields move, with `pending = max(0, fee - paid)`.
pub fn generate_for_student(
    conn: &Connection,
    clock: &dyn Clock,
    policy: &SchoolPolicy,
    student_id: &str,
    school_id: &str,
    target: Option<YearMonth>,
) -> Result<GenerationSummary> {
    let today = clock.today();
    let tx = conn.unchecked_transaction()?;
    let structure = load_assigned_fee_structure(&tx, student_id, school_id, today)?;
    let target = target.unwrap_or_else(|| YearMonth::of(today));
    let first = structure.admission_date.map(YearMonth::of).unwrap_or(target);

    let mut summary = GenerationSummary::default();
    for ym in YearMonth::range_inclusive(first, target) {
        summary.months += 1;
        for computed in generate_monthly_fee_components(&structure, policy, ym.year, ym.month)? {
            let existing = store::find_component_by_key(
                &tx,
                student_id,
                ym.year,
                ym.month,
                computed.fee_type,
                computed.fee_category_id.as_deref(),
            )?;
            match existing {
                Some(row) => {
                    let refreshed = refresh(&row, &computed);
                    if refreshed == row {
                        summary.unchanged += 1;
                    } else {
                        store::update_component_amounts(&tx, &row.id, &refreshed).map_err(CoreError::write)?;
                        summary.updated += 1;
                    }
                }
                None => {
                    store::insert_component(&tx, &computed).map_err(CoreError::write)?;
                    summary.generated += 1;
                }
            }
        }
    }
    tx.commit().map_err(CoreError::write)?;

    tracing::info!(
        student_id,
        school_id,
        through = %target,
        generated = summary.generated,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "fee components generated"
    );
    Ok(summary)
}

/// The stored row with freshly computed amounts and labels, payment state kept.
fn refresh(row: &MonthlyFeeComponent, computed: &MonthlyFeeComponent) -> MonthlyFeeComponent {
    MonthlyFeeComponent {
        fee_amount: computed.fee_amount,
        pending_amount: (computed.fee_amount - row.paid_amount).max(Decimal::ZERO),
        fee_cycle: computed.fee_cycle,
        description: computed.description.clone(),
        period_start: computed.period_start,
        period_end: computed.period_end,
        due_date: computed.due_date,
        effective_from: computed.effective_from,
        ..row.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFailure {
    pub student_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolGenerationSummary {
    pub students: usize,
    pub generated: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failures: Vec<StudentFailure>,
}

/// Runs the per-student backfill for every active student. One student's failure
/// is recorded and does not stop the rest.
pub fn generate_for_school(
    conn: &Connection,
    clock: &dyn Clock,
    policy: &SchoolPolicy,
    school_id: &str,
    target: Option<YearMonth>,
) -> Result<SchoolGenerationSummary> {
    let students = store::active_students(conn, school_id)?;
    let mut out = SchoolGenerationSummary::default();
    for s in students {
        out.students += 1;
        match generate_for_student(conn, clock, policy, &s.id, school_id, target) {
            Ok(r) => {
                out.generated += r.generated;
                out.updated += r.updated;
                out.unchanged += r.unchanged;
            }
            Err(e) => {
                tracing::error!(student_id = %s.id, school_id, error = %e, "fee generation failed");
                out.failures.push(StudentFailure {
                    student_id: s.id,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(out)
}

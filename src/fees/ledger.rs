use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::model::{ComponentStatus, MonthlyFeeComponent};
use crate::period::YearMonth;
use crate::store;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

pub const DEFAULT_LEDGER_LIMIT: u32 = 12;
pub const MAX_LEDGER_LIMIT: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMonth {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    pub total_pending: Decimal,
    pub components: Vec<MonthlyFeeComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPage {
    pub page: u32,
    pub limit: u32,
    pub total_months: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLedger {
    pub student_id: String,
    pub months: Vec<LedgerMonth>,
    pub pagination: LedgerPage,
}

/// Month-grouped ledger for `[start_year, end_year]`, newest month first, paginated by
/// month. Open components past their due date are reported as `overdue`; that status
/// exists only in this view.
#[allow(clippy::too_many_arguments)]
pub fn monthly_fee_ledger(
    conn: &Connection,
    clock: &dyn Clock,
    student_id: &str,
    school_id: &str,
    start_year: i32,
    end_year: i32,
    page: u32,
    limit: u32,
) -> Result<FeeLedger> {
    if start_year > end_year {
        return Err(CoreError::invalid("startYear must not be after endYear"));
    }
    if page == 0 {
        return Err(CoreError::invalid("page starts at 1"));
    }
    if limit == 0 || limit > MAX_LEDGER_LIMIT {
        return Err(CoreError::invalid(format!("limit must be 1..{}", MAX_LEDGER_LIMIT)));
    }
    if store::find_student(conn, student_id, school_id)?.is_none() {
        return Err(CoreError::not_found("student", student_id));
    }

    let today = clock.today();
    let all_months = store::component_months(conn, student_id, school_id, start_year, end_year)?;
    let total_months = all_months.len();
    let per_page = limit as usize;
    let total_pages = total_months.div_ceil(per_page);
    let skip = (page as usize - 1) * per_page;

    let mut months = Vec::new();
    for (year, month) in all_months.into_iter().skip(skip).take(per_page) {
        let mut components = store::components_for_month(conn, student_id, school_id, year, month)?;
        for c in &mut components {
            if c.status.is_open() && c.pending_amount > Decimal::ZERO && c.due_date < today {
                c.status = ComponentStatus::Overdue;
            }
        }
        let total_fee = components.iter().map(|c| c.fee_amount).sum();
        let total_paid = components.iter().map(|c| c.paid_amount).sum();
        let total_pending = components.iter().map(|c| c.pending_amount).sum();
        let label = YearMonth::new(year, month)
            .map(|ym| ym.to_string())
            .unwrap_or_else(|| format!("{}-{}", year, month));
        months.push(LedgerMonth {
            year,
            month,
            label,
            total_fee,
            total_paid,
            total_pending,
            components,
        });
    }

    Ok(FeeLedger {
        student_id: student_id.to_string(),
        months,
        pagination: LedgerPage {
            page,
            limit,
            total_months,
            total_pages,
            has_more: (page as usize) < total_pages,
        },
    })
}

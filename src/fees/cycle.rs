use crate::model::{money, FeeCycle};
use crate::period::YearMonth;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Whether a charge on `cycle` starting at `start_date` is billed in the target month.
///
/// Quarterly charges fall in the fixed calendar quarter months (Jan/Apr/Jul/Oct),
/// yearly charges in January. Nothing is billed before the start month.
pub fn should_bill_this_month(cycle: FeeCycle, start_date: NaiveDate, target_year: i32, target_month: u32) -> bool {
    let Some(target) = YearMonth::new(target_year, target_month) else {
        return false;
    };
    let start = YearMonth::of(start_date);
    if target < start {
        return false;
    }
    match cycle {
        FeeCycle::Monthly => true,
        FeeCycle::Quarterly => {
            let elapsed_quarters = (i64::from(target.year) - i64::from(start.year)) * 4
                + i64::from(target.quarter())
                - i64::from(start.quarter());
            matches!(target.month, 1 | 4 | 7 | 10) && elapsed_quarters >= 0
        }
        FeeCycle::Yearly => target.month == 1 && target.year >= start.year,
        FeeCycle::OneTime => target == start,
    }
}

/// The share of a configured amount billed in one billed month.
pub fn period_amount(cycle: FeeCycle, amount: Decimal) -> Decimal {
    let raw = match cycle {
        FeeCycle::Monthly | FeeCycle::OneTime => amount,
        FeeCycle::Quarterly => amount / Decimal::from(3),
        FeeCycle::Yearly => amount / Decimal::from(12),
    };
    money(raw)
}

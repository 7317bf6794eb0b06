use crate::error::{CoreError, Result};
use crate::model::{money, ComponentStatus, MonthlyFeeComponent};
use crate::store;
use rusqlite::Connection;
use rust_decimal::Decimal;

/// Applies a payment to one component. Overpayment beyond the pending amount is refused.
pub fn record_payment(conn: &Connection, component_id: &str, amount: Decimal) -> Result<MonthlyFeeComponent> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::invalid("payment amount must be positive"));
    }
    let tx = conn.unchecked_transaction()?;
    let Some(mut c) = store::find_component(&tx, component_id)? else {
        return Err(CoreError::not_found("fee component", component_id));
    };
    let amount = money(amount);
    if amount > c.pending_amount {
        return Err(CoreError::invalid(format!(
            "payment {} exceeds pending amount {}",
            amount, c.pending_amount
        )));
    }

    c.paid_amount = money(c.paid_amount + amount);
    c.pending_amount = money((c.fee_amount - c.paid_amount).max(Decimal::ZERO));
    c.status = ComponentStatus::from_amounts(c.fee_amount, c.paid_amount);
    store::update_component_payment(&tx, &c.id, c.paid_amount, c.pending_amount, c.status)
        .map_err(CoreError::write)?;
    tx.commit().map_err(CoreError::write)?;

    tracing::info!(
        component_id,
        student_id = %c.student_id,
        paid = %c.paid_amount,
        pending = %c.pending_amount,
        status = c.status.as_str(),
        "fee payment recorded"
    );
    Ok(c)
}

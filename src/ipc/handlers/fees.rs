use crate::config::load_school_policy;
use crate::fees::{self, DEFAULT_LEDGER_LIMIT};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_u32, get_optional_year_month, get_required_date, get_required_i32, get_required_money,
    get_required_str, request_clock, with_db, year_month,
};
use crate::ipc::types::{AppState, Request};
use crate::model::FeeCycle;
use serde_json::json;

fn handle_structure(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let school_id = get_required_str(params, "schoolId")?;
        let clock = request_clock(params)?;
        let structure = fees::load_assigned_fee_structure(conn, &student_id, &school_id, clock.today())?;
        Ok(json!(structure))
    })
}

fn should_bill(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw_cycle = get_required_str(params, "feeCycle")?;
    let Some(cycle) = FeeCycle::parse(&raw_cycle) else {
        return Err(HandlerErr::bad_params(format!("unknown feeCycle: {}", raw_cycle)));
    };
    let start_date = get_required_date(params, "startDate")?;
    let ym = year_month(params)?;
    Ok(json!({
        "bill": fees::should_bill_this_month(cycle, start_date, ym.year, ym.month)
    }))
}

// No workspace needed: the predicate reads nothing.
fn handle_should_bill(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match should_bill(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_preview_month(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let school_id = get_required_str(params, "schoolId")?;
        let ym = year_month(params)?;
        let clock = request_clock(params)?;
        let policy = load_school_policy(conn, &school_id)?;
        let structure = fees::load_assigned_fee_structure(conn, &student_id, &school_id, clock.today())?;
        let components = fees::generate_monthly_fee_components(&structure, &policy, ym.year, ym.month)?;
        Ok(json!({ "components": components }))
    })
}

fn handle_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let school_id = get_required_str(params, "schoolId")?;
        let target = get_optional_year_month(params)?;
        let clock = request_clock(params)?;
        let policy = load_school_policy(conn, &school_id)?;
        let summary = fees::generate_for_student(conn, clock.as_ref(), &policy, &student_id, &school_id, target)?;
        Ok(json!(summary))
    })
}

fn handle_generate_school(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let school_id = get_required_str(params, "schoolId")?;
        let target = get_optional_year_month(params)?;
        let clock = request_clock(params)?;
        let policy = load_school_policy(conn, &school_id)?;
        let summary = fees::generate_for_school(conn, clock.as_ref(), &policy, &school_id, target)?;
        Ok(json!(summary))
    })
}

fn handle_ledger(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let school_id = get_required_str(params, "schoolId")?;
        let start_year = get_required_i32(params, "startYear")?;
        let end_year = get_required_i32(params, "endYear")?;
        let page = get_optional_u32(params, "page")?.unwrap_or(1);
        let limit = get_optional_u32(params, "limit")?.unwrap_or(DEFAULT_LEDGER_LIMIT);
        let clock = request_clock(params)?;
        let ledger = fees::monthly_fee_ledger(
            conn,
            clock.as_ref(),
            &student_id,
            &school_id,
            start_year,
            end_year,
            page,
            limit,
        )?;
        Ok(json!(ledger))
    })
}

fn handle_record_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let component_id = get_required_str(params, "componentId")?;
        let amount = get_required_money(params, "amount")?;
        let component = fees::record_payment(conn, &component_id, amount)?;
        Ok(json!({ "component": component }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.structure" => Some(handle_structure(state, req)),
        "fees.shouldBill" => Some(handle_should_bill(state, req)),
        "fees.previewMonth" => Some(handle_preview_month(state, req)),
        "fees.generate" => Some(handle_generate(state, req)),
        "fees.generateSchool" => Some(handle_generate_school(state, req)),
        "fees.ledger" => Some(handle_ledger(state, req)),
        "fees.recordPayment" => Some(handle_record_payment(state, req)),
        _ => None,
    }
}

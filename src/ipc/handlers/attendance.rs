use crate::attendance;
use crate::config::load_school_policy;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_date, get_required_str, request_clock, with_db};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceInput;
use serde_json::json;

fn parse_records(params: &serde_json::Value) -> Result<Vec<AttendanceInput>, HandlerErr> {
    let Some(raw) = params.get("records") else {
        return Err(HandlerErr::bad_params("missing records"));
    };
    if !raw.is_array() {
        return Err(HandlerErr::bad_params("records must be an array"));
    }
    serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("invalid records: {}", e),
        details: None,
    })
}

fn handle_first_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let teacher_id = get_required_str(params, "teacherId")?;
        let date = get_required_date(params, "date")?;
        let clock = request_clock(params)?;
        let first = attendance::first_class_of_day(conn, clock.as_ref(), &teacher_id, date);
        Ok(json!({ "firstClass": first }))
    })
}

fn handle_holiday_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let school_id = get_required_str(params, "schoolId")?;
        let date = get_required_date(params, "date")?;
        let policy = load_school_policy(conn, &school_id)?;
        let check = attendance::is_holiday(conn, &policy, &school_id, date);
        Ok(json!(check))
    })
}

fn handle_can_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let teacher_id = get_required_str(params, "teacherId")?;
        let class_group_id = get_required_str(params, "classGroupId")?;
        let section_id = get_optional_str(params, "sectionId")?;
        let date = get_required_date(params, "date")?;
        let clock = request_clock(params)?;
        let decision = attendance::can_mark(
            conn,
            clock.as_ref(),
            &teacher_id,
            &class_group_id,
            section_id.as_deref(),
            date,
        )?;
        Ok(decision.to_json())
    })
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let teacher_id = get_required_str(params, "teacherId")?;
        let class_group_id = get_required_str(params, "classGroupId")?;
        let section_id = get_optional_str(params, "sectionId")?;
        let school_id = get_required_str(params, "schoolId")?;
        let date = get_required_date(params, "date")?;
        let records = parse_records(params)?;
        let clock = request_clock(params)?;
        let summary = attendance::save_attendance(
            conn,
            clock.as_ref(),
            &teacher_id,
            &class_group_id,
            section_id.as_deref(),
            &school_id,
            date,
            &records,
        )?;
        Ok(json!(summary))
    })
}

fn handle_apply_holiday(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let school_id = get_required_str(params, "schoolId")?;
        let date = get_required_date(params, "date")?;
        let policy = load_school_policy(conn, &school_id)?;
        let out = attendance::apply_holiday_attendance(conn, &policy, &school_id, date)?;
        Ok(json!(out))
    })
}

fn handle_lock_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let class_group_id = get_required_str(params, "classGroupId")?;
        let section_id = get_optional_str(params, "sectionId")?;
        let date = get_required_date(params, "date")?;
        let lock = attendance::lock_status(conn, &class_group_id, section_id.as_deref(), date)?;
        Ok(json!({ "locked": lock.is_some(), "lock": lock }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.firstClass" => Some(handle_first_class(state, req)),
        "attendance.holidayCheck" => Some(handle_holiday_check(state, req)),
        "attendance.canMark" => Some(handle_can_mark(state, req)),
        "attendance.save" => Some(handle_save(state, req)),
        "attendance.applyHoliday" => Some(handle_apply_holiday(state, req)),
        "attendance.lockStatus" => Some(handle_lock_status(state, req)),
        _ => None,
    }
}

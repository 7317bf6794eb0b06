use super::error::{err, ok, HandlerErr};
use super::types::{AppState, Request};
use crate::clock::{parse_as_of, Clock, FixedClock, SystemClock};
use crate::period::{parse_date, YearMonth};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Runs `f` against the open workspace and wraps the outcome as a response.
pub fn with_db<F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            tracing::debug!(method = %req.method, code = error.code, message = %error.message, "request failed");
            error.response(&req.id)
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all mean "no value".
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be string or null", key)));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    parse_date(&raw).ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_required_i32(params: &serde_json::Value, key: &str) -> Result<i32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_u32(params: &serde_json::Value, key: &str) -> Result<Option<u32>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key))),
    }
}

/// Accepts a JSON number or a decimal string.
pub fn get_required_money(params: &serde_json::Value, key: &str) -> Result<Decimal, HandlerErr> {
    let parsed = match params.get(key) {
        Some(serde_json::Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        Some(serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| HandlerErr::bad_params(format!("{} must be a decimal amount", key)))
}

/// Optional `year` + `month` pair; both or neither.
pub fn get_optional_year_month(params: &serde_json::Value) -> Result<Option<YearMonth>, HandlerErr> {
    let has_year = params.get("year").is_some_and(|v| !v.is_null());
    let has_month = params.get("month").is_some_and(|v| !v.is_null());
    match (has_year, has_month) {
        (false, false) => Ok(None),
        (true, true) => year_month(params).map(Some),
        _ => Err(HandlerErr::bad_params("year and month must be given together")),
    }
}

pub fn year_month(params: &serde_json::Value) -> Result<YearMonth, HandlerErr> {
    let year = get_required_i32(params, "year")?;
    let month = get_optional_u32(params, "month")?
        .ok_or_else(|| HandlerErr::bad_params("missing month"))?;
    YearMonth::new(year, month).ok_or_else(|| HandlerErr::bad_params("month must be between 1 and 12"))
}

/// The request's clock: pinned by `asOf` when given, otherwise the system clock.
pub fn request_clock(params: &serde_json::Value) -> Result<Box<dyn Clock>, HandlerErr> {
    match get_optional_str(params, "asOf")? {
        None => Ok(Box::new(SystemClock)),
        Some(raw) => parse_as_of(&raw)
            .map(|t| Box::new(FixedClock(t)) as Box<dyn Clock>)
            .ok_or_else(|| HandlerErr::bad_params("asOf must be YYYY-MM-DDTHH:MM[:SS]")),
    }
}

//! Typed accessors over the workspace database.
//!
//! Every function takes a plain `&Connection`; callers that need atomicity pass a
//! `Transaction`, which derefs to one.

use crate::model::{
    AttendanceLock, AttendanceStatus, ComponentStatus, FeeCategoryRow, FeeCycle, FeeOverride,
    FeeType, MonthlyFeeComponent, StudentRow, TimetablePeriod, TransportAssignment,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn get_money(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(raw.trim()).map_err(|e| conversion_err(idx, format!("bad amount {raw:?}: {e}")))
}

fn get_opt_money(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Decimal::from_str(s)
            .map(Some)
            .map_err(|e| conversion_err(idx, format!("bad amount {s:?}: {e}"))),
    }
}

fn get_cycle(row: &Row<'_>, idx: usize) -> rusqlite::Result<FeeCycle> {
    let raw: String = row.get(idx)?;
    FeeCycle::parse(&raw).ok_or_else(|| conversion_err(idx, format!("unknown fee cycle {raw:?}")))
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ---- reference data -------------------------------------------------------

pub fn find_student(conn: &Connection, student_id: &str, school_id: &str) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        "SELECT id, school_id, class_group_id, section_id, admission_date, is_active
         FROM students
         WHERE id = ? AND school_id = ?",
        (student_id, school_id),
        student_from_row,
    )
    .optional()
}

pub fn active_students(conn: &Connection, school_id: &str) -> rusqlite::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, class_group_id, section_id, admission_date, is_active
         FROM students
         WHERE school_id = ? AND is_active = 1
         ORDER BY class_group_id, last_name, first_name",
    )?;
    let rows = stmt.query_map([school_id], student_from_row)?;
    rows.collect()
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_group_id: r.get(2)?,
        section_id: r.get(3)?,
        admission_date: r.get(4)?,
        is_active: r.get::<_, i64>(5)? != 0,
    })
}

pub fn teacher_exists(conn: &Connection, teacher_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

/// Active periods for a teacher on one weekday of one academic year, by period number.
pub fn teacher_periods(
    conn: &Connection,
    teacher_id: &str,
    day_of_week: u32,
    academic_year: i32,
) -> rusqlite::Result<Vec<TimetablePeriod>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.teacher_id, t.day_of_week, t.academic_year, t.period_number, t.start_time,
                t.class_group_id, cg.name, t.section_id, s.name, t.subject_id, sub.name
         FROM timetable_periods t
         JOIN class_groups cg ON cg.id = t.class_group_id
         LEFT JOIN sections s ON s.id = t.section_id
         LEFT JOIN subjects sub ON sub.id = t.subject_id
         WHERE t.teacher_id = ? AND t.day_of_week = ? AND t.academic_year = ? AND t.is_active = 1
         ORDER BY t.period_number",
    )?;
    let rows = stmt.query_map((teacher_id, day_of_week, academic_year), |r| {
        Ok(TimetablePeriod {
            id: r.get(0)?,
            teacher_id: r.get(1)?,
            day_of_week: r.get(2)?,
            academic_year: r.get(3)?,
            period_number: r.get(4)?,
            start_time: r.get(5)?,
            class_group_id: r.get(6)?,
            class_name: r.get(7)?,
            section_id: r.get(8)?,
            section_name: r.get(9)?,
            subject_id: r.get(10)?,
            subject_name: r.get(11)?,
        })
    })?;
    rows.collect()
}

pub fn holiday_name(conn: &Connection, school_id: &str, date: NaiveDate) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM holidays WHERE school_id = ? AND holiday_date = ?",
        (school_id, date),
        |r| r.get(0),
    )
    .optional()
}

// ---- attendance -----------------------------------------------------------

const LOCK_COLUMNS: &str =
    "id, school_id, class_group_id, section_id, teacher_id, attendance_date, locked_at";

fn lock_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceLock> {
    Ok(AttendanceLock {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_group_id: r.get(2)?,
        section_id: r.get(3)?,
        teacher_id: r.get(4)?,
        attendance_date: r.get(5)?,
        locked_at: r.get(6)?,
    })
}

pub fn lock_for_teacher(conn: &Connection, teacher_id: &str, date: NaiveDate) -> rusqlite::Result<Option<AttendanceLock>> {
    conn.query_row(
        &format!(
            "SELECT {LOCK_COLUMNS} FROM attendance_locks WHERE teacher_id = ? AND attendance_date = ?"
        ),
        (teacher_id, date),
        lock_from_row,
    )
    .optional()
}

pub fn lock_for_class(
    conn: &Connection,
    class_group_id: &str,
    section_id: Option<&str>,
    date: NaiveDate,
) -> rusqlite::Result<Option<AttendanceLock>> {
    conn.query_row(
        &format!(
            "SELECT {LOCK_COLUMNS} FROM attendance_locks
             WHERE class_group_id = ? AND IFNULL(section_id, '') = IFNULL(?, '') AND attendance_date = ?"
        ),
        (class_group_id, section_id, date),
        lock_from_row,
    )
    .optional()
}

/// Inserts the lock row. A repeat by the same teacher is a no-op; a clash with another
/// teacher's lock on the class surfaces as a unique-constraint error.
pub fn insert_lock(
    conn: &Connection,
    school_id: &str,
    class_group_id: &str,
    section_id: Option<&str>,
    teacher_id: &str,
    date: NaiveDate,
) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "INSERT INTO attendance_locks(id, school_id, class_group_id, section_id, teacher_id, attendance_date, locked_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(teacher_id, attendance_date) DO NOTHING",
        (
            uuid::Uuid::new_v4().to_string(),
            school_id,
            class_group_id,
            section_id,
            teacher_id,
            date,
            now_stamp(),
        ),
    )?;
    Ok(n > 0)
}

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

pub struct AttendanceWrite<'a> {
    pub student_id: &'a str,
    pub school_id: &'a str,
    pub class_group_id: &'a str,
    pub section_id: Option<&'a str>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_by: Option<&'a str>,
}

/// Upsert keyed on (student_id, attendance_date); always leaves the row locked.
pub fn upsert_student_attendance(conn: &Connection, w: &AttendanceWrite<'_>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO student_attendance(student_id, attendance_date, school_id, class_group_id, section_id, status, marked_by, is_locked, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 1, ?)
         ON CONFLICT(student_id, attendance_date) DO UPDATE SET
           school_id = excluded.school_id,
           class_group_id = excluded.class_group_id,
           section_id = excluded.section_id,
           status = excluded.status,
           marked_by = excluded.marked_by,
           is_locked = 1,
           updated_at = excluded.updated_at",
        (
            w.student_id,
            w.date,
            w.school_id,
            w.class_group_id,
            w.section_id,
            w.status.as_str(),
            w.marked_by,
            now_stamp(),
        ),
    )?;
    Ok(())
}

/// Insert-only variant: returns false when the student already has a row for the date.
pub fn insert_student_attendance_if_absent(conn: &Connection, w: &AttendanceWrite<'_>) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "INSERT INTO student_attendance(student_id, attendance_date, school_id, class_group_id, section_id, status, marked_by, is_locked, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 1, ?)
         ON CONFLICT(student_id, attendance_date) DO NOTHING",
        (
            w.student_id,
            w.date,
            w.school_id,
            w.class_group_id,
            w.section_id,
            w.status.as_str(),
            w.marked_by,
            now_stamp(),
        ),
    )?;
    Ok(n > 0)
}

// ---- fee definitions ------------------------------------------------------

/// The active class-fee default for a class group; newest start date wins if several exist.
pub fn class_fee_default(conn: &Connection, school_id: &str, class_group_id: &str) -> rusqlite::Result<Option<FeeCategoryRow>> {
    conn.query_row(
        "SELECT id, name, amount, fee_cycle, start_date
         FROM fee_categories
         WHERE school_id = ? AND class_group_id = ? AND kind = 'class' AND is_active = 1
         ORDER BY IFNULL(start_date, '') DESC, id
         LIMIT 1",
        (school_id, class_group_id),
        category_from_row,
    )
    .optional()
}

/// Active custom categories scoped to the class group or to the whole school.
pub fn custom_fee_categories(conn: &Connection, school_id: &str, class_group_id: &str) -> rusqlite::Result<Vec<FeeCategoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, amount, fee_cycle, start_date
         FROM fee_categories
         WHERE school_id = ? AND kind = 'custom' AND is_active = 1
           AND (class_group_id IS NULL OR class_group_id = ?)
         ORDER BY name, id",
    )?;
    let rows = stmt.query_map((school_id, class_group_id), category_from_row)?;
    rows.collect()
}

fn category_from_row(r: &Row<'_>) -> rusqlite::Result<FeeCategoryRow> {
    Ok(FeeCategoryRow {
        id: r.get(0)?,
        name: r.get(1)?,
        amount: get_money(r, 2)?,
        fee_cycle: get_cycle(r, 3)?,
        start_date: r.get(4)?,
    })
}

pub fn transport_assignment(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<TransportAssignment>> {
    conn.query_row(
        "SELECT r.id, r.name, r.base_fee, r.escort_fee, r.fuel_surcharge, r.fee_cycle, r.start_date, st.start_date
         FROM student_transport st
         JOIN transport_routes r ON r.id = st.route_id
         WHERE st.student_id = ? AND st.is_active = 1 AND r.is_active = 1",
        [student_id],
        |r| {
            Ok(TransportAssignment {
                route_id: r.get(0)?,
                route_name: r.get(1)?,
                base_fee: get_money(r, 2)?,
                escort_fee: get_money(r, 3)?,
                fuel_surcharge: get_money(r, 4)?,
                fee_cycle: get_cycle(r, 5)?,
                route_start_date: r.get(6)?,
                assigned_from: r.get(7)?,
            })
        },
    )
    .optional()
}

pub fn overrides_for_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<FeeOverride>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, fee_category_id, effective_from, effective_to,
                is_full_free, custom_fee_amount, discount_amount
         FROM fee_overrides
         WHERE student_id = ?
         ORDER BY effective_from DESC, id",
    )?;
    let rows = stmt.query_map([student_id], |r| {
        Ok(FeeOverride {
            id: r.get(0)?,
            student_id: r.get(1)?,
            fee_category_id: r.get(2)?,
            effective_from: r.get(3)?,
            effective_to: r.get(4)?,
            is_full_free: r.get::<_, i64>(5)? != 0,
            custom_fee_amount: get_opt_money(r, 6)?,
            discount_amount: get_opt_money(r, 7)?,
        })
    })?;
    rows.collect()
}

// ---- monthly components ---------------------------------------------------

const COMPONENT_COLUMNS: &str = "id, student_id, school_id, fee_category_id, fee_type, fee_cycle, description,
     period_year, period_month, period_start, period_end, fee_amount, paid_amount, pending_amount,
     status, due_date, effective_from";

fn component_from_row(r: &Row<'_>) -> rusqlite::Result<MonthlyFeeComponent> {
    let fee_type_raw: String = r.get(4)?;
    let status_raw: String = r.get(14)?;
    Ok(MonthlyFeeComponent {
        id: r.get(0)?,
        student_id: r.get(1)?,
        school_id: r.get(2)?,
        fee_category_id: r.get(3)?,
        fee_type: FeeType::parse(&fee_type_raw)
            .ok_or_else(|| conversion_err(4, format!("unknown fee type {fee_type_raw:?}")))?,
        fee_cycle: get_cycle(r, 5)?,
        description: r.get(6)?,
        period_year: r.get(7)?,
        period_month: r.get(8)?,
        period_start: r.get(9)?,
        period_end: r.get(10)?,
        fee_amount: get_money(r, 11)?,
        paid_amount: get_money(r, 12)?,
        pending_amount: get_money(r, 13)?,
        status: ComponentStatus::parse(&status_raw)
            .ok_or_else(|| conversion_err(14, format!("unknown status {status_raw:?}")))?,
        due_date: r.get(15)?,
        effective_from: r.get(16)?,
    })
}

pub fn find_component_by_key(
    conn: &Connection,
    student_id: &str,
    year: i32,
    month: u32,
    fee_type: FeeType,
    fee_category_id: Option<&str>,
) -> rusqlite::Result<Option<MonthlyFeeComponent>> {
    conn.query_row(
        &format!(
            "SELECT {COMPONENT_COLUMNS} FROM monthly_fee_components
             WHERE student_id = ? AND period_year = ? AND period_month = ? AND fee_type = ?
               AND IFNULL(fee_category_id, '') = IFNULL(?, '')"
        ),
        (student_id, year, month, fee_type.as_str(), fee_category_id),
        component_from_row,
    )
    .optional()
}

pub fn find_component(conn: &Connection, component_id: &str) -> rusqlite::Result<Option<MonthlyFeeComponent>> {
    conn.query_row(
        &format!("SELECT {COMPONENT_COLUMNS} FROM monthly_fee_components WHERE id = ?"),
        [component_id],
        component_from_row,
    )
    .optional()
}

pub fn insert_component(conn: &Connection, c: &MonthlyFeeComponent) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO monthly_fee_components(
            id, student_id, school_id, fee_category_id, fee_type, fee_cycle, description,
            period_year, period_month, period_start, period_end, fee_amount, paid_amount,
            pending_amount, status, due_date, effective_from, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            c.id,
            c.student_id,
            c.school_id,
            c.fee_category_id,
            c.fee_type.as_str(),
            c.fee_cycle.as_str(),
            c.description,
            c.period_year,
            c.period_month,
            c.period_start,
            c.period_end,
            c.fee_amount.to_string(),
            c.paid_amount.to_string(),
            c.pending_amount.to_string(),
            c.status.as_str(),
            c.due_date,
            c.effective_from,
            now_stamp(),
        ],
    )?;
    Ok(())
}

/// Rewrites the descriptive and amount fields of an existing component.
/// `paid_amount` and `status` belong to fee collection and are not touched.
pub fn update_component_amounts(conn: &Connection, id: &str, c: &MonthlyFeeComponent) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE monthly_fee_components SET
            fee_amount = ?, pending_amount = ?, fee_cycle = ?, description = ?,
            period_start = ?, period_end = ?, due_date = ?, effective_from = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            c.fee_amount.to_string(),
            c.pending_amount.to_string(),
            c.fee_cycle.as_str(),
            c.description,
            c.period_start,
            c.period_end,
            c.due_date,
            c.effective_from,
            now_stamp(),
            id,
        ],
    )?;
    Ok(())
}

pub fn update_component_payment(
    conn: &Connection,
    id: &str,
    paid_amount: Decimal,
    pending_amount: Decimal,
    status: ComponentStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE monthly_fee_components SET paid_amount = ?, pending_amount = ?, status = ?, updated_at = ?
         WHERE id = ?",
        (
            paid_amount.to_string(),
            pending_amount.to_string(),
            status.as_str(),
            now_stamp(),
            id,
        ),
    )?;
    Ok(())
}

/// Distinct billed months in `[start_year, end_year]`, most recent first.
pub fn component_months(
    conn: &Connection,
    student_id: &str,
    school_id: &str,
    start_year: i32,
    end_year: i32,
) -> rusqlite::Result<Vec<(i32, u32)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT period_year, period_month
         FROM monthly_fee_components
         WHERE student_id = ? AND school_id = ? AND period_year BETWEEN ? AND ?
         ORDER BY period_year DESC, period_month DESC",
    )?;
    let rows = stmt.query_map((student_id, school_id, start_year, end_year), |r| {
        Ok((r.get(0)?, r.get(1)?))
    })?;
    rows.collect()
}

pub fn components_for_month(
    conn: &Connection,
    student_id: &str,
    school_id: &str,
    year: i32,
    month: u32,
) -> rusqlite::Result<Vec<MonthlyFeeComponent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COMPONENT_COLUMNS} FROM monthly_fee_components
         WHERE student_id = ? AND school_id = ? AND period_year = ? AND period_month = ?
         ORDER BY CASE fee_type WHEN 'class-fee' THEN 0 WHEN 'transport-fee' THEN 1 ELSE 2 END,
                  description, id"
    ))?;
    let rows = stmt.query_map((student_id, school_id, year, month), component_from_row)?;
    rows.collect()
}

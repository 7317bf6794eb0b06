//! Attendance lock manager.
//!
//! One teacher claims a class/section for a date by submitting attendance for it,
//! and only for the first class on that teacher's timetable for the day. Claims are
//! permanent: there is no unlock.

use crate::clock::Clock;
use crate::config::SchoolPolicy;
use crate::error::{CoreError, Result};
use crate::model::{AttendanceInput, AttendanceLock, AttendanceStatus, TimetablePeriod};
use crate::period::{day_of_week, weekday_name};
use crate::store::{self, AttendanceWrite};
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

pub const DENY_OTHER_CLASS: &str =
    "You have already marked attendance for another class today.";
pub const DENY_OTHER_TEACHER: &str =
    "Attendance for this class has already been marked by another teacher today.";
pub const DENY_NO_SCHEDULE: &str = "You have no classes scheduled for you today.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayCheck {
    pub is_holiday: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HolidayCheck {
    fn no() -> Self {
        Self {
            is_holiday: false,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkDecision {
    Allowed { first_class: TimetablePeriod },
    Denied { reason: String },
}

impl MarkDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Allowed { first_class } => serde_json::json!({
                "allowed": true,
                "firstClass": first_class,
            }),
            Self::Denied { reason } => serde_json::json!({
                "allowed": false,
                "reason": reason,
            }),
        }
    }
}

/// The teacher's canonical first class on `date`.
///
/// Periods starting at or after the current wall-clock time are "upcoming"; the
/// earliest of those wins. When none are upcoming the day's first period is used.
/// An unreadable timetable counts as "no class today".
pub fn first_class_of_day(
    conn: &Connection,
    clock: &dyn Clock,
    teacher_id: &str,
    date: NaiveDate,
) -> Option<TimetablePeriod> {
    let periods = match store::teacher_periods(conn, teacher_id, day_of_week(date), date.year()) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(teacher_id, %date, error = %e, "timetable lookup failed; treating as no class");
            return None;
        }
    };
    let now = clock.now().time();
    let upcoming = periods.iter().find(|p| p.start_time >= now);
    upcoming.or_else(|| periods.first()).cloned()
}

/// Weekly off days (Sunday by default) and declared holidays. Store errors count as
/// "not a holiday" so a flaky read never blocks marking.
pub fn is_holiday(conn: &Connection, policy: &SchoolPolicy, school_id: &str, date: NaiveDate) -> HolidayCheck {
    let dow = day_of_week(date);
    if policy.is_weekly_off(dow) {
        return HolidayCheck {
            is_holiday: true,
            reason: Some(weekday_name(dow).to_string()),
        };
    }
    match store::holiday_name(conn, school_id, date) {
        Ok(Some(name)) => HolidayCheck {
            is_holiday: true,
            reason: Some(name),
        },
        Ok(None) => HolidayCheck::no(),
        Err(e) => {
            tracing::warn!(school_id, %date, error = %e, "holiday lookup failed; treating as school day");
            HolidayCheck::no()
        }
    }
}

/// Decides whether `teacher_id` may record attendance for the class on `date`.
/// Denials are values; only an unreadable lock table is an error.
pub fn can_mark(
    conn: &Connection,
    clock: &dyn Clock,
    teacher_id: &str,
    class_group_id: &str,
    section_id: Option<&str>,
    date: NaiveDate,
) -> Result<MarkDecision> {
    if let Some(own) = store::lock_for_teacher(conn, teacher_id, date)? {
        if !own.covers(class_group_id, section_id) {
            return Ok(MarkDecision::denied(DENY_OTHER_CLASS));
        }
    }

    if let Some(held) = store::lock_for_class(conn, class_group_id, section_id, date)? {
        if held.teacher_id != teacher_id {
            return Ok(MarkDecision::denied(DENY_OTHER_TEACHER));
        }
    }

    let Some(first) = first_class_of_day(conn, clock, teacher_id, date) else {
        return Ok(MarkDecision::denied(DENY_NO_SCHEDULE));
    };

    if first.class_group_id != class_group_id || first.section_id.as_deref() != section_id {
        return Ok(MarkDecision::denied(format!(
            "You can only mark attendance for your first class today ({}).",
            first.label()
        )));
    }

    Ok(MarkDecision::Allowed { first_class: first })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub saved: usize,
    pub first_class: TimetablePeriod,
}

/// Re-checks `can_mark`, claims the lock, and writes every record, all in one
/// transaction. Any failure rolls the whole submission back.
#[allow(clippy::too_many_arguments)]
pub fn save_attendance(
    conn: &Connection,
    clock: &dyn Clock,
    teacher_id: &str,
    class_group_id: &str,
    section_id: Option<&str>,
    school_id: &str,
    date: NaiveDate,
    records: &[AttendanceInput],
) -> Result<SaveSummary> {
    let mut seen = HashSet::new();
    for r in records {
        if !seen.insert(r.student_id.as_str()) {
            return Err(CoreError::invalid(format!("duplicate student {}", r.student_id)));
        }
        if r.status == AttendanceStatus::Holiday {
            return Err(CoreError::invalid("holiday status is reserved for system marking"));
        }
    }

    let tx = conn.unchecked_transaction()?;
    if !store::teacher_exists(&tx, teacher_id)? {
        return Err(CoreError::not_found("teacher", teacher_id));
    }

    let first_class = match can_mark(&tx, clock, teacher_id, class_group_id, section_id, date)? {
        MarkDecision::Allowed { first_class } => first_class,
        MarkDecision::Denied { reason } => {
            tracing::info!(teacher_id, class_group_id, %date, %reason, "attendance submission denied");
            return Err(CoreError::Denied(reason));
        }
    };

    match store::insert_lock(&tx, school_id, class_group_id, section_id, teacher_id, date) {
        Ok(_) => {}
        Err(e) if store::is_unique_violation(&e) => {
            return Err(CoreError::Denied(DENY_OTHER_TEACHER.to_string()));
        }
        Err(e) => return Err(CoreError::write(e)),
    }

    for r in records {
        let Some(student) = store::find_student(&tx, &r.student_id, school_id)? else {
            return Err(CoreError::not_found("student", r.student_id.clone()));
        };
        if student.class_group_id != class_group_id || student.section_id.as_deref() != section_id {
            return Err(CoreError::invalid(format!(
                "student {} is not enrolled in this class",
                r.student_id
            )));
        }
        store::upsert_student_attendance(
            &tx,
            &AttendanceWrite {
                student_id: &r.student_id,
                school_id,
                class_group_id,
                section_id,
                date,
                status: r.status,
                marked_by: Some(teacher_id),
            },
        )
        .map_err(CoreError::write)?;
    }
    tx.commit().map_err(CoreError::write)?;

    tracing::info!(
        teacher_id,
        class_group_id,
        section_id = section_id.unwrap_or("-"),
        %date,
        saved = records.len(),
        "attendance saved and class locked"
    );
    Ok(SaveSummary {
        saved: records.len(),
        first_class,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayMarking {
    pub is_holiday: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub marked: usize,
    pub skipped: usize,
}

/// Marks every active student as `holiday` when the date is a holiday. Whether an
/// existing record for the date is replaced follows `policy.holiday_overwrites_marked`.
pub fn apply_holiday_attendance(
    conn: &Connection,
    policy: &SchoolPolicy,
    school_id: &str,
    date: NaiveDate,
) -> Result<HolidayMarking> {
    let check = is_holiday(conn, policy, school_id, date);
    if !check.is_holiday {
        return Ok(HolidayMarking {
            is_holiday: false,
            reason: None,
            marked: 0,
            skipped: 0,
        });
    }

    let tx = conn.unchecked_transaction()?;
    let students = store::active_students(&tx, school_id)?;
    let mut marked = 0;
    let mut skipped = 0;
    for s in &students {
        let w = AttendanceWrite {
            student_id: &s.id,
            school_id,
            class_group_id: &s.class_group_id,
            section_id: s.section_id.as_deref(),
            date,
            status: AttendanceStatus::Holiday,
            marked_by: None,
        };
        if policy.holiday_overwrites_marked {
            store::upsert_student_attendance(&tx, &w).map_err(CoreError::write)?;
            marked += 1;
        } else if store::insert_student_attendance_if_absent(&tx, &w).map_err(CoreError::write)? {
            marked += 1;
        } else {
            skipped += 1;
        }
    }
    tx.commit().map_err(CoreError::write)?;

    tracing::info!(school_id, %date, marked, skipped, "holiday attendance applied");
    Ok(HolidayMarking {
        is_holiday: true,
        reason: check.reason,
        marked,
        skipped,
    })
}

pub fn lock_status(
    conn: &Connection,
    class_group_id: &str,
    section_id: Option<&str>,
    date: NaiveDate,
) -> Result<Option<AttendanceLock>> {
    Ok(store::lock_for_class(conn, class_group_id, section_id, date)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db;
    use crate::store::fixtures;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> FixedClock {
        FixedClock(monday().and_hms_opt(h, m, 0).unwrap())
    }

    /// Teacher t1 on Mondays: period 1 at 08:00 in cgA/secA, period 3 at 10:00 in cgB/secB.
    fn setup() -> Connection {
        let conn = db::open_memory();
        fixtures::school(&conn);
        fixtures::period(&conn, "p1", "t1", 1, 2024, 1, "08:00", "cgA", Some("secA"));
        fixtures::period(&conn, "p3", "t1", 1, 2024, 3, "10:00", "cgB", Some("secB"));
        fixtures::student(&conn, "stuA1", "cgA", Some("secA"), "2024-01-05");
        fixtures::student(&conn, "stuA2", "cgA", Some("secA"), "2024-01-05");
        fixtures::student(&conn, "stuB1", "cgB", Some("secB"), "2024-01-05");
        conn
    }

    fn present(id: &str) -> AttendanceInput {
        AttendanceInput {
            student_id: id.to_string(),
            status: AttendanceStatus::Present,
        }
    }

    #[test]
    fn first_class_prefers_upcoming_then_falls_back() {
        let conn = setup();
        let early = first_class_of_day(&conn, &at(7, 30), "t1", monday()).unwrap();
        assert_eq!(early.id, "p1");
        let mid = first_class_of_day(&conn, &at(9, 0), "t1", monday()).unwrap();
        assert_eq!(mid.id, "p3");
        let late = first_class_of_day(&conn, &at(15, 0), "t1", monday()).unwrap();
        assert_eq!(late.id, "p1");
    }

    #[test]
    fn single_period_resolves_same_either_side_of_start() {
        let conn = setup();
        fixtures::period(&conn, "solo", "t2", 1, 2024, 2, "09:00", "cgA", Some("secA"));
        let before = first_class_of_day(&conn, &at(8, 0), "t2", monday());
        let after = first_class_of_day(&conn, &at(11, 0), "t2", monday());
        assert_eq!(before, after);
        assert!(first_class_of_day(&conn, &at(8, 0), "t2", monday().succ_opt().unwrap()).is_none());
    }

    #[test]
    fn holiday_check_covers_sunday_declared_and_plain_days() {
        let conn = setup();
        let policy = SchoolPolicy::default();
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(is_holiday(&conn, &policy, "sch1", sunday).reason.as_deref(), Some("Sunday"));

        conn.execute(
            "INSERT INTO holidays(school_id, holiday_date, name) VALUES('sch1', '2024-04-11', 'Eid')",
            [],
        )
        .unwrap();
        let eid = is_holiday(&conn, &policy, "sch1", NaiveDate::from_ymd_opt(2024, 4, 11).unwrap());
        assert!(eid.is_holiday);
        assert_eq!(eid.reason.as_deref(), Some("Eid"));
        assert!(!is_holiday(&conn, &policy, "sch1", monday()).is_holiday);
    }

    #[test]
    fn holiday_check_fails_open_on_store_error() {
        let conn = setup();
        conn.execute("DROP TABLE holidays", []).unwrap();
        let check = is_holiday(&conn, &SchoolPolicy::default(), "sch1", monday());
        assert!(!check.is_holiday);
    }

    #[test]
    fn first_class_fails_soft_on_store_error() {
        let conn = setup();
        conn.execute("DROP TABLE timetable_periods", []).unwrap();
        assert_eq!(first_class_of_day(&conn, &at(9, 0), "t1", monday()), None);
        let d = can_mark(&conn, &at(9, 0), "t1", "cgA", Some("secA"), monday()).unwrap();
        assert_eq!(
            d,
            MarkDecision::Denied {
                reason: DENY_NO_SCHEDULE.to_string()
            }
        );
    }

    #[test]
    fn can_mark_requires_first_class() {
        let conn = setup();
        let d = can_mark(&conn, &at(7, 30), "t1", "cgB", Some("secB"), monday()).unwrap();
        match d {
            MarkDecision::Denied { reason } => {
                assert!(reason.contains("first class"), "{reason}");
                assert!(reason.contains("Period 1"), "{reason}");
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert!(can_mark(&conn, &at(7, 30), "t1", "cgA", Some("secA"), monday())
            .unwrap()
            .is_allowed());
    }

    #[test]
    fn can_mark_section_none_never_matches_a_section() {
        let conn = setup();
        let d = can_mark(&conn, &at(7, 30), "t1", "cgA", None, monday()).unwrap();
        assert!(!d.is_allowed());
    }

    #[test]
    fn can_mark_denies_without_schedule() {
        let conn = setup();
        let d = can_mark(&conn, &at(7, 30), "t2", "cgA", Some("secA"), monday()).unwrap();
        assert_eq!(
            d,
            MarkDecision::Denied {
                reason: DENY_NO_SCHEDULE.to_string()
            }
        );
    }

    #[test]
    fn save_locks_class_for_the_day() {
        let conn = setup();
        let clock = at(7, 30);
        let summary = save_attendance(
            &conn,
            &clock,
            "t1",
            "cgA",
            Some("secA"),
            "sch1",
            monday(),
            &[present("stuA1"), present("stuA2")],
        )
        .unwrap();
        assert_eq!(summary.saved, 2);

        let lock = lock_status(&conn, "cgA", Some("secA"), monday()).unwrap().unwrap();
        assert_eq!(lock.teacher_id, "t1");
        let (locked, by): (i64, String) = conn
            .query_row(
                "SELECT is_locked, marked_by FROM student_attendance WHERE student_id = 'stuA1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((locked, by.as_str()), (1, "t1"));

        // Resubmission by the owner is still allowed.
        assert!(can_mark(&conn, &clock, "t1", "cgA", Some("secA"), monday())
            .unwrap()
            .is_allowed());
        // Same teacher, different class: denied.
        let other = can_mark(&conn, &at(9, 0), "t1", "cgB", Some("secB"), monday()).unwrap();
        assert_eq!(
            other,
            MarkDecision::Denied {
                reason: DENY_OTHER_CLASS.to_string()
            }
        );
    }

    #[test]
    fn lock_denies_other_teachers_indefinitely() {
        let conn = setup();
        fixtures::period(&conn, "t2p1", "t2", 1, 2024, 1, "08:00", "cgA", Some("secA"));
        save_attendance(&conn, &at(7, 30), "t1", "cgA", Some("secA"), "sch1", monday(), &[present("stuA1")])
            .unwrap();

        for clock in [at(7, 45), at(12, 0), at(23, 59)] {
            let d = can_mark(&conn, &clock, "t2", "cgA", Some("secA"), monday()).unwrap();
            assert_eq!(
                d,
                MarkDecision::Denied {
                    reason: DENY_OTHER_TEACHER.to_string()
                }
            );
        }
        let err = save_attendance(&conn, &at(7, 45), "t2", "cgA", Some("secA"), "sch1", monday(), &[present("stuA2")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Denied(ref r) if r == DENY_OTHER_TEACHER));
    }

    #[test]
    fn failed_record_rolls_back_lock_and_rows() {
        let conn = setup();
        let err = save_attendance(
            &conn,
            &at(7, 30),
            "t1",
            "cgA",
            Some("secA"),
            "sch1",
            monday(),
            &[present("stuA1"), present("ghost")],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(lock_status(&conn, "cgA", Some("secA"), monday()).unwrap().is_none());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM student_attendance", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn save_rejects_students_from_other_classes() {
        let conn = setup();
        let err = save_attendance(&conn, &at(7, 30), "t1", "cgA", Some("secA"), "sch1", monday(), &[present("stuB1")])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn holiday_marking_preserves_existing_rows_by_default() {
        let conn = setup();
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        conn.execute(
            "INSERT INTO student_attendance(student_id, attendance_date, school_id, class_group_id, section_id, status, marked_by, is_locked)
             VALUES('stuA1', '2024-03-31', 'sch1', 'cgA', 'secA', 'present', 't1', 1)",
            [],
        )
        .unwrap();

        let out = apply_holiday_attendance(&conn, &SchoolPolicy::default(), "sch1", sunday).unwrap();
        assert_eq!((out.marked, out.skipped), (2, 1));
        let status: String = conn
            .query_row(
                "SELECT status FROM student_attendance WHERE student_id = 'stuA1' AND attendance_date = '2024-03-31'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "present");

        let overwrite = SchoolPolicy {
            holiday_overwrites_marked: true,
            ..SchoolPolicy::default()
        };
        let out = apply_holiday_attendance(&conn, &overwrite, "sch1", sunday).unwrap();
        assert_eq!(out.marked, 3);
        let (status, by): (String, Option<String>) = conn
            .query_row(
                "SELECT status, marked_by FROM student_attendance WHERE student_id = 'stuA1' AND attendance_date = '2024-03-31'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "holiday");
        assert!(by.is_none());
    }

    #[test]
    fn holiday_marking_is_noop_on_school_days() {
        let conn = setup();
        let out = apply_holiday_attendance(&conn, &SchoolPolicy::default(), "sch1", monday()).unwrap();
        assert!(!out.is_holiday);
        assert_eq!(out.marked, 0);
    }
}

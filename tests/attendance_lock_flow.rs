mod support;

use rusqlite::Connection;
use serde_json::json;
use support::{open_workspace, seed_period, seed_student};

const MONDAY: &str = "2024-04-01";

/// t1 teaches Grade 5 A at 08:00 and Grade 6 B at 10:00 on Mondays; t2 also has
/// Grade 5 A at 08:00.
fn seed_timetable(conn: &Connection) {
    seed_period(conn, "p1", "t1", 1, 2024, 1, "08:00", "cgA", Some("secA"), "math");
    seed_period(conn, "p3", "t1", 1, 2024, 3, "10:00", "cgB", Some("secB"), "sci");
    seed_period(conn, "q1", "t2", 1, 2024, 1, "08:00", "cgA", Some("secA"), "sci");
    seed_student(conn, "s1", "cgA", Some("secA"), "2023-06-01");
    seed_student(conn, "s2", "cgA", Some("secA"), "2023-06-01");
    seed_student(conn, "s3", "cgB", Some("secB"), "2023-06-01");
}

fn stored_status(conn: &Connection, student_id: &str, date: &str) -> Option<String> {
    conn.query_row(
        "SELECT status FROM student_attendance WHERE student_id = ? AND attendance_date = ?",
        (student_id, date),
        |r| r.get(0),
    )
    .ok()
}

#[test]
fn first_class_follows_wall_clock() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);

    let early = sidecar.call_ok(
        "attendance.firstClass",
        json!({ "teacherId": "t1", "date": MONDAY, "asOf": "2024-04-01T07:30" }),
    );
    assert_eq!(early["firstClass"]["id"], json!("p1"));
    assert_eq!(early["firstClass"]["className"], json!("Grade 5"));

    let later = sidecar.call_ok(
        "attendance.firstClass",
        json!({ "teacherId": "t1", "date": MONDAY, "asOf": "2024-04-01T09:00" }),
    );
    assert_eq!(later["firstClass"]["id"], json!("p3"));

    // Past the last period the day's first period is reported.
    let evening = sidecar.call_ok(
        "attendance.firstClass",
        json!({ "teacherId": "t1", "date": MONDAY, "asOf": "2024-04-01T18:00" }),
    );
    assert_eq!(evening["firstClass"]["id"], json!("p1"));

    let tuesday = sidecar.call_ok(
        "attendance.firstClass",
        json!({ "teacherId": "t1", "date": "2024-04-02", "asOf": "2024-04-02T07:00" }),
    );
    assert!(tuesday["firstClass"].is_null());
}

#[test]
fn saving_locks_class_and_teacher_for_the_day() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);
    let as_of = "2024-04-01T07:30";

    let allowed = sidecar.call_ok(
        "attendance.canMark",
        json!({ "teacherId": "t1", "classGroupId": "cgA", "sectionId": "secA", "date": MONDAY, "asOf": as_of }),
    );
    assert_eq!(allowed["allowed"], json!(true));

    let wrong_class = sidecar.call_ok(
        "attendance.canMark",
        json!({ "teacherId": "t1", "classGroupId": "cgB", "sectionId": "secB", "date": MONDAY, "asOf": as_of }),
    );
    assert_eq!(wrong_class["allowed"], json!(false));
    assert_eq!(
        wrong_class["reason"],
        json!("You can only mark attendance for your first class today (Grade 5 A - Math, Period 1).")
    );

    let saved = sidecar.call_ok(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": as_of,
            "records": [
                { "studentId": "s1", "status": "present" },
                { "studentId": "s2", "status": "absent" }
            ]
        }),
    );
    assert_eq!(saved["saved"], json!(2));
    assert_eq!(stored_status(&conn, "s1", MONDAY).as_deref(), Some("present"));
    assert_eq!(stored_status(&conn, "s2", MONDAY).as_deref(), Some("absent"));

    let other_class = sidecar.call_ok(
        "attendance.canMark",
        json!({ "teacherId": "t1", "classGroupId": "cgB", "sectionId": "secB", "date": MONDAY, "asOf": "2024-04-01T09:30" }),
    );
    assert_eq!(
        other_class["reason"],
        json!("You have already marked attendance for another class today.")
    );

    let other_teacher = sidecar.call_ok(
        "attendance.canMark",
        json!({ "teacherId": "t2", "classGroupId": "cgA", "sectionId": "secA", "date": MONDAY, "asOf": as_of }),
    );
    assert_eq!(
        other_teacher["reason"],
        json!("Attendance for this class has already been marked by another teacher today.")
    );

    let denied = sidecar.call_err(
        "attendance.save",
        json!({
            "teacherId": "t2",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": as_of,
            "records": [{ "studentId": "s1", "status": "late" }]
        }),
    );
    assert_eq!(denied["code"], json!("denied"));
    assert_eq!(stored_status(&conn, "s1", MONDAY).as_deref(), Some("present"));

    // The owner may resubmit corrections while the class is still first.
    sidecar.call_ok(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": "2024-04-01T07:45",
            "records": [{ "studentId": "s2", "status": "late" }]
        }),
    );
    assert_eq!(stored_status(&conn, "s2", MONDAY).as_deref(), Some("late"));

    let status = sidecar.call_ok(
        "attendance.lockStatus",
        json!({ "classGroupId": "cgA", "sectionId": "secA", "date": MONDAY }),
    );
    assert_eq!(status["locked"], json!(true));
    assert_eq!(status["lock"]["teacherId"], json!("t1"));

    let free = sidecar.call_ok(
        "attendance.lockStatus",
        json!({ "classGroupId": "cgB", "sectionId": "secB", "date": MONDAY }),
    );
    assert_eq!(free["locked"], json!(false));
}

#[test]
fn rejected_submission_leaves_no_lock() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);

    // s3 belongs to Grade 6, so the whole submission rolls back.
    let error = sidecar.call_err(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": "2024-04-01T07:30",
            "records": [
                { "studentId": "s1", "status": "present" },
                { "studentId": "s3", "status": "present" }
            ]
        }),
    );
    assert_eq!(error["code"], json!("bad_params"));
    assert_eq!(stored_status(&conn, "s1", MONDAY), None);

    let status = sidecar.call_ok(
        "attendance.lockStatus",
        json!({ "classGroupId": "cgA", "sectionId": "secA", "date": MONDAY }),
    );
    assert_eq!(status["locked"], json!(false));

    let unknown = sidecar.call_err(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": "2024-04-01T07:30",
            "records": [{ "studentId": "ghost", "status": "present" }]
        }),
    );
    assert_eq!(unknown["code"], json!("not_found"));
    assert_eq!(unknown["details"]["entity"], json!("student"));

    let reserved = sidecar.call_err(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "records": [{ "studentId": "s1", "status": "holiday" }]
        }),
    );
    assert_eq!(reserved["code"], json!("bad_params"));
}

#[test]
fn holidays_mark_every_active_student() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);

    let sunday = sidecar.call_ok(
        "attendance.holidayCheck",
        json!({ "schoolId": "sch1", "date": "2024-04-07" }),
    );
    assert_eq!(sunday["isHoliday"], json!(true));
    assert_eq!(sunday["reason"], json!("Sunday"));

    let marked = sidecar.call_ok(
        "attendance.applyHoliday",
        json!({ "schoolId": "sch1", "date": "2024-04-07" }),
    );
    assert_eq!(marked["marked"], json!(3));
    assert_eq!(stored_status(&conn, "s3", "2024-04-07").as_deref(), Some("holiday"));

    let school_day = sidecar.call_ok(
        "attendance.applyHoliday",
        json!({ "schoolId": "sch1", "date": MONDAY }),
    );
    assert_eq!(school_day["isHoliday"], json!(false));
    assert_eq!(school_day["marked"], json!(0));
}

#[test]
fn declared_holiday_keeps_existing_marks_unless_policy_says_otherwise() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);
    conn.execute(
        "INSERT INTO holidays(school_id, holiday_date, name) VALUES('sch1', ?, 'Founders Day')",
        [MONDAY],
    )
    .expect("seed holiday");
    sidecar.call_ok(
        "attendance.save",
        json!({
            "teacherId": "t1",
            "classGroupId": "cgA",
            "sectionId": "secA",
            "schoolId": "sch1",
            "date": MONDAY,
            "asOf": "2024-04-01T07:30",
            "records": [{ "studentId": "s1", "status": "present" }]
        }),
    );

    let first = sidecar.call_ok("attendance.applyHoliday", json!({ "schoolId": "sch1", "date": MONDAY }));
    assert_eq!(first["reason"], json!("Founders Day"));
    assert_eq!(first["marked"], json!(2));
    assert_eq!(first["skipped"], json!(1));
    assert_eq!(stored_status(&conn, "s1", MONDAY).as_deref(), Some("present"));

    sidecar.call_ok(
        "setup.policy.update",
        json!({ "schoolId": "sch1", "patch": { "holidayOverwritesMarked": true } }),
    );
    let second = sidecar.call_ok("attendance.applyHoliday", json!({ "schoolId": "sch1", "date": MONDAY }));
    assert_eq!(second["marked"], json!(3));
    assert_eq!(stored_status(&conn, "s1", MONDAY).as_deref(), Some("holiday"));
}

#[test]
fn unreadable_timetable_reports_no_first_class() {
    let (_dir, mut sidecar, conn) = open_workspace();
    seed_timetable(&conn);
    conn.execute_batch("DROP TABLE timetable_periods;").expect("drop timetable");

    let first = sidecar.call_ok(
        "attendance.firstClass",
        json!({ "teacherId": "t1", "date": MONDAY, "asOf": "2024-04-01T07:30" }),
    );
    assert!(first["firstClass"].is_null());

    let decision = sidecar.call_ok(
        "attendance.canMark",
        json!({ "teacherId": "t1", "classGroupId": "cgA", "sectionId": "secA", "date": MONDAY, "asOf": "2024-04-01T07:30" }),
    );
    assert_eq!(decision["reason"], json!("You have no classes scheduled for you today."));
}

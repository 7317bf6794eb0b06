#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_campusd");
        let mut child = Command::new(exe)
            .env_remove("CAMPUSD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn campusd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response");
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Full response envelope.
    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// `result` of a request that must succeed.
    pub fn call_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    /// `error` of a request that must fail.
    pub fn call_err(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], json!(false), "{} unexpectedly succeeded: {}", method, resp);
        resp["error"].clone()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A fresh workspace selected in a fresh sidecar, plus a side connection for seeding.
pub fn open_workspace() -> (TempDir, Sidecar, Connection) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut sidecar = Sidecar::spawn();
    sidecar.call_ok("workspace.select", json!({ "path": dir.path().to_string_lossy() }));
    let conn = Connection::open(dir.path().join("campus.sqlite3")).expect("open workspace db");
    seed_school(&conn);
    (dir, sidecar, conn)
}

pub fn seed_school(conn: &Connection) {
    conn.execute_batch(
        "INSERT INTO schools(id, name) VALUES('sch1', 'Hillside');
         INSERT INTO class_groups(id, school_id, name) VALUES('cgA', 'sch1', 'Grade 5'), ('cgB', 'sch1', 'Grade 6');
         INSERT INTO sections(id, class_group_id, name) VALUES('secA', 'cgA', 'A'), ('secB', 'cgB', 'B');
         INSERT INTO subjects(id, school_id, name) VALUES('math', 'sch1', 'Math'), ('sci', 'sch1', 'Science');
         INSERT INTO teachers(id, school_id, name) VALUES('t1', 'sch1', 'Rao'), ('t2', 'sch1', 'Iyer');",
    )
    .expect("seed school");
}

pub fn seed_student(conn: &Connection, id: &str, class_group_id: &str, section_id: Option<&str>, admission: &str) {
    conn.execute(
        "INSERT INTO students(id, school_id, class_group_id, section_id, last_name, first_name, admission_date, is_active)
         VALUES(?, 'sch1', ?, ?, ?, 'Test', ?, 1)",
        (id, class_group_id, section_id, id, admission),
    )
    .expect("seed student");
}

#[allow(clippy::too_many_arguments)]
pub fn seed_period(
    conn: &Connection,
    id: &str,
    teacher_id: &str,
    dow: u32,
    year: i32,
    number: i64,
    start: &str,
    class_group_id: &str,
    section_id: Option<&str>,
    subject_id: &str,
) {
    conn.execute(
        "INSERT INTO timetable_periods(id, school_id, teacher_id, day_of_week, academic_year, period_number, start_time, class_group_id, section_id, subject_id, is_active)
         VALUES(?, 'sch1', ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        rusqlite::params![id, teacher_id, dow, year, number, start, class_group_id, section_id, subject_id],
    )
    .expect("seed period");
}

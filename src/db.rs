use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_groups(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            class_group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            section_id TEXT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            admission_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id, is_active)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_periods(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            academic_year INTEGER NOT NULL,
            period_number INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            section_id TEXT,
            subject_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_teacher_day
         ON timetable_periods(teacher_id, day_of_week, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS holidays(
            school_id TEXT NOT NULL,
            holiday_date TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY(school_id, holiday_date),
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_locks(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            section_id TEXT,
            teacher_id TEXT NOT NULL,
            attendance_date TEXT NOT NULL,
            locked_at TEXT NOT NULL,
            UNIQUE(teacher_id, attendance_date)
        )",
        [],
    )?;
    // NULL sections must collide with each other, so key on IFNULL.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_locks_class_day
         ON attendance_locks(class_group_id, IFNULL(section_id, ''), attendance_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_attendance(
            student_id TEXT NOT NULL,
            attendance_date TEXT NOT NULL,
            school_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            section_id TEXT,
            status TEXT NOT NULL,
            marked_by TEXT,
            is_locked INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(student_id, attendance_date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_attendance_class_day
         ON student_attendance(class_group_id, attendance_date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_categories(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            class_group_id TEXT,
            amount TEXT NOT NULL,
            fee_cycle TEXT NOT NULL,
            start_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_categories_school ON fee_categories(school_id, kind)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transport_routes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            base_fee TEXT NOT NULL,
            escort_fee TEXT NOT NULL DEFAULT '0',
            fuel_surcharge TEXT NOT NULL DEFAULT '0',
            fee_cycle TEXT NOT NULL DEFAULT 'monthly',
            start_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_transport(
            student_id TEXT PRIMARY KEY,
            route_id TEXT NOT NULL,
            start_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(route_id) REFERENCES transport_routes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_overrides(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_category_id TEXT,
            effective_from TEXT NOT NULL,
            effective_to TEXT,
            is_full_free INTEGER NOT NULL DEFAULT 0,
            custom_fee_amount TEXT,
            discount_amount TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_overrides_student ON fee_overrides(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monthly_fee_components(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            fee_category_id TEXT,
            fee_type TEXT NOT NULL,
            period_year INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            fee_amount TEXT NOT NULL,
            paid_amount TEXT NOT NULL DEFAULT '0',
            pending_amount TEXT NOT NULL,
            status TEXT NOT NULL,
            due_date TEXT NOT NULL,
            effective_from TEXT,
            fee_cycle TEXT NOT NULL DEFAULT 'monthly',
            description TEXT NOT NULL DEFAULT '',
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_fee_components_fee_cycle(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_fee_components_natural_key
         ON monthly_fee_components(
            student_id, period_year, period_month, fee_type, IFNULL(fee_category_id, '')
         )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_components_student_period
         ON monthly_fee_components(student_id, school_id, period_year, period_month)",
        [],
    )?;

    Ok(())
}

fn ensure_fee_components_fee_cycle(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces stored components without the cycle they were billed under.
    if table_has_column(conn, "monthly_fee_components", "fee_cycle")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE monthly_fee_components ADD COLUMN fee_cycle TEXT NOT NULL DEFAULT 'monthly'",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

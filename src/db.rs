use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DB_FILE_NAME: &str = "resultd.sqlite3";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    debug!(path = %db_path.display(), "opening result store");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Fresh store with the full schema, used by unit tests.
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            semester INTEGER NOT NULL,
            department TEXT NOT NULL,
            full_marks REAL NOT NULL DEFAULT 100,
            pass_marks REAL NOT NULL DEFAULT 40
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_dept_sem ON subjects(department, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS department_courses(
            course_code TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            semester INTEGER NOT NULL,
            course_name TEXT NOT NULL,
            credit REAL NOT NULL,
            kind TEXT NOT NULL DEFAULT 'Theory'
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_department_courses_dept_sem ON department_courses(department, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_standing(
            registration_no TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            current_semester INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_results(
            id TEXT PRIMARY KEY,
            registration_no TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            exam_type TEXT NOT NULL DEFAULT 'Regular',
            exam_year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            marks_obtained REAL NOT NULL,
            grade TEXT NOT NULL,
            grade_point REAL NOT NULL,
            status TEXT NOT NULL,
            is_approved INTEGER NOT NULL DEFAULT 0,
            UNIQUE(registration_no, subject_code, exam_year, semester, exam_type)
        )",
        [],
    )?;
    // Component marks arrived after the first schema; older stores lack them.
    ensure_student_results_component_marks(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_results_triple ON student_results(registration_no, semester, exam_year)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_results_approved ON student_results(is_approved)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_summaries(
            id TEXT PRIMARY KEY,
            registration_no TEXT NOT NULL,
            semester INTEGER NOT NULL,
            exam_year INTEGER NOT NULL,
            total_marks REAL NOT NULL,
            obtained_marks REAL NOT NULL,
            percentage REAL NOT NULL,
            gpa REAL NOT NULL,
            result TEXT NOT NULL,
            UNIQUE(registration_no, semester, exam_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_summaries_student ON result_summaries(registration_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS recheck_requests(
            id TEXT PRIMARY KEY,
            registration_no TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            semester INTEGER NOT NULL,
            exam_year INTEGER NOT NULL,
            request_type TEXT NOT NULL DEFAULT 'RECOUNT',
            reason TEXT,
            status TEXT NOT NULL DEFAULT 'SUBMITTED',
            admin_comment TEXT,
            teacher_comment TEXT,
            proposed_marks REAL,
            proposed_grade TEXT,
            proposed_grade_point REAL,
            proposed_status TEXT,
            teacher_no_change INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(registration_no, subject_code, semester, exam_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recheck_requests_status ON recheck_requests(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_change_audit(
            id TEXT PRIMARY KEY,
            result_id TEXT NOT NULL,
            request_id TEXT,
            changed_by_role TEXT,
            old_marks REAL,
            new_marks REAL,
            old_grade TEXT,
            new_grade TEXT,
            old_grade_point REAL,
            new_grade_point REAL,
            old_status TEXT,
            new_status TEXT,
            comment TEXT,
            changed_at TEXT NOT NULL,
            FOREIGN KEY(result_id) REFERENCES student_results(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_change_audit_result ON result_change_audit(result_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_change_audit_request ON result_change_audit(request_id)",
        [],
    )?;

    Ok(())
}

fn ensure_student_results_component_marks(conn: &Connection) -> anyhow::Result<()> {
    for column in [
        "marks_attendance",
        "marks_eval",
        "marks_term",
        "marks_final",
    ] {
        if table_has_column(conn, "student_results", column)? {
            continue;
        }
        let sql = format!(
            "ALTER TABLE student_results ADD COLUMN {} REAL NOT NULL DEFAULT 0",
            column
        );
        conn.execute(&sql, [])?;
    }
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
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

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
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

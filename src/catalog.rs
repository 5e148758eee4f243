//! Reference data the result engine reads: subjects, the department course
//! catalog (credits and expected course counts) and each student's semester
//! standing.

use crate::error::{EngineError, Result};
use crate::models::{DepartmentCourse, StudentStanding, Subject};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        code: r.get(0)?,
        name: r.get(1)?,
        semester: r.get(2)?,
        department: r.get(3)?,
        full_marks: r.get(4)?,
        pass_marks: r.get(5)?,
    })
}

const SUBJECT_COLUMNS: &str = "code, name, semester, department, full_marks, pass_marks";

fn validate_subject(subject: &Subject) -> Result<()> {
    if subject.code.trim().is_empty() {
        return Err(EngineError::validation("subject code is required"));
    }
    if subject.name.trim().is_empty() {
        return Err(EngineError::validation("subject name is required"));
    }
    if subject.department.trim().is_empty() {
        return Err(EngineError::validation("subject department is required"));
    }
    if subject.semester < 1 {
        return Err(EngineError::validation("subject semester must be >= 1"));
    }
    if subject.full_marks <= 0.0 {
        return Err(EngineError::validation("fullMarks must be > 0"));
    }
    Ok(())
}

pub fn add_subject(conn: &Connection, subject: &Subject) -> Result<()> {
    validate_subject(subject)?;
    let exists = get_subject(conn, &subject.code)?.is_some();
    if exists {
        return Err(EngineError::validation(format!(
            "subject {} already exists",
            subject.code
        )));
    }
    conn.execute(
        "INSERT INTO subjects(code, name, semester, department, full_marks, pass_marks)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            subject.code.trim(),
            subject.name.trim(),
            subject.semester,
            subject.department.trim(),
            subject.full_marks,
            subject.pass_marks,
        ),
    )?;
    info!(code = %subject.code, "subject added");
    Ok(())
}

pub fn update_subject(conn: &Connection, subject: &Subject) -> Result<()> {
    validate_subject(subject)?;
    let changed = conn.execute(
        "UPDATE subjects
         SET name = ?, semester = ?, department = ?, full_marks = ?, pass_marks = ?
         WHERE code = ?",
        (
            subject.name.trim(),
            subject.semester,
            subject.department.trim(),
            subject.full_marks,
            subject.pass_marks,
            subject.code.trim(),
        ),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!(
            "subject {} not found",
            subject.code
        )));
    }
    Ok(())
}

pub fn delete_subject(conn: &Connection, code: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM subjects WHERE code = ?", [code])?;
    if changed == 0 {
        return Err(EngineError::not_found(format!("subject {} not found", code)));
    }
    info!(code, "subject deleted");
    Ok(())
}

pub fn get_subject(conn: &Connection, code: &str) -> Result<Option<Subject>> {
    let sql = format!("SELECT {} FROM subjects WHERE code = ?", SUBJECT_COLUMNS);
    Ok(conn.query_row(&sql, [code], subject_from_row).optional()?)
}

pub fn list_subjects(conn: &Connection) -> Result<Vec<Subject>> {
    let sql = format!(
        "SELECT {} FROM subjects ORDER BY department, semester, code",
        SUBJECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn subjects_for(conn: &Connection, department: &str, semester: i64) -> Result<Vec<Subject>> {
    let sql = format!(
        "SELECT {} FROM subjects WHERE department = ? AND semester = ? ORDER BY code",
        SUBJECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((department, semester), subject_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Full marks for grading a subject; `default` when the subject is unknown.
pub fn full_marks_for(conn: &Connection, subject_code: &str, default: f64) -> Result<f64> {
    if subject_code.trim().is_empty() {
        return Ok(default);
    }
    let full: Option<f64> = conn
        .query_row(
            "SELECT full_marks FROM subjects WHERE code = ?",
            [subject_code],
            |r| r.get(0),
        )
        .optional()?;
    Ok(full.unwrap_or(default))
}

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<DepartmentCourse> {
    Ok(DepartmentCourse {
        course_code: r.get(0)?,
        department: r.get(1)?,
        semester: r.get(2)?,
        course_name: r.get(3)?,
        credit: r.get(4)?,
        kind: r.get(5)?,
    })
}

pub fn upsert_course(conn: &Connection, course: &DepartmentCourse) -> Result<()> {
    if course.course_code.trim().is_empty() {
        return Err(EngineError::validation("courseCode is required"));
    }
    if course.department.trim().is_empty() {
        return Err(EngineError::validation("department is required"));
    }
    if course.semester < 1 {
        return Err(EngineError::validation("semester must be >= 1"));
    }
    if course.credit <= 0.0 {
        return Err(EngineError::validation("credit must be > 0"));
    }
    conn.execute(
        "INSERT INTO department_courses(course_code, department, semester, course_name, credit, kind)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(course_code) DO UPDATE SET
           department = excluded.department,
           semester = excluded.semester,
           course_name = excluded.course_name,
           credit = excluded.credit,
           kind = excluded.kind",
        (
            course.course_code.trim(),
            course.department.trim(),
            course.semester,
            course.course_name.trim(),
            course.credit,
            course.kind.trim(),
        ),
    )?;
    Ok(())
}

pub fn delete_course(conn: &Connection, course_code: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM department_courses WHERE course_code = ?",
        [course_code],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!(
            "course {} not found",
            course_code
        )));
    }
    Ok(())
}

pub fn courses_for(
    conn: &Connection,
    department: &str,
    semester: Option<i64>,
) -> Result<Vec<DepartmentCourse>> {
    let mut stmt = conn.prepare(
        "SELECT course_code, department, semester, course_name, credit, kind
         FROM department_courses
         WHERE department = ?1 AND (?2 IS NULL OR semester = ?2)
         ORDER BY semester, course_code",
    )?;
    let rows = stmt
        .query_map((department, semester), course_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Number of catalog courses a department expects in a semester.
pub fn expected_course_count(conn: &Connection, department: &str, semester: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM department_courses WHERE department = ? AND semester = ?",
        (department, semester),
        |r| r.get(0),
    )?)
}

/// Registers a student's department and starting semester. Re-enrolling an
/// existing student only updates the department; the semester counter is
/// owned by promotion and never moves backwards here.
pub fn enroll_student(
    conn: &Connection,
    registration_no: &str,
    department: &str,
    semester: i64,
) -> Result<StudentStanding> {
    if registration_no.trim().is_empty() {
        return Err(EngineError::validation("registrationNo is required"));
    }
    if department.trim().is_empty() {
        return Err(EngineError::validation("department is required"));
    }
    if semester < 1 {
        return Err(EngineError::validation("semester must be >= 1"));
    }
    conn.execute(
        "INSERT INTO student_standing(registration_no, department, current_semester)
         VALUES(?, ?, ?)
         ON CONFLICT(registration_no) DO UPDATE SET department = excluded.department",
        (registration_no.trim(), department.trim(), semester),
    )?;
    standing(conn, registration_no.trim())?.ok_or_else(|| {
        EngineError::not_found(format!("student {} not found", registration_no))
    })
}

pub fn standing(conn: &Connection, registration_no: &str) -> Result<Option<StudentStanding>> {
    Ok(conn
        .query_row(
            "SELECT registration_no, department, current_semester
             FROM student_standing WHERE registration_no = ?",
            [registration_no],
            |r| {
                Ok(StudentStanding {
                    registration_no: r.get(0)?,
                    department: r.get(1)?,
                    current_semester: r.get(2)?,
                })
            },
        )
        .optional()?)
}

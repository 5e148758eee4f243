//! Per-semester summaries derived from approved results.

use crate::error::Result;
use crate::grade::PassStatus;
use crate::models::{ResultSummary, ResultTriple};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

/// One approved result joined to its catalog credit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditedMark {
    pub credit: f64,
    pub marks_obtained: f64,
    pub grade_point: f64,
    pub status: PassStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryFigures {
    pub total_marks: f64,
    pub obtained_marks: f64,
    pub percentage: f64,
    pub gpa: f64,
    pub result: PassStatus,
}

/// Credit-weighted GPA and raw percentage over the contributing rows.
/// Each course is out of 100 for the total. `None` when nothing contributes.
pub fn aggregate(rows: &[CreditedMark]) -> Option<SummaryFigures> {
    if rows.is_empty() {
        return None;
    }
    let mut total_credit = 0.0;
    let mut weighted_points = 0.0;
    let mut total_marks = 0.0;
    let mut obtained_marks = 0.0;
    let mut result = PassStatus::Pass;
    for row in rows {
        total_credit += row.credit;
        weighted_points += row.grade_point * row.credit;
        total_marks += row.credit * 100.0;
        obtained_marks += row.marks_obtained;
        if row.status == PassStatus::Fail {
            result = PassStatus::Fail;
        }
    }
    let gpa = if total_credit > 0.0 {
        weighted_points / total_credit
    } else {
        0.0
    };
    let percentage = if total_marks > 0.0 {
        obtained_marks / total_marks * 100.0
    } else {
        0.0
    };
    Some(SummaryFigures {
        total_marks,
        obtained_marks,
        percentage,
        gpa,
        result,
    })
}

fn approved_credited_marks(conn: &Connection, triple: &ResultTriple) -> Result<Vec<CreditedMark>> {
    let mut stmt = conn.prepare(
        "SELECT c.credit, r.marks_obtained, r.grade_point, r.status
         FROM student_results r
         JOIN department_courses c ON c.course_code = r.subject_code
         WHERE r.registration_no = ? AND r.semester = ? AND r.exam_year = ?
           AND r.is_approved = 1",
    )?;
    let rows = stmt
        .query_map(
            (&triple.registration_no, triple.semester, triple.exam_year),
            |r| {
                Ok(CreditedMark {
                    credit: r.get(0)?,
                    marks_obtained: r.get(1)?,
                    grade_point: r.get(2)?,
                    status: r.get(3)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Rebuilds the summary for one triple from its approved rows and overwrites
/// the stored row. Writes nothing when no approved row carries a credit.
pub fn recompute(conn: &Connection, triple: &ResultTriple) -> Result<Option<ResultSummary>> {
    let rows = approved_credited_marks(conn, triple)?;
    let Some(fig) = aggregate(&rows) else {
        return Ok(None);
    };
    conn.execute(
        "INSERT INTO result_summaries(
            id, registration_no, semester, exam_year,
            total_marks, obtained_marks, percentage, gpa, result)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(registration_no, semester, exam_year) DO UPDATE SET
           total_marks = excluded.total_marks,
           obtained_marks = excluded.obtained_marks,
           percentage = excluded.percentage,
           gpa = excluded.gpa,
           result = excluded.result",
        (
            Uuid::new_v4().to_string(),
            &triple.registration_no,
            triple.semester,
            triple.exam_year,
            fig.total_marks,
            fig.obtained_marks,
            fig.percentage,
            fig.gpa,
            fig.result,
        ),
    )?;
    debug!(
        registration_no = %triple.registration_no,
        semester = triple.semester,
        exam_year = triple.exam_year,
        gpa = fig.gpa,
        courses = rows.len(),
        "summary recomputed"
    );
    get_summary(
        conn,
        &triple.registration_no,
        triple.semester,
        triple.exam_year,
    )
}

fn summary_from_row(r: &Row<'_>) -> rusqlite::Result<ResultSummary> {
    Ok(ResultSummary {
        id: r.get(0)?,
        registration_no: r.get(1)?,
        semester: r.get(2)?,
        exam_year: r.get(3)?,
        total_marks: r.get(4)?,
        obtained_marks: r.get(5)?,
        percentage: r.get(6)?,
        gpa: r.get(7)?,
        result: r.get(8)?,
    })
}

pub fn get_summary(
    conn: &Connection,
    registration_no: &str,
    semester: i64,
    exam_year: i64,
) -> Result<Option<ResultSummary>> {
    Ok(conn
        .query_row(
            "SELECT id, registration_no, semester, exam_year,
                    total_marks, obtained_marks, percentage, gpa, result
             FROM result_summaries
             WHERE registration_no = ? AND semester = ? AND exam_year = ?",
            (registration_no, semester, exam_year),
            summary_from_row,
        )
        .optional()?)
}

/// Newest first.
pub fn student_summaries(conn: &Connection, registration_no: &str) -> Result<Vec<ResultSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, registration_no, semester, exam_year,
                total_marks, obtained_marks, percentage, gpa, result
         FROM result_summaries
         WHERE registration_no = ?
         ORDER BY exam_year DESC, semester DESC",
    )?;
    let rows = stmt
        .query_map([registration_no], summary_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

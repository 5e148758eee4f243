//! Semester advancement once a student's approved set is complete.

use crate::catalog;
use crate::config::PromotionConfig;
use crate::error::Result;
use crate::models::ResultTriple;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PromotionOutcome {
    NotEnrolled,
    /// The approval was for a semester other than the one the student is in.
    NotCurrentSemester { current: i64 },
    TerminalSemester,
    /// No catalog courses for the department at this semester.
    CurriculumUnconfigured,
    Incomplete { approved: i64, expected: i64 },
    Promoted { from: i64, to: i64 },
    /// Someone else moved the counter between the read and the update.
    Superseded,
}

/// Promotes the student by exactly one semester when every catalog course of
/// their current semester has an approved result in `triple.exam_year`.
pub fn try_promote(
    conn: &Connection,
    cfg: &PromotionConfig,
    triple: &ResultTriple,
) -> Result<PromotionOutcome> {
    let Some(standing) = catalog::standing(conn, &triple.registration_no)? else {
        debug!(registration_no = %triple.registration_no, "not enrolled; skipping promotion");
        return Ok(PromotionOutcome::NotEnrolled);
    };
    let current = standing.current_semester;
    if triple.semester != current {
        return Ok(PromotionOutcome::NotCurrentSemester { current });
    }
    if current >= cfg.terminal_semester {
        return Ok(PromotionOutcome::TerminalSemester);
    }
    let expected = catalog::expected_course_count(conn, &standing.department, current)?;
    if expected == 0 {
        return Ok(PromotionOutcome::CurriculumUnconfigured);
    }
    let approved: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT subject_code) FROM student_results
         WHERE registration_no = ? AND semester = ? AND exam_year = ? AND is_approved = 1",
        (&triple.registration_no, current, triple.exam_year),
        |r| r.get(0),
    )?;
    if approved < expected {
        return Ok(PromotionOutcome::Incomplete { approved, expected });
    }

    if !advance_from(conn, &triple.registration_no, current)? {
        debug!(registration_no = %triple.registration_no, "semester moved underneath; not promoting");
        return Ok(PromotionOutcome::Superseded);
    }
    info!(
        registration_no = %triple.registration_no,
        from = current,
        to = current + 1,
        "student promoted"
    );
    Ok(PromotionOutcome::Promoted {
        from: current,
        to: current + 1,
    })
}

/// Compare-and-swap on the semester counter: moves it to `expected + 1` only
/// while it still reads `expected`. Returns whether the row changed.
fn advance_from(conn: &Connection, registration_no: &str, expected: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE student_standing SET current_semester = ?
         WHERE registration_no = ? AND current_semester = ?",
        (expected + 1, registration_no, expected),
    )?;
    Ok(changed > 0)
}

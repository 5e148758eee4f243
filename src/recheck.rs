//! Recheck and improvement requests.
//!
//! A request moves `SUBMITTED -> FORWARDED_TO_TEACHER -> TEACHER_REVIEWED ->
//! ADMIN_FINAL_APPROVED`, or ends early at `REJECTED`. The functions here
//! only check that the request exists; [`RecheckStatus::can_advance_to`] is
//! there for callers that gate on the graph. The live result row changes only
//! in [`admin_final_approve`].

use crate::audit;
use crate::error::{EngineError, Result};
use crate::grade::{self, Grade, PassStatus};
use crate::models::{AuditEntry, ExamType, RecheckRequest, RecheckStatus, RequestType, ResultTriple};
use crate::summary;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "ADMIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckSubmission {
    pub registration_no: String,
    pub subject_code: String,
    pub semester: i64,
    pub exam_year: i64,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub reason: Option<String>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

const REQUEST_COLUMNS: &str = "id, registration_no, subject_code, semester, exam_year,
    request_type, reason, status, admin_comment, teacher_comment,
    proposed_marks, proposed_grade, proposed_grade_point, proposed_status,
    teacher_no_change, created_at, updated_at";

fn request_from_row(r: &Row<'_>) -> rusqlite::Result<RecheckRequest> {
    Ok(RecheckRequest {
        id: r.get(0)?,
        registration_no: r.get(1)?,
        subject_code: r.get(2)?,
        semester: r.get(3)?,
        exam_year: r.get(4)?,
        request_type: r.get(5)?,
        reason: r.get(6)?,
        status: r.get(7)?,
        admin_comment: r.get(8)?,
        teacher_comment: r.get(9)?,
        proposed_marks: r.get(10)?,
        proposed_grade: r.get(11)?,
        proposed_grade_point: r.get(12)?,
        proposed_status: r.get(13)?,
        teacher_no_change: r.get::<_, i64>(14)? != 0,
        created_at: r.get(15)?,
        updated_at: r.get(16)?,
    })
}

fn require(conn: &Connection, id: &str) -> Result<RecheckRequest> {
    get(conn, id)?.ok_or_else(|| EngineError::not_found(format!("recheck request {} not found", id)))
}

/// Files a request, or refiles one for the same (student, subject, semester,
/// year). Refiling starts the workflow over from `SUBMITTED`.
pub fn create(conn: &Connection, submission: &RecheckSubmission) -> Result<RecheckRequest> {
    if submission.registration_no.trim().is_empty() {
        return Err(EngineError::validation("registrationNo is required"));
    }
    if submission.subject_code.trim().is_empty() {
        return Err(EngineError::validation("subjectCode is required"));
    }
    if submission.semester < 1 {
        return Err(EngineError::validation("semester must be >= 1"));
    }
    let ts = now();
    conn.execute(
        "INSERT INTO recheck_requests(
            id, registration_no, subject_code, semester, exam_year,
            request_type, reason, status, teacher_no_change, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
         ON CONFLICT(registration_no, subject_code, semester, exam_year) DO UPDATE SET
           request_type = excluded.request_type,
           reason = excluded.reason,
           status = excluded.status,
           admin_comment = NULL,
           teacher_comment = NULL,
           proposed_marks = NULL,
           proposed_grade = NULL,
           proposed_grade_point = NULL,
           proposed_status = NULL,
           teacher_no_change = 0,
           updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            submission.registration_no.trim(),
            submission.subject_code.trim(),
            submission.semester,
            submission.exam_year,
            submission.request_type,
            submission.reason,
            RecheckStatus::Submitted,
            ts,
            ts,
        ],
    )?;
    let sql = format!(
        "SELECT {} FROM recheck_requests
         WHERE registration_no = ? AND subject_code = ? AND semester = ? AND exam_year = ?",
        REQUEST_COLUMNS
    );
    let request = conn.query_row(
        &sql,
        (
            submission.registration_no.trim(),
            submission.subject_code.trim(),
            submission.semester,
            submission.exam_year,
        ),
        request_from_row,
    )?;
    info!(id = %request.id, registration_no = %request.registration_no, subject = %request.subject_code, "recheck submitted");
    Ok(request)
}

fn set_admin_status(
    conn: &Connection,
    id: &str,
    status: RecheckStatus,
    comment: Option<&str>,
) -> Result<RecheckRequest> {
    let changed = conn.execute(
        "UPDATE recheck_requests SET status = ?, admin_comment = ?, updated_at = ? WHERE id = ?",
        (status, comment, now(), id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!("recheck request {} not found", id)));
    }
    info!(id, status = status.as_str(), "recheck status changed");
    require(conn, id)
}

pub fn admin_forward(conn: &Connection, id: &str, comment: Option<&str>) -> Result<RecheckRequest> {
    set_admin_status(conn, id, RecheckStatus::ForwardedToTeacher, comment)
}

pub fn admin_reject(conn: &Connection, id: &str, comment: Option<&str>) -> Result<RecheckRequest> {
    set_admin_status(conn, id, RecheckStatus::Rejected, comment)
}

/// Teacher confirms the existing result. Any earlier proposal is dropped.
pub fn teacher_no_change(conn: &Connection, id: &str, comment: Option<&str>) -> Result<RecheckRequest> {
    let changed = conn.execute(
        "UPDATE recheck_requests SET
           status = ?, teacher_comment = ?, teacher_no_change = 1,
           proposed_marks = NULL, proposed_grade = NULL,
           proposed_grade_point = NULL, proposed_status = NULL,
           updated_at = ?
         WHERE id = ?",
        (RecheckStatus::TeacherReviewed, comment, now(), id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!("recheck request {} not found", id)));
    }
    info!(id, "teacher kept result");
    require(conn, id)
}

/// Teacher proposes new marks; the grade is derived here, never supplied.
pub fn teacher_propose(
    conn: &Connection,
    id: &str,
    proposed_marks: f64,
    full_marks: f64,
    comment: Option<&str>,
) -> Result<RecheckRequest> {
    if !proposed_marks.is_finite() || proposed_marks < 0.0 {
        return Err(EngineError::validation("proposedMarks must be a non-negative number"));
    }
    let outcome = grade::calculate(proposed_marks, full_marks);
    let changed = conn.execute(
        "UPDATE recheck_requests SET
           status = ?, teacher_comment = ?, teacher_no_change = 0,
           proposed_marks = ?, proposed_grade = ?,
           proposed_grade_point = ?, proposed_status = ?,
           updated_at = ?
         WHERE id = ?",
        params![
            RecheckStatus::TeacherReviewed,
            comment,
            proposed_marks,
            outcome.grade,
            outcome.grade_point,
            outcome.status,
            now(),
            id,
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!("recheck request {} not found", id)));
    }
    info!(id, proposed_marks, grade = outcome.grade.as_str(), "teacher proposed marks");
    require(conn, id)
}

struct LiveResult {
    id: String,
    marks: f64,
    grade: Grade,
    grade_point: f64,
    status: PassStatus,
}

/// Applies the teacher's decision to the Regular result row, records the
/// change and closes the request. Everything commits together or not at all.
/// The semester summary is then recomputed; a failure there is logged and
/// does not undo the approval.
pub fn admin_final_approve(
    conn: &Connection,
    request: &RecheckRequest,
    comment: Option<&str>,
) -> Result<RecheckRequest> {
    let tx = conn.unchecked_transaction()?;

    let live = tx
        .query_row(
            "SELECT id, marks_obtained, grade, grade_point, status
             FROM student_results
             WHERE registration_no = ? AND subject_code = ? AND semester = ? AND exam_year = ?
               AND exam_type = ?",
            (
                &request.registration_no,
                &request.subject_code,
                request.semester,
                request.exam_year,
                ExamType::Regular,
            ),
            |r| {
                Ok(LiveResult {
                    id: r.get(0)?,
                    marks: r.get(1)?,
                    grade: r.get(2)?,
                    grade_point: r.get(3)?,
                    status: r.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| {
            EngineError::validation(format!(
                "no Regular result for {} {} semester {} year {}",
                request.registration_no, request.subject_code, request.semester, request.exam_year
            ))
        })?;

    let (new_marks, new_grade, new_point, new_status) = if request.teacher_no_change {
        (
            Some(live.marks),
            Some(live.grade),
            Some(live.grade_point),
            Some(live.status),
        )
    } else {
        (
            request.proposed_marks,
            request.proposed_grade,
            request.proposed_grade_point,
            request.proposed_status,
        )
    };
    let (Some(marks), Some(point)) = (new_marks, new_point) else {
        return Err(EngineError::validation(
            "teacher decision is incomplete: no marks or grade point to apply",
        ));
    };
    let outcome_grade = new_grade.unwrap_or_else(|| Grade::for_point(point));
    let outcome_status = new_status.unwrap_or_else(|| PassStatus::for_point(point));

    tx.execute(
        "UPDATE student_results
         SET marks_obtained = ?, grade = ?, grade_point = ?, status = ?, is_approved = 1
         WHERE id = ?",
        (marks, outcome_grade, point, outcome_status, &live.id),
    )?;

    let ts = now();
    audit::append(
        &tx,
        &AuditEntry {
            id: Uuid::new_v4().to_string(),
            result_id: live.id.clone(),
            request_id: Some(request.id.clone()),
            changed_by_role: ADMIN_ROLE.to_string(),
            old_marks: Some(live.marks),
            new_marks: Some(marks),
            old_grade: Some(live.grade),
            new_grade: Some(outcome_grade),
            old_grade_point: Some(live.grade_point),
            new_grade_point: Some(point),
            old_status: Some(live.status),
            new_status: Some(outcome_status),
            comment: comment.map(str::to_string),
            timestamp: ts.clone(),
        },
    )?;

    let changed = tx.execute(
        "UPDATE recheck_requests SET status = ?, admin_comment = ?, updated_at = ? WHERE id = ?",
        (RecheckStatus::AdminFinalApproved, comment, &ts, &request.id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!(
            "recheck request {} not found",
            request.id
        )));
    }
    tx.commit()?;
    info!(
        id = %request.id,
        result_id = %live.id,
        old_grade = live.grade.as_str(),
        new_grade = outcome_grade.as_str(),
        "recheck applied to result"
    );
    let triple = ResultTriple {
        registration_no: request.registration_no.clone(),
        semester: request.semester,
        exam_year: request.exam_year,
    };
    if let Err(e) = summary::recompute(conn, &triple) {
        warn!(id = %request.id, registration_no = %triple.registration_no, semester = triple.semester, exam_year = triple.exam_year, error = %e, "summary recompute after recheck failed");
    }
    require(conn, &request.id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<RecheckRequest>> {
    let sql = format!("SELECT {} FROM recheck_requests WHERE id = ?", REQUEST_COLUMNS);
    Ok(conn.query_row(&sql, [id], request_from_row).optional()?)
}

pub fn requests_for_student(conn: &Connection, registration_no: &str) -> Result<Vec<RecheckRequest>> {
    let sql = format!(
        "SELECT {} FROM recheck_requests WHERE registration_no = ?
         ORDER BY updated_at DESC, rowid DESC",
        REQUEST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([registration_no], request_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Requests in any of `statuses`, most recently touched first. An empty
/// filter matches nothing.
pub fn requests_by_statuses(
    conn: &Connection,
    statuses: &[RecheckStatus],
) -> Result<Vec<RecheckRequest>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM recheck_requests WHERE status IN ({})
         ORDER BY updated_at DESC, rowid DESC",
        REQUEST_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(statuses.iter()), request_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

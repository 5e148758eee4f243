//! Persisted student results and the approval cascade.
//!
//! Grade fields are derived at write time from the entered marks and the
//! subject's full marks; every write resets approval. Approval is the only way
//! a row becomes `is_approved`, and it fans out to summary recomputation and
//! promotion for every (student, semester, year) it touched.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::grade::{self, GradeOutcome};
use crate::models::{MarksEntry, ResultSummary, ResultTriple, StudentResult};
use crate::promotion::{self, PromotionOutcome};
use crate::summary;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) const RESULT_COLUMNS: &str = "id, registration_no, subject_code, exam_type, exam_year, semester,
    marks_obtained, marks_attendance, marks_eval, marks_term, marks_final,
    grade, grade_point, status, is_approved";

pub(crate) fn result_from_row(r: &Row<'_>) -> rusqlite::Result<StudentResult> {
    Ok(StudentResult {
        id: r.get(0)?,
        registration_no: r.get(1)?,
        subject_code: r.get(2)?,
        exam_type: r.get(3)?,
        exam_year: r.get(4)?,
        semester: r.get(5)?,
        marks_obtained: r.get(6)?,
        marks_attendance: r.get(7)?,
        marks_eval: r.get(8)?,
        marks_term: r.get(9)?,
        marks_final: r.get(10)?,
        grading: GradeOutcome {
            grade: r.get(11)?,
            grade_point: r.get(12)?,
            status: r.get(13)?,
        },
        is_approved: r.get::<_, i64>(14)? != 0,
    })
}

fn validate_entry(entry: &MarksEntry) -> Result<()> {
    if entry.registration_no.trim().is_empty() {
        return Err(EngineError::validation("registrationNo is required"));
    }
    if entry.subject_code.trim().is_empty() {
        return Err(EngineError::validation("subjectCode is required"));
    }
    if entry.semester < 1 {
        return Err(EngineError::validation("semester must be >= 1"));
    }
    let marks = [
        ("marksObtained", entry.marks_obtained),
        ("marksAttendance", entry.marks_attendance),
        ("marksEval", entry.marks_eval),
        ("marksTerm", entry.marks_term),
        ("marksFinal", entry.marks_final),
    ];
    for (name, value) in marks {
        if !value.is_finite() || value < 0.0 {
            return Err(EngineError::validation(format!(
                "{} must be a non-negative number",
                name
            )));
        }
    }
    Ok(())
}

fn upsert_graded(conn: &Connection, entry: &MarksEntry, full_marks: f64) -> Result<String> {
    let outcome = grade::calculate(entry.marks_obtained, full_marks);
    let new_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO student_results(
            id, registration_no, subject_code, exam_type, exam_year, semester,
            marks_obtained, marks_attendance, marks_eval, marks_term, marks_final,
            grade, grade_point, status, is_approved)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
         ON CONFLICT(registration_no, subject_code, exam_year, semester, exam_type) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           marks_attendance = excluded.marks_attendance,
           marks_eval = excluded.marks_eval,
           marks_term = excluded.marks_term,
           marks_final = excluded.marks_final,
           grade = excluded.grade,
           grade_point = excluded.grade_point,
           status = excluded.status,
           is_approved = 0",
        params![
            new_id,
            entry.registration_no.trim(),
            entry.subject_code.trim(),
            entry.exam_type,
            entry.exam_year,
            entry.semester,
            entry.marks_obtained,
            entry.marks_attendance,
            entry.marks_eval,
            entry.marks_term,
            entry.marks_final,
            outcome.grade,
            outcome.grade_point,
            outcome.status,
        ],
    )?;
    let id: String = conn.query_row(
        "SELECT id FROM student_results
         WHERE registration_no = ? AND subject_code = ? AND exam_year = ? AND semester = ? AND exam_type = ?",
        (
            entry.registration_no.trim(),
            entry.subject_code.trim(),
            entry.exam_year,
            entry.semester,
            entry.exam_type,
        ),
        |r| r.get(0),
    )?;
    Ok(id)
}

/// Grades and stores one entry by natural key. `pass_marks` is informational:
/// pass/fail follows the computed grade point.
pub fn save_result(
    conn: &Connection,
    entry: &MarksEntry,
    full_marks: f64,
    pass_marks: f64,
) -> Result<StudentResult> {
    validate_entry(entry)?;
    debug!(
        registration_no = %entry.registration_no,
        subject = %entry.subject_code,
        full_marks,
        pass_marks,
        "saving result"
    );
    let id = upsert_graded(conn, entry, full_marks)?;
    result_by_id(conn, &id)?
        .ok_or_else(|| EngineError::not_found(format!("result {} not found", id)))
}

/// All-or-nothing variant of [`save_result`] sharing one full-marks value.
pub fn save_results_batch(
    conn: &Connection,
    entries: &[MarksEntry],
    full_marks: f64,
    pass_marks: f64,
) -> Result<Vec<String>> {
    if entries.is_empty() {
        return Err(EngineError::validation("no results to save"));
    }
    for entry in entries {
        validate_entry(entry)?;
    }
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        ids.push(upsert_graded(&tx, entry, full_marks)?);
    }
    tx.commit()?;
    info!(count = ids.len(), full_marks, pass_marks, "result batch saved");
    Ok(ids)
}

pub fn result_by_id(conn: &Connection, id: &str) -> Result<Option<StudentResult>> {
    let sql = format!("SELECT {} FROM student_results WHERE id = ?", RESULT_COLUMNS);
    Ok(conn.query_row(&sql, [id], result_from_row).optional()?)
}

pub fn student_results(
    conn: &Connection,
    registration_no: &str,
    semester: Option<i64>,
    exam_year: Option<i64>,
) -> Result<Vec<StudentResult>> {
    let sql = format!(
        "SELECT {} FROM student_results
         WHERE registration_no = ?1
           AND (?2 IS NULL OR semester = ?2)
           AND (?3 IS NULL OR exam_year = ?3)
         ORDER BY exam_year DESC, semester DESC, subject_code",
        RESULT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((registration_no, semester, exam_year), result_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn unapproved_results(conn: &Connection) -> Result<Vec<StudentResult>> {
    let sql = format!(
        "SELECT {} FROM student_results
         WHERE is_approved = 0
         ORDER BY exam_year DESC, semester DESC, registration_no, subject_code",
        RESULT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], result_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// What happened downstream of approval for one triple. Errors are reported,
/// never propagated: approval is already committed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeOutcome {
    #[serde(flatten)]
    pub triple: ResultTriple,
    pub summary: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
    pub promotion: Option<PromotionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalReport {
    pub approved: usize,
    pub cascades: Vec<CascadeOutcome>,
}

/// Marks the given results approved in one transaction, then recomputes the
/// summary and attempts promotion once per distinct triple.
///
/// Fails with `NotFound` and changes nothing when no id matches.
pub fn approve_batch(
    conn: &Connection,
    cfg: &EngineConfig,
    result_ids: &[String],
) -> Result<ApprovalReport> {
    let ids: Vec<&str> = {
        let mut seen = HashSet::new();
        result_ids
            .iter()
            .map(|s| s.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    };
    if ids.is_empty() {
        return Err(EngineError::validation("no result ids to approve"));
    }
    let placeholders = vec!["?"; ids.len()].join(", ");

    let tx = conn.unchecked_transaction()?;
    let approved = tx.execute(
        &format!(
            "UPDATE student_results SET is_approved = 1 WHERE id IN ({})",
            placeholders
        ),
        params_from_iter(ids.iter()),
    )?;
    if approved == 0 {
        // Dropping the transaction rolls it back.
        return Err(EngineError::not_found("no matching results to approve"));
    }
    let triples: BTreeSet<ResultTriple> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT DISTINCT registration_no, semester, exam_year
             FROM student_results WHERE id IN ({})",
            placeholders
        ))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |r| {
                Ok(ResultTriple {
                    registration_no: r.get(0)?,
                    semester: r.get(1)?,
                    exam_year: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        rows
    };
    tx.commit()?;
    info!(approved, triples = triples.len(), "results approved");

    let cascades = run_cascade(conn, cfg, triples);
    Ok(ApprovalReport { approved, cascades })
}

/// Summary then promotion, once per triple. Each step is independent: a
/// failure is logged and recorded without touching sibling triples.
pub fn run_cascade<I>(conn: &Connection, cfg: &EngineConfig, triples: I) -> Vec<CascadeOutcome>
where
    I: IntoIterator<Item = ResultTriple>,
{
    let mut out = Vec::new();
    for triple in triples {
        let (summary, summary_error) = match summary::recompute(conn, &triple) {
            Ok(s) => {
                if s.is_none() {
                    debug!(registration_no = %triple.registration_no, semester = triple.semester, exam_year = triple.exam_year, "no summarizable results");
                }
                (s, None)
            }
            Err(e) => {
                warn!(registration_no = %triple.registration_no, semester = triple.semester, exam_year = triple.exam_year, error = %e, "summary recompute failed");
                (None, Some(e.to_string()))
            }
        };
        let (promotion, promotion_error) =
            match promotion::try_promote(conn, &cfg.promotion, &triple) {
                Ok(p) => (Some(p), None),
                Err(e) => {
                    warn!(registration_no = %triple.registration_no, error = %e, "promotion check failed");
                    (None, Some(e.to_string()))
                }
            };
        out.push(CascadeOutcome {
            triple,
            summary,
            summary_error,
            promotion,
            promotion_error,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::db;
    use crate::grade::{Grade, PassStatus};
    use crate::models::{DepartmentCourse, ExamType};

    pub(crate) fn entry(reg: &str, subject: &str, marks: f64) -> MarksEntry {
        MarksEntry {
            registration_no: reg.to_string(),
            subject_code: subject.to_string(),
            exam_type: ExamType::Regular,
            exam_year: 2024,
            semester: 1,
            marks_obtained: marks,
            marks_attendance: 0.0,
            marks_eval: 0.0,
            marks_term: 0.0,
            marks_final: marks,
        }
    }

    fn seed_curriculum(conn: &Connection, codes: &[&str]) {
        for code in codes {
            catalog::upsert_course(
                conn,
                &DepartmentCourse {
                    course_code: code.to_string(),
                    department: "CSE".to_string(),
                    semester: 1,
                    course_name: code.to_string(),
                    credit: 3.0,
                    kind: "Theory".to_string(),
                },
            )
            .expect("course");
        }
    }

    #[test]
    fn save_derives_grade_and_starts_unapproved() {
        let conn = db::open_in_memory().expect("open");
        let saved = save_result(&conn, &entry("R1", "CSE101", 85.0), 100.0, 40.0).expect("save");
        assert_eq!(saved.grading.grade, Grade::A);
        assert_eq!(saved.grading.grade_point, 3.7);
        assert_eq!(saved.grading.status, PassStatus::Pass);
        assert!(!saved.is_approved);
    }

    #[test]
    fn pass_marks_do_not_change_status() {
        let conn = db::open_in_memory().expect("open");
        // 45/100 is a C (pass) even though the subject's pass mark is 50.
        let saved = save_result(&conn, &entry("R1", "CSE101", 45.0), 100.0, 50.0).expect("save");
        assert_eq!(saved.grading.status, PassStatus::Pass);
    }

    #[test]
    fn resave_resets_approval_and_keeps_id() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::default();
        let first = save_result(&conn, &entry("R1", "CSE101", 35.0), 100.0, 40.0).expect("save");
        approve_batch(&conn, &cfg, &[first.id.clone()]).expect("approve");
        assert!(result_by_id(&conn, &first.id).expect("get").expect("row").is_approved);

        let second = save_result(&conn, &entry("R1", "CSE101", 65.0), 100.0, 40.0).expect("resave");
        assert_eq!(second.id, first.id);
        assert!(!second.is_approved);
        assert_eq!(second.grading.grade, Grade::B);
    }

    #[test]
    fn exam_type_is_part_of_the_natural_key() {
        let conn = db::open_in_memory().expect("open");
        let regular = save_result(&conn, &entry("R1", "CSE101", 35.0), 100.0, 40.0).expect("save");
        let mut retake = entry("R1", "CSE101", 55.0);
        retake.exam_type = ExamType::ReTake;
        let retake = save_result(&conn, &retake, 100.0, 40.0).expect("save");
        assert_ne!(regular.id, retake.id);
        assert_eq!(student_results(&conn, "R1", None, None).expect("list").len(), 2);
    }

    #[test]
    fn negative_marks_are_rejected() {
        let conn = db::open_in_memory().expect("open");
        let err = save_result(&conn, &entry("R1", "CSE101", -1.0), 100.0, 40.0).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn batch_save_is_all_or_nothing() {
        let conn = db::open_in_memory().expect("open");
        let mut bad = entry("R2", "CSE102", 50.0);
        bad.registration_no = " ".to_string();
        let err = save_results_batch(&conn, &[entry("R1", "CSE101", 50.0), bad], 100.0, 40.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(unapproved_results(&conn).expect("list").is_empty());

        let ids = save_results_batch(
            &conn,
            &[entry("R1", "CSE101", 50.0), entry("R1", "CSE102", 90.0)],
            100.0,
            40.0,
        )
        .expect("batch");
        assert_eq!(ids.len(), 2);
        assert_eq!(unapproved_results(&conn).expect("list").len(), 2);
    }

    #[test]
    fn approving_nothing_fails_without_side_effects() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::default();
        assert!(matches!(
            approve_batch(&conn, &cfg, &[]),
            Err(EngineError::Validation(_))
        ));
        save_result(&conn, &entry("R1", "CSE101", 70.0), 100.0, 40.0).expect("save");
        assert!(matches!(
            approve_batch(&conn, &cfg, &["missing".to_string()]),
            Err(EngineError::NotFound(_))
        ));
        let summaries: i64 = conn
            .query_row("SELECT COUNT(*) FROM result_summaries", [], |r| r.get(0))
            .expect("count");
        assert_eq!(summaries, 0);
    }

    #[test]
    fn approval_cascades_once_per_triple() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::default();
        seed_curriculum(&conn, &["CSE101", "CSE102"]);
        catalog::enroll_student(&conn, "R1", "CSE", 1).expect("enroll");
        let ids = save_results_batch(
            &conn,
            &[entry("R1", "CSE101", 85.0), entry("R1", "CSE102", 92.0)],
            100.0,
            40.0,
        )
        .expect("batch");

        let report = approve_batch(&conn, &cfg, &ids).expect("approve");
        assert_eq!(report.approved, 2);
        assert_eq!(report.cascades.len(), 1);
        let cascade = &report.cascades[0];
        assert!(cascade.summary.is_some());
        assert!(matches!(
            cascade.promotion,
            Some(PromotionOutcome::Promoted { from: 1, to: 2 })
        ));
        assert!(unapproved_results(&conn).expect("list").is_empty());
    }

    #[test]
    fn reapproval_is_idempotent_for_the_flag() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::default();
        seed_curriculum(&conn, &["CSE101"]);
        let saved = save_result(&conn, &entry("R1", "CSE101", 85.0), 100.0, 40.0).expect("save");
        let first = approve_batch(&conn, &cfg, &[saved.id.clone()]).expect("approve");
        let second = approve_batch(&conn, &cfg, &[saved.id.clone(), saved.id.clone()])
            .expect("approve again");
        assert_eq!(second.approved, 1);
        assert_eq!(
            first.cascades[0].summary.as_ref().map(|s| s.gpa),
            second.cascades[0].summary.as_ref().map(|s| s.gpa)
        );
    }

    #[test]
    fn cascade_failures_stay_isolated_per_triple() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::default();
        catalog::enroll_student(&conn, "R1", "CSE", 1).expect("enroll");
        let ids = save_results_batch(
            &conn,
            &[entry("R1", "CSE101", 85.0), entry("R2", "CSE101", 70.0)],
            100.0,
            40.0,
        )
        .expect("batch");
        // Both summary and the enrolled student's promotion read the catalog.
        conn.execute("DROP TABLE department_courses", []).expect("drop");

        let report = approve_batch(&conn, &cfg, &ids).expect("approve");
        assert_eq!(report.approved, 2);
        assert_eq!(report.cascades.len(), 2);
        assert!(report.cascades.iter().all(|c| c.summary.is_none()));
        assert!(report.cascades.iter().all(|c| c.summary_error.is_some()));

        let (r1, r2) = (&report.cascades[0], &report.cascades[1]);
        assert_eq!(r1.triple.registration_no, "R1");
        assert!(r1.promotion.is_none());
        assert!(r1.promotion_error.is_some());
        assert_eq!(r2.triple.registration_no, "R2");
        assert_eq!(r2.promotion, Some(PromotionOutcome::NotEnrolled));
        assert!(r2.promotion_error.is_none());

        assert!(unapproved_results(&conn).expect("list").is_empty());
        assert_eq!(
            catalog::standing(&conn, "R1").expect("get").expect("row").current_semester,
            1
        );
    }
}

//! Cumulative GPA and at-risk screening over stored summaries.

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::summary;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

/// Mean of the student's semester GPAs; 0 when nothing is summarized yet.
pub fn cgpa(conn: &Connection, registration_no: &str) -> Result<f64> {
    let avg: Option<f64> = conn.query_row(
        "SELECT AVG(gpa) FROM result_summaries WHERE registration_no = ?",
        [registration_no],
        |r| r.get(0),
    )?;
    Ok(avg.unwrap_or(0.0))
}

/// Inputs to the risk rules for one student.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskSignals {
    pub cgpa: f64,
    pub last_gpa: Option<f64>,
    pub prev_gpa: Option<f64>,
    pub fails_last_two: i64,
}

pub fn assess(signals: &RiskSignals, cfg: &AnalysisConfig) -> (RiskLevel, Vec<String>) {
    let mut level = RiskLevel::Low;
    let mut reasons = Vec::new();

    if signals.cgpa > 0.0 && signals.cgpa < cfg.cgpa_high {
        level = RiskLevel::High;
        reasons.push(format!("CGPA below {:.2}", cfg.cgpa_high));
    } else if signals.cgpa > 0.0 && signals.cgpa < cfg.cgpa_medium {
        level = RiskLevel::Medium;
        reasons.push(format!("CGPA below {:.2}", cfg.cgpa_medium));
    }

    if signals.fails_last_two >= 2 {
        level = RiskLevel::High;
        reasons.push("2+ fails in last 2 semesters".to_string());
    } else if signals.fails_last_two == 1 && level == RiskLevel::Low {
        level = RiskLevel::Medium;
        reasons.push("1 fail in last 2 semesters".to_string());
    }

    if let (Some(last), Some(prev)) = (signals.last_gpa, signals.prev_gpa) {
        if prev - last >= cfg.gpa_drop {
            if level != RiskLevel::High {
                level = RiskLevel::Medium;
            }
            reasons.push(format!("GPA drop >= {:.2}", cfg.gpa_drop));
        }
    }

    (level, reasons)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub registration_no: String,
    pub department: String,
    pub current_semester: i64,
    pub cgpa: f64,
    pub last_gpa: Option<f64>,
    pub prev_gpa: Option<f64>,
    pub fails_last_two: i64,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
}

fn fails_in(conn: &Connection, registration_no: &str, semester: i64, exam_year: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM student_results
         WHERE registration_no = ? AND semester = ? AND exam_year = ?
           AND is_approved = 1 AND status = 'FAIL'",
        (registration_no, semester, exam_year),
        |r| r.get(0),
    )?)
}

/// Screens every enrolled student, optionally narrowed to one department and
/// one risk level. Ordered by department, then registration number.
pub fn at_risk_students(
    conn: &Connection,
    cfg: &AnalysisConfig,
    department: Option<&str>,
    level: Option<RiskLevel>,
) -> Result<Vec<RiskAssessment>> {
    let mut stmt = conn.prepare(
        "SELECT registration_no, department, current_semester
         FROM student_standing
         WHERE ?1 IS NULL OR department = ?1
         ORDER BY department, registration_no",
    )?;
    let students = stmt
        .query_map([department], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out = Vec::new();
    for (registration_no, dept, current_semester) in students {
        let summaries = summary::student_summaries(conn, &registration_no)?;
        let mut fails_last_two = 0;
        for s in summaries.iter().take(2) {
            fails_last_two += fails_in(conn, &registration_no, s.semester, s.exam_year)?;
        }
        let signals = RiskSignals {
            cgpa: cgpa(conn, &registration_no)?,
            last_gpa: summaries.first().map(|s| s.gpa),
            prev_gpa: summaries.get(1).map(|s| s.gpa),
            fails_last_two,
        };
        let (risk, reasons) = assess(&signals, cfg);
        if level.is_some_and(|wanted| wanted != risk) {
            continue;
        }
        out.push(RiskAssessment {
            registration_no,
            department: dept,
            current_semester,
            cgpa: signals.cgpa,
            last_gpa: signals.last_gpa,
            prev_gpa: signals.prev_gpa,
            fails_last_two,
            risk,
            reasons,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::db;

    fn signals(cgpa: f64, last: Option<f64>, prev: Option<f64>, fails: i64) -> RiskSignals {
        RiskSignals {
            cgpa,
            last_gpa: last,
            prev_gpa: prev,
            fails_last_two: fails,
        }
    }

    #[test]
    fn low_cgpa_or_repeated_failure_is_high_risk() {
        let cfg = AnalysisConfig::default();
        assert_eq!(assess(&signals(2.2, None, None, 0), &cfg).0, RiskLevel::High);
        assert_eq!(assess(&signals(3.8, None, None, 2), &cfg).0, RiskLevel::High);
    }

    #[test]
    fn medium_signals() {
        let cfg = AnalysisConfig::default();
        assert_eq!(assess(&signals(2.8, None, None, 0), &cfg).0, RiskLevel::Medium);
        assert_eq!(assess(&signals(3.6, None, None, 1), &cfg).0, RiskLevel::Medium);
        let (level, reasons) = assess(&signals(3.5, Some(3.1), Some(3.7), 0), &cfg);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn drop_does_not_downgrade_high_risk() {
        let cfg = AnalysisConfig::default();
        let (level, reasons) = assess(&signals(2.0, Some(1.5), Some(2.5), 0), &cfg);
        assert_eq!(level, RiskLevel::High);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn unsummarized_student_is_low_risk() {
        let cfg = AnalysisConfig::default();
        let (level, reasons) = assess(&RiskSignals::default(), &cfg);
        assert_eq!(level, RiskLevel::Low);
        assert!(reasons.is_empty());
    }

    fn insert_summary(conn: &Connection, reg: &str, semester: i64, gpa: f64) {
        conn.execute(
            "INSERT INTO result_summaries(id, registration_no, semester, exam_year,
                total_marks, obtained_marks, percentage, gpa, result)
             VALUES(?, ?, ?, 2024, 300, 200, 66.6, ?, 'PASS')",
            (format!("{}-{}", reg, semester), reg, semester, gpa),
        )
        .expect("summary");
    }

    #[test]
    fn screening_filters_by_department_and_level() {
        let conn = db::open_in_memory().expect("open");
        catalog::enroll_student(&conn, "A1", "CSE", 3).expect("enroll");
        catalog::enroll_student(&conn, "A2", "CSE", 3).expect("enroll");
        catalog::enroll_student(&conn, "B1", "EEE", 2).expect("enroll");
        insert_summary(&conn, "A1", 1, 3.9);
        insert_summary(&conn, "A1", 2, 3.8);
        insert_summary(&conn, "A2", 1, 2.1);
        insert_summary(&conn, "B1", 1, 2.0);

        assert!((cgpa(&conn, "A1").expect("cgpa") - 3.85).abs() < 1e-9);
        assert_eq!(cgpa(&conn, "nobody").expect("cgpa"), 0.0);

        let cse = at_risk_students(&conn, &AnalysisConfig::default(), Some("CSE"), None)
            .expect("screen");
        assert_eq!(cse.len(), 2);
        assert_eq!(cse[0].registration_no, "A1");
        assert_eq!(cse[0].risk, RiskLevel::Low);
        assert_eq!(cse[1].risk, RiskLevel::High);

        let high = at_risk_students(&conn, &AnalysisConfig::default(), None, Some(RiskLevel::High))
            .expect("screen");
        let regs: Vec<_> = high.iter().map(|r| r.registration_no.as_str()).collect();
        assert_eq!(regs, vec!["A2", "B1"]);
    }
}

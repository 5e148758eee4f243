use crate::grade::{Grade, GradeOutcome, PassStatus};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Text-backed enums stored by their wire label.
macro_rules! sql_text_enum {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let s = value.as_str()?;
                    <$ty>::parse(s).ok_or_else(|| {
                        FromSqlError::Other(
                            format!("unknown {} label: {}", stringify!($ty), s).into(),
                        )
                    })
                }
            }
        )*
    };
}

sql_text_enum!(Grade, PassStatus, ExamType, RecheckStatus, RequestType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExamType {
    #[default]
    Regular,
    #[serde(rename = "Re-Take")]
    ReTake,
    Improvement,
}

impl ExamType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::ReTake => "Re-Take",
            Self::Improvement => "Improvement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Regular" => Some(Self::Regular),
            "Re-Take" => Some(Self::ReTake),
            "Improvement" => Some(Self::Improvement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub code: String,
    pub name: String,
    pub semester: i64,
    pub department: String,
    pub full_marks: f64,
    /// Informational; grading does not consult it.
    pub pass_marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentCourse {
    pub course_code: String,
    pub department: String,
    pub semester: i64,
    pub course_name: String,
    pub credit: f64,
    #[serde(default = "default_course_kind")]
    pub kind: String,
}

fn default_course_kind() -> String {
    "Theory".to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentStanding {
    pub registration_no: String,
    pub department: String,
    pub current_semester: i64,
}

/// Marks as entered by a teacher. Grade fields are not part of the write
/// path; the store derives them from `marks_obtained` at write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarksEntry {
    pub registration_no: String,
    pub subject_code: String,
    #[serde(default)]
    pub exam_type: ExamType,
    pub exam_year: i64,
    pub semester: i64,
    pub marks_obtained: f64,
    #[serde(default)]
    pub marks_attendance: f64,
    #[serde(default)]
    pub marks_eval: f64,
    #[serde(default)]
    pub marks_term: f64,
    #[serde(default)]
    pub marks_final: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub id: String,
    pub registration_no: String,
    pub subject_code: String,
    pub exam_type: ExamType,
    pub exam_year: i64,
    pub semester: i64,
    pub marks_obtained: f64,
    pub marks_attendance: f64,
    pub marks_eval: f64,
    pub marks_term: f64,
    pub marks_final: f64,
    #[serde(flatten)]
    pub grading: GradeOutcome,
    pub is_approved: bool,
}

/// The (student, semester, year) key shared by summaries and promotion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTriple {
    pub registration_no: String,
    pub semester: i64,
    pub exam_year: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub id: String,
    pub registration_no: String,
    pub semester: i64,
    pub exam_year: i64,
    pub total_marks: f64,
    pub obtained_marks: f64,
    pub percentage: f64,
    pub gpa: f64,
    pub result: PassStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecheckStatus {
    Submitted,
    ForwardedToTeacher,
    Rejected,
    TeacherReviewed,
    AdminFinalApproved,
}

impl RecheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::ForwardedToTeacher => "FORWARDED_TO_TEACHER",
            Self::Rejected => "REJECTED",
            Self::TeacherReviewed => "TEACHER_REVIEWED",
            Self::AdminFinalApproved => "ADMIN_FINAL_APPROVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Some(Self::Submitted),
            "FORWARDED_TO_TEACHER" => Some(Self::ForwardedToTeacher),
            "REJECTED" => Some(Self::Rejected),
            "TEACHER_REVIEWED" => Some(Self::TeacherReviewed),
            "ADMIN_FINAL_APPROVED" => Some(Self::AdminFinalApproved),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::AdminFinalApproved)
    }

    /// Edges of the workflow graph.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::ForwardedToTeacher)
                | (Self::Submitted, Self::Rejected)
                | (Self::ForwardedToTeacher, Self::TeacherReviewed)
                | (Self::TeacherReviewed, Self::AdminFinalApproved)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    #[default]
    Recount,
    Reevaluation,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recount => "RECOUNT",
            Self::Reevaluation => "REEVALUATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RECOUNT" => Some(Self::Recount),
            "REEVALUATION" => Some(Self::Reevaluation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecheckRequest {
    pub id: String,
    pub registration_no: String,
    pub subject_code: String,
    pub semester: i64,
    pub exam_year: i64,
    pub request_type: RequestType,
    pub reason: Option<String>,
    pub status: RecheckStatus,
    pub admin_comment: Option<String>,
    pub teacher_comment: Option<String>,
    pub proposed_marks: Option<f64>,
    pub proposed_grade: Option<Grade>,
    pub proposed_grade_point: Option<f64>,
    pub proposed_status: Option<PassStatus>,
    pub teacher_no_change: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub result_id: String,
    pub request_id: Option<String>,
    pub changed_by_role: String,
    pub old_marks: Option<f64>,
    pub new_marks: Option<f64>,
    pub old_grade: Option<Grade>,
    pub new_grade: Option<Grade>,
    pub old_grade_point: Option<f64>,
    pub new_grade_point: Option<f64>,
    pub old_status: Option<PassStatus>,
    pub new_status: Option<PassStatus>,
    pub comment: Option<String>,
    pub timestamp: String,
}

use serde::{Deserialize, Serialize};

/// Grade point at or above which a result counts as a pass.
pub const PASS_GRADE_POINT: f64 = 2.0;

/// Letter grades, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "F")]
    F,
}

/// Lower-closed percentage thresholds, scanned top down.
const SCALE: [(f64, Grade); 6] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::CPlus),
    (40.0, Grade::C),
];

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A+" => Some(Self::APlus),
            "A" => Some(Self::A),
            "B+" => Some(Self::BPlus),
            "B" => Some(Self::B),
            "C+" => Some(Self::CPlus),
            "C" => Some(Self::C),
            "F" => Some(Self::F),
            _ => None,
        }
    }

    pub fn point(self) -> f64 {
        match self {
            Self::APlus => 4.0,
            Self::A => 3.7,
            Self::BPlus => 3.3,
            Self::B => 3.0,
            Self::CPlus => 2.5,
            Self::C => 2.0,
            Self::F => 0.0,
        }
    }

    /// Highest grade whose point does not exceed `point`.
    pub fn for_point(point: f64) -> Self {
        SCALE
            .iter()
            .map(|(_, g)| *g)
            .find(|g| point >= g.point())
            .unwrap_or(Self::F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassStatus {
    Pass,
    Fail,
}

impl PassStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn for_point(grade_point: f64) -> Self {
        if grade_point >= PASS_GRADE_POINT {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub grade: Grade,
    pub grade_point: f64,
    pub status: PassStatus,
}

impl GradeOutcome {
    fn from_grade(grade: Grade) -> Self {
        let grade_point = grade.point();
        Self {
            grade,
            grade_point,
            status: PassStatus::for_point(grade_point),
        }
    }
}

/// Maps raw marks against the subject's full marks onto the grading scale.
///
/// Pass/fail follows the computed grade point; a subject's configured pass
/// marks are not consulted. Out-of-range marks are mapped by the same
/// thresholds, so callers validate upstream.
pub fn calculate(marks_obtained: f64, full_marks: f64) -> GradeOutcome {
    if full_marks <= 0.0 {
        return GradeOutcome::from_grade(Grade::F);
    }
    let percentage = marks_obtained / full_marks * 100.0;
    let grade = SCALE
        .iter()
        .find(|(threshold, _)| percentage >= *threshold)
        .map(|(_, g)| *g)
        .unwrap_or(Grade::F);
    GradeOutcome::from_grade(grade)
}

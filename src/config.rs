//! Workspace-level engine settings.
//!
//! Each section is persisted as one JSON document in the `settings` table under
//! `setup.<section>`. Missing or malformed saved values fall back to defaults so
//! a damaged settings row never blocks the engine.

use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Promotion,
    Grading,
    Recheck,
    Analysis,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Promotion,
        Section::Grading,
        Section::Recheck,
        Section::Analysis,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "promotion" => Some(Self::Promotion),
            "grading" => Some(Self::Grading),
            "recheck" => Some(Self::Recheck),
            "analysis" => Some(Self::Analysis),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Promotion => "promotion",
            Self::Grading => "grading",
            Self::Recheck => "recheck",
            Self::Analysis => "analysis",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Promotion => "setup.promotion",
            Self::Grading => "setup.grading",
            Self::Recheck => "setup.recheck",
            Self::Analysis => "setup.analysis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionConfig {
    pub terminal_semester: i64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            terminal_semester: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    /// Used when a subject has no configured full marks.
    pub default_full_marks: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            default_full_marks: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecheckConfig {
    /// Gate sidecar transitions on the workflow graph.
    pub strict_transitions: bool,
}

impl Default for RecheckConfig {
    fn default() -> Self {
        Self {
            strict_transitions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    pub cgpa_high: f64,
    pub cgpa_medium: f64,
    pub gpa_drop: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cgpa_high: 2.5,
            cgpa_medium: 3.0,
            gpa_drop: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub promotion: PromotionConfig,
    pub grading: GradingConfig,
    pub recheck: RecheckConfig,
    pub analysis: AnalysisConfig,
}

impl EngineConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self {
            promotion: load_section_as(conn, Section::Promotion)?,
            grading: load_section_as(conn, Section::Grading)?,
            recheck: load_section_as(conn, Section::Recheck)?,
            analysis: load_section_as(conn, Section::Analysis)?,
        })
    }

    fn section_value(&self, section: Section) -> Value {
        let v = match section {
            Section::Promotion => serde_json::to_value(&self.promotion),
            Section::Grading => serde_json::to_value(&self.grading),
            Section::Recheck => serde_json::to_value(&self.recheck),
            Section::Analysis => serde_json::to_value(&self.analysis),
        };
        v.unwrap_or(Value::Null)
    }
}

fn load_section_as<T>(conn: &Connection, section: Section) -> anyhow::Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(saved) = db::settings_get_json(conn, section.key())? else {
        return Ok(T::default());
    };
    match serde_json::from_value(saved) {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(section = section.name(), error = %e, "ignoring malformed saved settings");
            Ok(T::default())
        }
    }
}

/// Current values of one section, defaults filled in.
pub fn load_section(conn: &Connection, section: Section) -> anyhow::Result<Value> {
    Ok(EngineConfig::load(conn)?.section_value(section))
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: Section,
    current: &mut Map<String, Value>,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    for (k, v) in patch {
        match section {
            Section::Promotion => match k.as_str() {
                "terminalSemester" => {
                    current.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 12)?));
                }
                _ => return Err(format!("unknown promotion field: {}", k)),
            },
            Section::Grading => match k.as_str() {
                "defaultFullMarks" => {
                    let n = parse_f64_range(v, k, 0.0, 10_000.0)?;
                    if n <= 0.0 {
                        return Err("defaultFullMarks must be > 0".into());
                    }
                    current.insert(k.clone(), Value::from(n));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            Section::Recheck => match k.as_str() {
                "strictTransitions" => {
                    current.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown recheck field: {}", k)),
            },
            Section::Analysis => match k.as_str() {
                "cgpaHigh" | "cgpaMedium" | "gpaDrop" => {
                    current.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 4.0)?));
                }
                _ => return Err(format!("unknown analysis field: {}", k)),
            },
        }
    }
    if section == Section::Analysis {
        let high = current.get("cgpaHigh").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let medium = current
            .get("cgpaMedium")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        if high > medium {
            return Err("cgpaHigh must be <= cgpaMedium".into());
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum PatchError {
    Invalid(String),
    Store(anyhow::Error),
}

/// Validates `patch` field by field against the section and persists the
/// merged document. Returns the updated section.
pub fn update_section(
    conn: &Connection,
    section: Section,
    patch: &Map<String, Value>,
) -> Result<Value, PatchError> {
    let mut current = match load_section(conn, section).map_err(PatchError::Store)? {
        Value::Object(m) => m,
        _ => Map::new(),
    };
    merge_section_patch(section, &mut current, patch).map_err(PatchError::Invalid)?;
    let merged = Value::Object(current);
    db::settings_set_json(conn, section.key(), &merged).map_err(PatchError::Store)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn defaults_apply_without_saved_settings() {
        let conn = db::open_in_memory().expect("open");
        let cfg = EngineConfig::load(&conn).expect("load");
        assert_eq!(cfg.promotion.terminal_semester, 8);
        assert_eq!(cfg.grading.default_full_marks, 100.0);
        assert!(cfg.recheck.strict_transitions);
        assert_eq!(cfg.analysis.cgpa_high, 2.5);
    }

    #[test]
    fn update_merges_and_persists() {
        let conn = db::open_in_memory().expect("open");
        let updated = update_section(
            &conn,
            Section::Promotion,
            &patch(json!({ "terminalSemester": 10 })),
        )
        .expect("update");
        assert_eq!(updated["terminalSemester"], 10);
        let cfg = EngineConfig::load(&conn).expect("load");
        assert_eq!(cfg.promotion.terminal_semester, 10);
    }

    #[test]
    fn update_rejects_unknown_and_out_of_range_fields() {
        let conn = db::open_in_memory().expect("open");
        let unknown = update_section(&conn, Section::Recheck, &patch(json!({ "bogus": 1 })));
        assert!(matches!(unknown, Err(PatchError::Invalid(_))));
        let range = update_section(
            &conn,
            Section::Promotion,
            &patch(json!({ "terminalSemester": 0 })),
        );
        assert!(matches!(range, Err(PatchError::Invalid(_))));
        let inverted = update_section(
            &conn,
            Section::Analysis,
            &patch(json!({ "cgpaHigh": 3.5 })),
        );
        assert!(matches!(inverted, Err(PatchError::Invalid(_))));
        assert_eq!(
            EngineConfig::load(&conn).expect("load"),
            EngineConfig::default()
        );
    }

    #[test]
    fn malformed_saved_section_falls_back_to_defaults() {
        let conn = db::open_in_memory().expect("open");
        db::settings_set_json(&conn, "setup.grading", &json!({ "defaultFullMarks": "lots" }))
            .expect("set");
        let cfg = EngineConfig::load(&conn).expect("load");
        assert_eq!(cfg.grading.default_full_marks, 100.0);
    }
}

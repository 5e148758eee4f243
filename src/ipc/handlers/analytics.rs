use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{optional_str, to_json};
use crate::ipc::types::{AppState, Request};
use resultd::analytics::{self, RiskLevel};
use resultd::config::EngineConfig;
use serde_json::{json, Value};

fn at_risk(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let cfg = EngineConfig::load(conn)?;
    // "ALL" or absent means no filter.
    let department = optional_str(params, "department")?.filter(|d| d != "ALL" && !d.is_empty());
    let level = match optional_str(params, "risk")? {
        None => None,
        Some(raw) if raw.eq_ignore_ascii_case("ALL") => None,
        Some(raw) => Some(RiskLevel::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params(format!("unknown risk level: {}", raw))
        })?),
    };
    let rows = analytics::at_risk_students(conn, &cfg.analysis, department.as_deref(), level)?;
    Ok(json!({ "students": to_json(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "analytics.atRisk" => at_risk(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

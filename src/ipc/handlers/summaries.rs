use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{required_i64, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use resultd::analytics;
use resultd::models::ResultTriple;
use resultd::summary;
use serde_json::{json, Value};

fn triple(params: &Value) -> Result<ResultTriple, HandlerErr> {
    Ok(ResultTriple {
        registration_no: required_str(params, "registrationNo")?,
        semester: required_i64(params, "semester")?,
        exam_year: required_i64(params, "examYear")?,
    })
}

fn nothing_summarized(t: &ResultTriple) -> HandlerErr {
    HandlerErr {
        code: "not_found",
        message: "no approved results with catalog credits for this semester".to_string(),
        details: Some(to_json(t).unwrap_or(Value::Null)),
    }
}

fn summaries_calculate(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let t = triple(params)?;
    let summary = summary::recompute(conn, &t)?.ok_or_else(|| nothing_summarized(&t))?;
    to_json(&summary)
}

fn summaries_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let t = triple(params)?;
    let summary = summary::get_summary(conn, &t.registration_no, t.semester, t.exam_year)?
        .ok_or_else(|| nothing_summarized(&t))?;
    to_json(&summary)
}

fn summaries_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let rows = summary::student_summaries(conn, &required_str(params, "registrationNo")?)?;
    Ok(json!({ "summaries": to_json(&rows)? }))
}

fn summaries_cgpa(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let reg = required_str(params, "registrationNo")?;
    let cgpa = analytics::cgpa(conn, &reg)?;
    Ok(json!({ "registrationNo": reg, "cgpa": cgpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "summaries.calculate" => summaries_calculate(state, p),
        "summaries.get" => summaries_get(state, p),
        "summaries.list" => summaries_list(state, p),
        "summaries.cgpa" => summaries_cgpa(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

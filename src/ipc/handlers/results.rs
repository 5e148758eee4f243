use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    optional_f64, optional_i64, parse_payload, required_str, string_list, to_json,
};
use crate::ipc::types::{AppState, Request};
use resultd::catalog;
use resultd::config::EngineConfig;
use resultd::models::MarksEntry;
use resultd::results;
use rusqlite::Connection;
use serde_json::{json, Value};

/// Explicit `fullMarks`/`passMarks` win; otherwise the subject's configured
/// values, then the workspace default.
fn grading_basis(
    conn: &Connection,
    cfg: &EngineConfig,
    params: &Value,
    subject_code: &str,
) -> Result<(f64, f64), HandlerErr> {
    let full = match optional_f64(params, "fullMarks")? {
        Some(v) => v,
        None => catalog::full_marks_for(conn, subject_code, cfg.grading.default_full_marks)?,
    };
    let pass = match optional_f64(params, "passMarks")? {
        Some(v) => v,
        None => catalog::get_subject(conn, subject_code)?
            .map(|s| s.pass_marks)
            .unwrap_or(0.0),
    };
    Ok((full, pass))
}

fn results_save(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let cfg = EngineConfig::load(conn)?;
    let entry: MarksEntry = parse_payload(params.get("entry").unwrap_or(params), "entry")?;
    let (full, pass) = grading_basis(conn, &cfg, params, &entry.subject_code)?;
    let saved = results::save_result(conn, &entry, full, pass)?;
    to_json(&saved)
}

fn results_save_batch(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let cfg = EngineConfig::load(conn)?;
    let entries: Vec<MarksEntry> = parse_payload(
        params
            .get("entries")
            .ok_or_else(|| HandlerErr::bad_params("missing entries"))?,
        "entries",
    )?;
    let (full, pass) = match entries.first() {
        Some(first) => grading_basis(conn, &cfg, params, &first.subject_code)?,
        None => (cfg.grading.default_full_marks, 0.0),
    };
    if optional_f64(params, "fullMarks")?.is_none() {
        // One full-marks value grades the whole batch.
        for e in &entries {
            let f = catalog::full_marks_for(conn, &e.subject_code, cfg.grading.default_full_marks)?;
            if f != full {
                return Err(HandlerErr::bad_params(
                    "entries span subjects with different full marks; pass fullMarks",
                )
                .with_details(json!({ "subjectCode": e.subject_code, "fullMarks": f })));
            }
        }
    }
    let ids = results::save_results_batch(conn, &entries, full, pass)?;
    Ok(json!({ "resultIds": ids, "saved": ids.len() }))
}

fn results_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let rows = results::student_results(
        conn,
        &required_str(params, "registrationNo")?,
        optional_i64(params, "semester")?,
        optional_i64(params, "examYear")?,
    )?;
    Ok(json!({ "results": to_json(&rows)? }))
}

fn results_unapproved(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let rows = results::unapproved_results(conn)?;
    Ok(json!({ "results": to_json(&rows)? }))
}

fn results_approve(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let cfg = EngineConfig::load(conn)?;
    let ids = string_list(params, "resultIds")?;
    let report = results::approve_batch(conn, &cfg, &ids)?;
    to_json(&report)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "results.save" => results_save(state, p),
        "results.saveBatch" => results_save_batch(state, p),
        "results.list" => results_list(state, p),
        "results.unapproved" => results_unapproved(state),
        "results.approve" => results_approve(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    optional_f64, optional_str, parse_payload, required_f64, required_str, string_list, to_json,
};
use crate::ipc::types::{AppState, Request};
use resultd::audit;
use resultd::catalog;
use resultd::config::EngineConfig;
use resultd::models::{RecheckRequest, RecheckStatus};
use resultd::recheck::{self, RecheckSubmission};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::debug;

fn load_request(conn: &Connection, id: &str) -> Result<RecheckRequest, HandlerErr> {
    recheck::get(conn, id)?.ok_or_else(|| HandlerErr {
        code: "not_found",
        message: format!("recheck request {} not found", id),
        details: None,
    })
}

/// Loads the request and, when strict transitions are configured, refuses a
/// move that is not an edge of the workflow graph.
fn gate(
    conn: &Connection,
    id: &str,
    next: RecheckStatus,
) -> Result<RecheckRequest, HandlerErr> {
    let request = load_request(conn, id)?;
    let cfg = EngineConfig::load(conn)?;
    if cfg.recheck.strict_transitions && !request.status.can_advance_to(next) {
        debug!(id, from = request.status.as_str(), to = next.as_str(), "transition refused");
        return Err(HandlerErr {
            code: "invalid_transition",
            message: format!(
                "cannot move request from {} to {}",
                request.status.as_str(),
                next.as_str()
            ),
            details: Some(json!({ "from": request.status, "to": next })),
        });
    }
    Ok(request)
}

fn recheck_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let submission: RecheckSubmission = parse_payload(params, "recheck request")?;
    to_json(&recheck::create(conn, &submission)?)
}

fn recheck_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    to_json(&load_request(conn, &required_str(params, "requestId")?)?)
}

fn recheck_list_for_student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let rows = recheck::requests_for_student(conn, &required_str(params, "registrationNo")?)?;
    Ok(json!({ "requests": to_json(&rows)? }))
}

fn recheck_list_by_status(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let raw = match params.get("statuses") {
        Some(_) => string_list(params, "statuses")?,
        None => vec![required_str(params, "status")?],
    };
    let statuses = raw
        .iter()
        .map(|s| {
            RecheckStatus::parse(s)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown status: {}", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let rows = recheck::requests_by_statuses(conn, &statuses)?;
    Ok(json!({ "requests": to_json(&rows)? }))
}

fn recheck_forward(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let id = required_str(params, "requestId")?;
    gate(conn, &id, RecheckStatus::ForwardedToTeacher)?;
    let comment = optional_str(params, "comment")?;
    to_json(&recheck::admin_forward(conn, &id, comment.as_deref())?)
}

fn recheck_reject(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let id = required_str(params, "requestId")?;
    gate(conn, &id, RecheckStatus::Rejected)?;
    let comment = optional_str(params, "comment")?;
    to_json(&recheck::admin_reject(conn, &id, comment.as_deref())?)
}

fn recheck_teacher_no_change(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let id = required_str(params, "requestId")?;
    gate(conn, &id, RecheckStatus::TeacherReviewed)?;
    let comment = optional_str(params, "comment")?;
    to_json(&recheck::teacher_no_change(conn, &id, comment.as_deref())?)
}

fn recheck_teacher_propose(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let id = required_str(params, "requestId")?;
    let request = gate(conn, &id, RecheckStatus::TeacherReviewed)?;
    let marks = required_f64(params, "proposedMarks")?;
    let full = match optional_f64(params, "fullMarks")? {
        Some(v) => v,
        None => {
            let cfg = EngineConfig::load(conn)?;
            catalog::full_marks_for(conn, &request.subject_code, cfg.grading.default_full_marks)?
        }
    };
    let comment = optional_str(params, "comment")?;
    to_json(&recheck::teacher_propose(
        conn,
        &id,
        marks,
        full,
        comment.as_deref(),
    )?)
}

fn recheck_final_approve(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let id = required_str(params, "requestId")?;
    let request = gate(conn, &id, RecheckStatus::AdminFinalApproved)?;
    let comment = optional_str(params, "comment")?;
    to_json(&recheck::admin_final_approve(
        conn,
        &request,
        comment.as_deref(),
    )?)
}

fn recheck_audit(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let entries = match (
        optional_str(params, "requestId")?,
        optional_str(params, "resultId")?,
    ) {
        (Some(request_id), None) => audit::entries_for_request(conn, &request_id)?,
        (None, Some(result_id)) => audit::entries_for_result(conn, &result_id)?,
        _ => {
            return Err(HandlerErr::bad_params(
                "pass exactly one of requestId or resultId",
            ))
        }
    };
    Ok(json!({ "entries": to_json(&entries)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "recheck.create" => recheck_create(state, p),
        "recheck.get" => recheck_get(state, p),
        "recheck.listForStudent" => recheck_list_for_student(state, p),
        "recheck.listByStatus" => recheck_list_by_status(state, p),
        "recheck.forward" => recheck_forward(state, p),
        "recheck.reject" => recheck_reject(state, p),
        "recheck.teacherNoChange" => recheck_teacher_no_change(state, p),
        "recheck.teacherPropose" => recheck_teacher_propose(state, p),
        "recheck.finalApprove" => recheck_final_approve(state, p),
        "recheck.audit" => recheck_audit(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

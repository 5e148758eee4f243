use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{optional_i64, parse_payload, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use resultd::catalog;
use resultd::models::{DepartmentCourse, Subject};
use serde_json::{json, Value};

fn subject_payload(params: &Value) -> Result<Subject, HandlerErr> {
    let raw = params.get("subject").unwrap_or(params);
    parse_payload(raw, "subject")
}

fn subjects_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let department = params.get("department").and_then(|v| v.as_str());
    let subjects = match (department, optional_i64(params, "semester")?) {
        (Some(dept), Some(sem)) => catalog::subjects_for(conn, dept, sem)?,
        (None, None) => catalog::list_subjects(conn)?,
        _ => {
            return Err(HandlerErr::bad_params(
                "department and semester must be given together",
            ))
        }
    };
    Ok(json!({ "subjects": to_json(&subjects)? }))
}

fn subjects_get(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let code = required_str(params, "code")?;
    let subject = catalog::get_subject(conn, &code)?.ok_or_else(|| HandlerErr {
        code: "not_found",
        message: format!("subject {} not found", code),
        details: None,
    })?;
    to_json(&subject)
}

fn subjects_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let subject = subject_payload(params)?;
    catalog::add_subject(conn, &subject)?;
    Ok(json!({ "code": subject.code.trim() }))
}

fn subjects_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let subject = subject_payload(params)?;
    catalog::update_subject(conn, &subject)?;
    Ok(json!({ "ok": true }))
}

fn subjects_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let code = required_str(params, "code")?;
    catalog::delete_subject(conn, &code)?;
    Ok(json!({ "ok": true }))
}

fn courses_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let department = required_str(params, "department")?;
    let courses = catalog::courses_for(conn, &department, optional_i64(params, "semester")?)?;
    Ok(json!({ "courses": to_json(&courses)? }))
}

fn courses_upsert(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let raw = params.get("course").unwrap_or(params);
    let course: DepartmentCourse = parse_payload(raw, "course")?;
    catalog::upsert_course(conn, &course)?;
    Ok(json!({ "courseCode": course.course_code.trim() }))
}

fn courses_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let code = required_str(params, "courseCode")?;
    catalog::delete_course(conn, &code)?;
    Ok(json!({ "ok": true }))
}

fn students_enroll(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let standing = catalog::enroll_student(
        conn,
        &required_str(params, "registrationNo")?,
        &required_str(params, "department")?,
        optional_i64(params, "semester")?.unwrap_or(1),
    )?;
    to_json(&standing)
}

fn students_standing(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = state.conn()?;
    let reg = required_str(params, "registrationNo")?;
    let standing = catalog::standing(conn, &reg)?.ok_or_else(|| HandlerErr {
        code: "not_found",
        message: format!("student {} is not enrolled", reg),
        details: None,
    })?;
    let expected =
        catalog::expected_course_count(conn, &standing.department, standing.current_semester)?;
    let mut out = to_json(&standing)?;
    out["expectedCourses"] = json!(expected);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "subjects.list" => subjects_list(state, p),
        "subjects.get" => subjects_get(state, p),
        "subjects.create" => subjects_create(state, p),
        "subjects.update" => subjects_update(state, p),
        "subjects.delete" => subjects_delete(state, p),
        "courses.list" => courses_list(state, p),
        "courses.upsert" => courses_upsert(state, p),
        "courses.delete" => courses_delete(state, p),
        "students.enroll" => students_enroll(state, p),
        "students.standing" => students_standing(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}


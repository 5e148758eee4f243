mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, sidecar_with_workspace};

fn entry(subject: &str, marks: f64) -> serde_json::Value {
    json!({
        "registrationNo": "2021-001",
        "subjectCode": subject,
        "examYear": 2024,
        "semester": 1,
        "marksObtained": marks
    })
}

#[test]
fn approving_the_full_semester_promotes_exactly_once() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-approval-cascade");

    for (i, code) in ["CSE101", "CSE102"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "courses.upsert",
            json!({
                "courseCode": code,
                "department": "CSE",
                "semester": 1,
                "courseName": format!("Course {}", code),
                "credit": 3.0
            }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "e1",
        "students.enroll",
        json!({ "registrationNo": "2021-001", "department": "CSE" }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "results.save",
        entry("CSE101", 85.0),
    );
    assert_eq!(first["grade"], json!("A"));
    assert_eq!(first["gradePoint"].as_f64(), Some(3.7));
    assert_eq!(first["status"], json!("PASS"));
    assert_eq!(first["isApproved"], json!(false));
    let first_id = first["id"].as_str().expect("id").to_string();

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "s2",
        "results.save",
        entry("CSE102", 35.0),
    );
    assert_eq!(second["grade"], json!("F"));
    assert_eq!(second["status"], json!("FAIL"));
    let second_id = second["id"].as_str().expect("id").to_string();

    // A subset never promotes.
    let partial = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "results.approve",
        json!({ "resultIds": [first_id] }),
    );
    assert_eq!(partial["approved"], json!(1));
    let cascade = &partial["cascades"][0];
    assert_eq!(cascade["promotion"]["outcome"], json!("incomplete"));
    assert_eq!(cascade["promotion"]["expected"], json!(2));
    assert!(cascade["summary"]["gpa"].as_f64().is_some());

    let full = request_ok(
        &mut stdin,
        &mut reader,
        "a2",
        "results.approve",
        json!({ "resultIds": [first_id, second_id] }),
    );
    assert_eq!(full["approved"], json!(2));
    assert_eq!(full["cascades"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(full["cascades"][0]["promotion"]["outcome"], json!("promoted"));
    assert_eq!(full["cascades"][0]["promotion"]["to"], json!(2));
    assert_eq!(full["cascades"][0]["summary"]["result"], json!("FAIL"));

    let standing = request_ok(
        &mut stdin,
        &mut reader,
        "st",
        "students.standing",
        json!({ "registrationNo": "2021-001" }),
    );
    assert_eq!(standing["currentSemester"], json!(2));

    // Re-approving the old semester cannot move the student again.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "a3",
        "results.approve",
        json!({ "resultIds": [first_id] }),
    );
    assert_eq!(
        again["cascades"][0]["promotion"]["outcome"],
        json!("notCurrentSemester")
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "sg",
        "summaries.get",
        json!({ "registrationNo": "2021-001", "semester": 1, "examYear": 2024 }),
    );
    let gpa = summary["gpa"].as_f64().expect("gpa");
    assert!((gpa - 1.85).abs() < 1e-9, "gpa {}", gpa);
    assert_eq!(summary["totalMarks"].as_f64(), Some(600.0));
}

#[test]
fn resaving_resets_approval() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-resave");
    let saved = request_ok(&mut stdin, &mut reader, "1", "results.save", entry("CSE101", 55.0));
    let id = saved["id"].as_str().expect("id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.approve",
        json!({ "resultIds": [id] }),
    );
    let pending = request_ok(&mut stdin, &mut reader, "3", "results.unapproved", json!({}));
    assert_eq!(pending["results"].as_array().map(|a| a.len()), Some(0));

    let resaved = request_ok(&mut stdin, &mut reader, "4", "results.save", entry("CSE101", 75.0));
    assert_eq!(resaved["id"].as_str(), Some(id.as_str()));
    assert_eq!(resaved["isApproved"], json!(false));
    assert_eq!(resaved["grade"], json!("B+"));
    let pending = request_ok(&mut stdin, &mut reader, "5", "results.unapproved", json!({}));
    assert_eq!(pending["results"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn subject_full_marks_drive_grading() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-full-marks");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({
            "code": "CSE150",
            "name": "Lab",
            "semester": 1,
            "department": "CSE",
            "fullMarks": 50.0,
            "passMarks": 20.0
        }),
    );
    let saved = request_ok(&mut stdin, &mut reader, "2", "results.save", entry("CSE150", 45.0));
    assert_eq!(saved["grade"], json!("A+"));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "results.saveBatch",
        json!({ "entries": [entry("CSE150", 40.0), entry("CSE101", 40.0)] }),
    );
    assert_eq!(code, "bad_params");
    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.saveBatch",
        json!({ "entries": [entry("CSE150", 40.0), entry("CSE101", 40.0)], "fullMarks": 100.0 }),
    );
    assert_eq!(batch["saved"], json!(2));
}

#[test]
fn approving_nothing_fails() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-approve-empty");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "results.approve",
        json!({ "resultIds": [] }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "results.approve",
        json!({ "resultIds": ["no-such-result"] }),
    );
    assert_eq!(code, "not_found");
    let summaries = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "summaries.list",
        json!({ "registrationNo": "2021-001" }),
    );
    assert_eq!(summaries["summaries"].as_array().map(|a| a.len()), Some(0));
}

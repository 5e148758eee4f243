mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, sidecar_with_workspace};

#[test]
fn setup_sections_have_defaults_and_validate_patches() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-setup");

    let all = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(all["promotion"]["terminalSemester"], json!(8));
    assert_eq!(all["grading"]["defaultFullMarks"].as_f64(), Some(100.0));
    assert_eq!(all["recheck"]["strictTransitions"], json!(true));
    assert_eq!(all["analysis"]["cgpaHigh"].as_f64(), Some(2.5));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "grading", "patch": { "defaultFullMarks": 75.0 } }),
    );
    assert_eq!(updated["defaultFullMarks"].as_f64(), Some(75.0));
    let grading = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.get",
        json!({ "section": "grading" }),
    );
    assert_eq!(grading["defaultFullMarks"].as_f64(), Some(75.0));

    for (i, params) in [
        json!({ "section": "grading", "patch": { "defaultFullMarks": 0 } }),
        json!({ "section": "promotion", "patch": { "terminalSemester": "eight" } }),
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "analysis", "patch": { "cgpaHigh": 3.5 } }),
    ]
    .into_iter()
    .enumerate()
    {
        let code = request_err_code(&mut stdin, &mut reader, &format!("bad{}", i), "setup.update", params);
        assert_eq!(code, "bad_params");
    }

    // 60 of the configured 75 default full marks is 80%.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.save",
        json!({
            "registrationNo": "2021-010",
            "subjectCode": "UNLISTED",
            "examYear": 2024,
            "semester": 1,
            "marksObtained": 60.0
        }),
    );
    assert_eq!(saved["grade"], json!("A"));
}

#[test]
fn terminal_semester_stops_promotion() {
    let (_child, mut stdin, mut reader) = sidecar_with_workspace("resultd-terminal");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "promotion", "patch": { "terminalSemester": 1 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.upsert",
        json!({ "course": { "courseCode": "CSE101", "department": "CSE", "semester": 1, "courseName": "Programming", "credit": 3 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.enroll",
        json!({ "registrationNo": "2021-011", "department": "CSE", "semester": 1 }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "results.save",
        json!({
            "registrationNo": "2021-011",
            "subjectCode": "CSE101",
            "examYear": 2024,
            "semester": 1,
            "marksObtained": 91.0
        }),
    );
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.approve",
        json!({ "resultIds": [saved["id"]] }),
    );
    assert_eq!(
        report["cascades"][0]["promotion"]["outcome"],
        json!("terminalSemester")
    );
}

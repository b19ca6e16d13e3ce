use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn enroll_then_list_preserves_enrollment_order() {
    let workspace = temp_dir("registrar-roster-order");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Deliberately enrolled out of lexical order.
    for (id, register_no, name) in [
        ("2", "BDS2105", "Zara Thomas"),
        ("3", "BDS2101", "Anil Kumar"),
        ("4", "BDS2103", "Farah Khan"),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.enroll",
            json!({
                "registerNo": register_no,
                "name": name,
                "course": "BDS",
                "batch": "2021-2025"
            }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "course": "BDS", "batch": "2021-2025" }),
    );
    let register_nos: Vec<&str> = listed
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|r| r.get("registerNo").and_then(|v| v.as_str()).expect("registerNo"))
        .collect();
    assert_eq!(register_nos, ["BDS2105", "BDS2101", "BDS2103"]);
}

#[test]
fn duplicate_enrollment_reports_a_conflict() {
    let workspace = temp_dir("registrar-roster-dup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let enroll = json!({
        "registerNo": "BDS2101",
        "name": "Anil Kumar",
        "course": "BDS",
        "batch": "2021-2025"
    });
    let _ = request_ok(&mut stdin, &mut reader, "2", "students.enroll", enroll.clone());
    let resp = request(&mut stdin, &mut reader, "3", "students.enroll", enroll);
    assert_eq!(error_code(&resp), Some("conflict"));
}

#[test]
fn unknown_cohort_lists_as_not_found() {
    let workspace = temp_dir("registrar-roster-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.list",
        json!({ "course": "MDS", "batch": "2019-2023" }),
    );
    assert_eq!(error_code(&resp), Some("not_found"));
}

#[test]
fn course_and_batch_are_validated_on_enroll() {
    let workspace = temp_dir("registrar-roster-bad-input");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let bad_course = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.enroll",
        json!({
            "registerNo": "X1",
            "name": "A",
            "course": "BSC",
            "batch": "2021-2025"
        }),
    );
    assert_eq!(error_code(&bad_course), Some("bad_params"));

    let bad_batch = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.enroll",
        json!({
            "registerNo": "X1",
            "name": "A",
            "course": "BDS",
            "batch": "2025-2021"
        }),
    );
    assert_eq!(error_code(&bad_batch), Some("bad_params"));
}

#[test]
fn methods_require_a_selected_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.list",
        json!({ "course": "BDS", "batch": "2021-2025" }),
    );
    assert_eq!(error_code(&resp), Some("no_workspace"));
}

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

fn setup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    let _ = request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-a",
        "students.enroll",
        json!({
            "registerNo": "MDS2201",
            "name": "Kavya Menon",
            "course": "MDS",
            "batch": "2022-2026"
        }),
    );
}

fn open_row(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    assessment_type: &str,
) -> serde_json::Value {
    let result = request_ok(
        stdin,
        reader,
        id,
        "assessment.open",
        json!({
            "course": "MDS",
            "batch": "2022-2026",
            "assessmentType": assessment_type
        }),
    );
    result
        .get("students")
        .and_then(|v| v.as_array())
        .and_then(|s| s.first())
        .expect("roster row")
        .clone()
}

#[test]
fn sub_score_above_its_maximum_rejects_the_batch() {
    let workspace = temp_dir("registrar-assessment-bounds");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "assessment.save",
        json!({
            "course": "MDS",
            "batch": "2022-2026",
            "assessmentType": "Assessment I",
            "students": [{
                "registerNo": "MDS2201",
                "name": "Kavya Menon",
                "theory70": 999,
                "theory20": 10,
                "theory10": 5,
                "practical90": 80,
                "practical10": 9
            }]
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    let error = resp.get("error").expect("error object");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
    let details = error.get("details").expect("error details");
    assert_eq!(details.get("field").and_then(|v| v.as_str()), Some("theory70"));
    assert_eq!(details.get("max").and_then(|v| v.as_i64()), Some(70));

    // Nothing may have been stored for the rejected batch.
    let row = open_row(&mut stdin, &mut reader, "2", "Assessment I");
    assert!(row.get("theory70").is_none(), "rejected save left data: {}", row);
}

#[test]
fn totals_are_computed_from_sub_scores_on_save() {
    let workspace = temp_dir("registrar-assessment-totals");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assessment.save",
        json!({
            "course": "MDS",
            "batch": "2022-2026",
            "assessmentType": "Assessment I",
            "students": [{
                "registerNo": "MDS2201",
                "name": "Kavya Menon",
                "theory70": 55,
                "theory20": 14,
                "theory10": 8,
                "practical90": 72,
                "practical10": 6
            }]
        }),
    );
    assert_eq!(saved.get("count").and_then(|v| v.as_i64()), Some(1));

    let row = open_row(&mut stdin, &mut reader, "2", "Assessment I");
    assert_eq!(row.get("totalTheory").and_then(|v| v.as_i64()), Some(77));
    assert_eq!(row.get("totalPractical").and_then(|v| v.as_i64()), Some(78));
}

#[test]
fn resaving_the_same_assessment_type_overwrites_in_place() {
    let workspace = temp_dir("registrar-assessment-resave");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    for (id, theory70) in [("1", 40u64), ("2", 60u64)] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "assessment.save",
            json!({
                "course": "MDS",
                "batch": "2022-2026",
                "assessmentType": "Assessment II",
                "students": [{
                    "registerNo": "MDS2201",
                    "name": "Kavya Menon",
                    "theory70": theory70,
                    "theory20": 10,
                    "theory10": 5,
                    "practical90": 50,
                    "practical10": 5
                }]
            }),
        );
    }

    // The second save wins; totals track the latest sub-scores.
    let row = open_row(&mut stdin, &mut reader, "3", "Assessment II");
    assert_eq!(row.get("theory70").and_then(|v| v.as_i64()), Some(60));
    assert_eq!(row.get("totalTheory").and_then(|v| v.as_i64()), Some(75));

    // The two assessment types stay independent.
    let other = open_row(&mut stdin, &mut reader, "4", "Assessment I");
    assert!(other.get("theory70").is_none(), "type bleed: {}", other);
}

#[test]
fn unknown_assessment_type_is_rejected() {
    let workspace = temp_dir("registrar-assessment-type");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "assessment.save",
        json!({
            "course": "MDS",
            "batch": "2022-2026",
            "assessmentType": "Assessment III",
            "students": [{ "registerNo": "MDS2201", "name": "Kavya Menon" }]
        }),
    );
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );
}

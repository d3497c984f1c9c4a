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
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
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

fn select(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, params: serde_json::Value) {
    request_ok(stdin, reader, "sel", "workspace.select", params);
}

fn exercise_dedup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let payload = json!({
        "classId": "c1",
        "subjectId": "math",
        "teacherId": "t9",
        "year": "2025",
        "term": "Fall",
        "schedule": "MWF"
    });
    let first = request_ok(stdin, reader, "1", "assignments.create", payload.clone());
    assert_eq!(first["existing"], json!(false));
    assert_eq!(first["composite"], json!("c1|math|t9|2025|Fall|MWF"));
    let id = first["id"].as_str().expect("id").to_string();

    let again = request_ok(stdin, reader, "2", "assignments.create", payload);
    assert_eq!(again["existing"], json!(true));
    assert_eq!(again["id"], json!(id));

    let other = request_ok(
        stdin,
        reader,
        "3",
        "assignments.create",
        json!({ "classId": "c1", "subjectId": "sci" }),
    );
    assert_eq!(other["composite"], json!("c1|sci||||"));
    let other_id = other["id"].as_str().expect("other id").to_string();

    let collide = request(
        stdin,
        reader,
        "4",
        "assignments.update",
        json!({
            "assignmentId": other_id,
            "patch": { "subjectId": "math", "teacherId": "t9", "year": "2025", "term": "Fall", "schedule": "MWF" }
        }),
    );
    assert_eq!(collide["ok"], json!(false));
    assert_eq!(collide["error"]["code"], json!("duplicate_composite"));
    assert_eq!(collide["error"]["details"]["existingId"], json!(id));

    let moved = request_ok(
        stdin,
        reader,
        "5",
        "assignments.update",
        json!({ "assignmentId": other_id, "patch": { "classId": "c2" } }),
    );
    assert_eq!(moved["data"]["composite"], json!("c2|sci||||"));

    let c1 = request_ok(stdin, reader, "6", "assignments.listByClass", json!({ "classId": "c1" }));
    let ids: Vec<_> = c1["assignments"]
        .as_array()
        .expect("assignments")
        .iter()
        .filter_map(|a| a["id"].as_str())
        .collect();
    assert_eq!(ids, vec![id.as_str()]);

    request_ok(stdin, reader, "7", "assignments.delete", json!({ "assignmentId": id }));
    let gone = request(stdin, reader, "8", "assignments.delete", json!({ "assignmentId": id }));
    assert_eq!(gone["error"]["code"], json!("not_found"));

    let recreated = request_ok(
        stdin,
        reader,
        "9",
        "assignments.create",
        json!({
            "classId": "c1", "subjectId": "math", "teacherId": "t9",
            "year": "2025", "term": "Fall", "schedule": "MWF"
        }),
    );
    assert_eq!(recreated["existing"], json!(false));
    assert_ne!(recreated["id"], json!(id));

    let missing = request(stdin, reader, "10", "assignments.create", json!({ "classId": "c1" }));
    assert_eq!(missing["error"]["code"], json!("bad_params"));
}

#[test]
fn composite_dedup_on_indexed_sqlite_workspace() {
    let workspace = temp_dir("rosterd-assignments-sqlite");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, json!({ "path": workspace.to_string_lossy() }));
    exercise_dedup(&mut stdin, &mut reader);
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn composite_dedup_falls_back_to_scan_without_index() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(
        &mut stdin,
        &mut reader,
        json!({ "memory": true, "config": { "indexedFields": [] } }),
    );
    exercise_dedup(&mut stdin, &mut reader);
    drop(stdin);
    let _ = child.wait();
}

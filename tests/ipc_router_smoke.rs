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

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rosterd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());

    let early = request(&mut stdin, &mut reader, "2", "subjects.create", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));
    for (i, (method, params)) in [
        ("subjects.listByYear", json!({ "schoolYear": "2025" })),
        ("classes.listByYear", json!({ "schoolYear": "2025" })),
        ("students.roster", json!({ "classId": "c1" })),
        ("assignments.list", json!({})),
        ("assignments.listByClass", json!({ "classId": "c1" })),
    ]
    .into_iter()
    .enumerate()
    {
        let listed = request(&mut stdin, &mut reader, &format!("e{i}"), method, params);
        assert_eq!(listed["ok"], json!(false), "{method} answered without a workspace");
        assert_eq!(error_code(&listed), Some("no_workspace"), "{method}");
    }

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["result"]["backend"], json!("sqlite"));
    assert_eq!(selected["result"]["capabilities"]["atomicWrites"], json!(true));
    assert!(workspace.join("rosterd.sqlite3").is_file());

    let class = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "7B", "schoolYear": "2025" }),
    );
    let class_id = class["result"]["id"].as_str().expect("class id").to_string();

    let calls = [
        ("subjects.create", json!({ "code": "MATH", "name": "Math" })),
        ("subjects.listByYear", json!({ "schoolYear": 2025 })),
        ("classes.get", json!({ "classId": class_id })),
        ("classes.listByYear", json!({ "schoolYear": "2025", "term": "Fall" })),
        ("assignments.create", json!({ "classId": class_id, "subjectId": "s1" })),
        ("assignments.list", json!({})),
        ("assignments.listByClass", json!({ "classId": class_id })),
        ("students.create", json!({ "name": "Ada" })),
        ("students.roster", json!({ "classId": class_id })),
        ("students.moves", json!({ "studentId": "nobody" })),
        ("students.promote", json!({})),
        ("students.promote.resume", json!({ "writes": [] })),
        ("index.reconcile", json!({})),
        ("store.get", json!({ "path": "/classes" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let _ = request(&mut stdin, &mut reader, &format!("s{i}"), method, params);
    }

    let unknown = request_unchecked(&mut stdin, &mut reader, "99", "nope.method");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

fn request_unchecked(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", json!({ "id": id, "method": method })).expect("write request");
    stdin.flush().expect("flush request");
    read_response(reader)
}

#[test]
fn malformed_lines_get_bad_json_and_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(error_code(&resp), Some("bad_json"));

    // Blank lines are skipped without a response.
    writeln!(stdin).expect("write blank");
    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_config_file_is_layered_under_request_config() {
    let workspace = temp_dir("rosterd-config-layering");
    std::fs::write(
        workspace.join("rosterd.json"),
        r#"{ "atomicWrites": false, "indexedFields": [] }"#,
    )
    .expect("write config");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({
            "path": workspace.to_string_lossy(),
            "config": { "indexedFields": ["composite"] }
        }),
    );
    let caps = &selected["result"]["capabilities"];
    assert_eq!(caps["atomicWrites"], json!(false));
    assert_eq!(caps["indexedFields"], json!(["composite"]));

    let bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "memory": true, "config": { "atomicWrites": "yes" } }),
    );
    assert_eq!(error_code(&bad), Some("bad_config"));

    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["result"]["backend"], json!("sqlite"));

    drop(stdin);
    let _ = child.wait();
}

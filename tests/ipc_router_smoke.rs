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
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .env_remove("CAMPUSD_WORKSPACE")
        .env("CAMPUSD_BOOTSTRAP_ADMIN_EMAIL", "admin@campus.test")
        .env("CAMPUSD_BOOTSTRAP_ADMIN_PASSWORD", "admin-pass")
        .env("CAMPUSD_LOG_LEVEL", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
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

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("campus-router-smoke");
    let bundle_out = workspace.join("smoke-store.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        json!({
            "email": "smoke.student@campus.test",
            "password": "pw",
            "name": "Smoke Student",
            "role": "student"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "email": "admin@campus.test", "password": "admin-pass" }),
    );
    let _ = request(&mut stdin, &mut reader, "5", "auth.session", json!({}));
    let _ = request(&mut stdin, &mut reader, "6", "auth.views", json!({}));
    let _ = request(&mut stdin, &mut reader, "7", "profile.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "profile.update",
        json!({ "patch": { "phone": "555-0100" } }),
    );
    let _ = request(&mut stdin, &mut reader, "9", "profile.complete", json!({}));
    let _ = request(&mut stdin, &mut reader, "10", "users.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "users.approve",
        json!({ "email": "smoke.student@campus.test" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "users.setRole",
        json!({ "email": "smoke.student@campus.test", "role": "student" }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "13",
        "projects.create",
        json!({ "studentEmail": "smoke.student@campus.test", "title": "Smoke App" }),
    );
    let project_id = created
        .get("result")
        .and_then(|v| v.get("project"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("project id")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "14", "projects.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "projects.submit",
        json!({ "id": project_id, "deployLink": "https://smoke.example" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "projects.grade",
        json!({ "id": project_id, "grade": "A" }),
    );
    let _ = request(&mut stdin, &mut reader, "17", "attendance.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "attendance.mark",
        json!({ "date": "2024-05-01", "records": [] }),
    );
    let _ = request(&mut stdin, &mut reader, "19", "attendance.summary", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "fees.set",
        json!({ "studentEmail": "smoke.student@campus.test", "totalAmount": 100 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "fees.recordPayment",
        json!({ "studentEmail": "smoke.student@campus.test", "amount": 40 }),
    );
    let _ = request(&mut stdin, &mut reader, "22", "fees.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "fees.get",
        json!({ "studentEmail": "smoke.student@campus.test" }),
    );
    let _ = request(&mut stdin, &mut reader, "24", "crm.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "25", "crm.create", json!({ "name": "Lead" }));
    let _ = request(
        &mut stdin,
        &mut reader,
        "26",
        "crm.update",
        json!({ "id": "missing", "patch": { "status": "lost" } }),
    );
    let _ = request(&mut stdin, &mut reader, "27", "crm.delete", json!({ "id": "missing" }));
    let _ = request(&mut stdin, &mut reader, "28", "crm.stats", json!({}));
    let _ = request(&mut stdin, &mut reader, "29", "reports.summary", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "30",
        "store.export",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "31",
        "store.import",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "32",
        "store.reset",
        json!({ "collection": "crm_leads" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "33",
        "fees.delete",
        json!({ "studentEmail": "smoke.student@campus.test" }),
    );
    let _ = request(&mut stdin, &mut reader, "34", "projects.delete", json!({ "id": project_id }));
    let _ = request(
        &mut stdin,
        &mut reader,
        "35",
        "users.delete",
        json!({ "email": "smoke.student@campus.test" }),
    );
    let _ = request(&mut stdin, &mut reader, "36", "auth.logout", json!({}));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_method_and_bad_json_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let payload = json!({ "id": "u1", "method": "grades.compute", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush");
    line.clear();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value["id"], json!("u1"));
    assert_eq!(value["error"]["code"], json!("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn requests_before_workspace_select_are_refused() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());
    assert_eq!(health["result"]["signedIn"], json!(false));

    for (i, method) in ["auth.login", "users.list", "fees.list", "store.export"]
        .iter()
        .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("n{}", i),
            method,
            json!({ "email": "a@b.c", "password": "x", "outPath": "/tmp/x.zip" }),
        );
        assert_eq!(resp["ok"], json!(false), "{} should fail", method);
        assert_eq!(resp["error"]["code"], json!("no_workspace"), "{}", method);
    }

    drop(stdin);
    let _ = child.wait();
}

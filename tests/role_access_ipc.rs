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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

const ACCOUNTS: &[(&str, &str)] = &[
    ("stu@campus.test", "student"),
    ("teach@campus.test", "instructor"),
    ("books@campus.test", "accounting"),
    ("deals@campus.test", "sales"),
];

/// Workspace with one approved account per role, nobody signed in.
fn seeded_sidecar(prefix: &str) -> (PathBuf, Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (email, role) in ACCOUNTS {
        request_ok(
            &mut stdin,
            &mut reader,
            "seed-reg",
            "auth.register",
            json!({ "email": email, "password": "pw", "name": email, "role": role }),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "seed-admin",
        "auth.login",
        json!({ "email": "admin@campus.test", "password": "admin-pass" }),
    );
    for (email, _) in ACCOUNTS {
        request_ok(
            &mut stdin,
            &mut reader,
            "seed-approve",
            "users.approve",
            json!({ "email": email }),
        );
    }
    request_ok(&mut stdin, &mut reader, "seed-out", "auth.logout", json!({}));
    (workspace, child, stdin, reader)
}

fn login_as(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, email: &str) -> serde_json::Value {
    let password = if email == "admin@campus.test" { "admin-pass" } else { "pw" };
    request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "email": email, "password": password }),
    )
}

#[test]
fn each_role_reaches_exactly_its_views() {
    let (workspace, mut child, mut stdin, mut reader) = seeded_sidecar("campus-role-views");

    let expected = [
        ("admin@campus.test", json!(["projects", "users", "fees", "report"])),
        ("teach@campus.test", json!(["projects", "attendance", "report"])),
        ("stu@campus.test", json!(["projects", "profile", "attendance"])),
        ("books@campus.test", json!(["fees", "report", "profile"])),
        ("deals@campus.test", json!(["crm", "report", "profile"])),
    ];
    for (email, views) in expected {
        let login = login_as(&mut stdin, &mut reader, email);
        assert_eq!(login["views"], views, "views for {}", email);
        let again = request_ok(&mut stdin, &mut reader, "v", "auth.views", json!({}));
        assert_eq!(again["views"], views, "auth.views for {}", email);
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn handlers_refuse_roles_outside_their_view() {
    let (workspace, mut child, mut stdin, mut reader) = seeded_sidecar("campus-role-deny");

    let anonymous = request(&mut stdin, &mut reader, "a1", "projects.list", json!({}));
    assert_eq!(error_code(&anonymous), "unauthenticated");

    // (account, method) pairs that must come back forbidden.
    let denied = [
        ("stu@campus.test", "users.list"),
        ("stu@campus.test", "fees.list"),
        ("stu@campus.test", "crm.list"),
        ("stu@campus.test", "reports.summary"),
        ("stu@campus.test", "attendance.mark"),
        ("teach@campus.test", "users.list"),
        ("teach@campus.test", "fees.list"),
        ("books@campus.test", "projects.list"),
        ("books@campus.test", "crm.stats"),
        ("books@campus.test", "attendance.list"),
        ("deals@campus.test", "fees.list"),
        ("deals@campus.test", "users.list"),
        ("admin@campus.test", "crm.list"),
        ("admin@campus.test", "attendance.list"),
        ("teach@campus.test", "store.export"),
    ];
    for (email, method) in denied {
        login_as(&mut stdin, &mut reader, email);
        let resp = request(
            &mut stdin,
            &mut reader,
            "d",
            method,
            json!({ "date": "2024-01-01", "records": [], "outPath": "/tmp/never.zip" }),
        );
        assert_eq!(error_code(&resp), "forbidden", "{} calling {}", email, method);
    }

    // And the allowed counterparts.
    let allowed = [
        ("admin@campus.test", "users.list"),
        ("admin@campus.test", "fees.list"),
        ("teach@campus.test", "attendance.list"),
        ("teach@campus.test", "reports.summary"),
        ("stu@campus.test", "projects.list"),
        ("books@campus.test", "fees.list"),
        ("deals@campus.test", "crm.list"),
        ("deals@campus.test", "reports.summary"),
    ];
    for (email, method) in allowed {
        login_as(&mut stdin, &mut reader, email);
        request_ok(&mut stdin, &mut reader, "ok", method, json!({}));
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn students_only_see_their_own_records() {
    let (workspace, mut child, mut stdin, mut reader) = seeded_sidecar("campus-role-scope");

    login_as(&mut stdin, &mut reader, "admin@campus.test");
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "projects.create",
        json!({ "studentEmail": "someone.else@campus.test", "title": "Not yours" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "fees.set",
        json!({ "studentEmail": "someone.else@campus.test", "totalAmount": 10 }),
    );

    login_as(&mut stdin, &mut reader, "stu@campus.test");
    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "projects.create",
        json!({ "title": "Mine", "studentEmail": "someone.else@campus.test" }),
    );
    assert_eq!(mine["project"]["studentEmail"], json!("stu@campus.test"));

    let listed = request_ok(&mut stdin, &mut reader, "4", "projects.list", json!({}));
    let titles: Vec<&str> = listed["projects"]
        .as_array()
        .expect("projects")
        .iter()
        .filter_map(|p| p["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Mine"]);

    let other = request(
        &mut stdin,
        &mut reader,
        "5",
        "projects.list",
        json!({ "studentEmail": "someone.else@campus.test" }),
    );
    assert_eq!(error_code(&other), "forbidden");

    let other_fee = request(
        &mut stdin,
        &mut reader,
        "6",
        "fees.get",
        json!({ "studentEmail": "someone.else@campus.test" }),
    );
    assert_eq!(error_code(&other_fee), "forbidden");
    let own_fee = request_ok(&mut stdin, &mut reader, "7", "fees.get", json!({}));
    assert!(own_fee["fee"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

use crate::ipc::helpers::{get_optional_str, get_required_str, open_workspace, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_email, AttendanceEntry, AttendanceSession, Collection, Role};
use crate::roles::ViewId;
use crate::stats;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

fn parse_date_key(raw: &str) -> Result<String, HandlerErr> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

fn parse_entries(params: &Value) -> Result<Vec<AttendanceEntry>, HandlerErr> {
    let Some(items) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("records must be an array"));
    };
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let email = item
            .get("email")
            .and_then(|v| v.as_str())
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| HandlerErr::bad_params(format!("records[{}].email is required", i)))?;
        let present = item
            .get("present")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| HandlerErr::bad_params(format!("records[{}].present must be boolean", i)))?;
        if !seen.insert(email.clone()) {
            return Err(HandlerErr::bad_params(format!("duplicate email in records: {}", email))
                .with_details(json!({ "email": email })));
        }
        entries.push(AttendanceEntry { email, present });
    }
    Ok(entries)
}

fn attendance_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Attendance)?;
    let date = get_optional_str(params, "date")?
        .map(|d| parse_date_key(&d))
        .transpose()?;

    let sessions: Vec<AttendanceSession> = store
        .load::<AttendanceSession>()
        .into_iter()
        .filter(|s| date.as_deref().map_or(true, |d| s.date == d))
        .collect();

    if current.role == Role::Student {
        // Students only ever see their own mark for each session.
        let own: Vec<Value> = sessions
            .iter()
            .filter_map(|s| {
                s.entry_for(&current.email).map(|e| {
                    json!({
                        "date": s.date,
                        "course": s.course,
                        "present": e.present
                    })
                })
            })
            .collect();
        return Ok(json!({ "sessions": own }));
    }
    Ok(json!({ "sessions": sessions }))
}

fn attendance_mark(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Attendance)?;
    if current.role != Role::Instructor {
        return Err(HandlerErr::forbidden("only instructors mark attendance"));
    }
    let date = parse_date_key(&get_required_str(params, "date")?)?;
    let entries = parse_entries(params)?;

    let mut patch = Map::new();
    patch.insert("records".into(), to_json(&entries)?);
    patch.insert("markedBy".into(), Value::String(current.email.clone()));
    if let Some(course) = get_optional_str(params, "course")? {
        patch.insert("course".into(), Value::String(course));
    }
    let record = store.upsert_by_key(Collection::Attendance, "date", &date, patch)?;
    Ok(json!({ "session": record }))
}

fn attendance_summary(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let current = session.authorize(ViewId::Attendance)?;
    let requested = get_optional_str(params, "email")?.map(|e| normalize_email(&e));
    let sessions = store.load::<AttendanceSession>();

    let target = if current.role == Role::Student {
        if requested.as_deref().is_some_and(|e| e != current.email) {
            return Err(HandlerErr::forbidden("students can only view their own attendance"));
        }
        Some(current.email.clone())
    } else {
        requested
    };

    match target {
        Some(email) => Ok(json!({
            "sessionCount": sessions.len(),
            "students": [stats::attendance_for(&sessions, &email)]
        })),
        None => Ok(json!({
            "sessionCount": sessions.len(),
            "overallRate": stats::overall_attendance_rate(&sessions),
            "students": stats::attendance_by_student(&sessions)
        })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.list" => Some(respond(state, req, attendance_list)),
        "attendance.mark" => Some(respond(state, req, attendance_mark)),
        "attendance.summary" => Some(respond(state, req, attendance_summary)),
        _ => None,
    }
}

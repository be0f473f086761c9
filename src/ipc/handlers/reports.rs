use crate::ipc::helpers::{open_workspace, respond, HandlerErr, Store};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceSession, FeeRecord, Lead, LeadStatus, Project, Role, User};
use crate::roles::ViewId;
use crate::stats;
use serde_json::{json, Value};

fn project_counts(store: &Store) -> Value {
    let projects = store.load::<Project>();
    json!({
        "total": projects.len(),
        "submitted": projects.iter().filter(|p| p.deploy_link.is_some()).count(),
        "graded": projects.iter().filter(|p| p.grade.is_some()).count(),
        "awaitingGrade": projects
            .iter()
            .filter(|p| p.deploy_link.is_some() && p.grade.is_none())
            .count()
    })
}

fn attendance_overview(store: &Store) -> Value {
    let sessions = store.load::<AttendanceSession>();
    json!({
        "sessionCount": sessions.len(),
        "overallRate": stats::overall_attendance_rate(&sessions)
    })
}

fn lead_overview(store: &Store) -> Value {
    let leads = store.load::<Lead>();
    let converted = leads
        .iter()
        .filter(|l| l.status == LeadStatus::Converted)
        .count();
    let conversion_rate = (!leads.is_empty())
        .then(|| stats::round_off_1_decimal(100.0 * converted as f64 / leads.len() as f64));
    json!({
        "total": leads.len(),
        "byStatus": stats::lead_counts(&leads),
        "conversionRate": conversion_rate
    })
}

/// Dashboard counts scoped to what the caller's role looks after.
fn reports_summary(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let role = session.authorize(ViewId::Report)?.role;

    let summary = match role {
        Role::Admin => {
            let users = store.load::<User>();
            let fees = store.load::<FeeRecord>();
            json!({
                "users": stats::user_counts(&users),
                "projects": project_counts(store),
                "fees": stats::fee_totals(&fees)
            })
        }
        Role::Instructor => {
            let students = store
                .load::<User>()
                .iter()
                .filter(|u| u.role == Role::Student && u.approved)
                .count();
            json!({
                "students": students,
                "projects": project_counts(store),
                "attendance": attendance_overview(store)
            })
        }
        Role::Accounting => {
            let fees = store.load::<FeeRecord>();
            json!({ "fees": stats::fee_totals(&fees) })
        }
        Role::Sales => json!({ "leads": lead_overview(store) }),
        // The student role has no report view; authorize() already refused it.
        Role::Student => json!({}),
    };
    Ok(json!({ "role": role, "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.summary" => Some(respond(state, req, reports_summary)),
        _ => None,
    }
}

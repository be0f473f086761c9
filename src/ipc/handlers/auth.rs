use crate::ipc::helpers::{get_required_str, open_workspace, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Role, Session};
use crate::roles;
use crate::session::{self, NewUser};
use serde_json::{json, Map, Value};

const REGISTER_FIELDS: &[&str] = &["email", "password", "name", "role"];

fn auth_register(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, _) = open_workspace(state)?;
    let role_raw = get_required_str(params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_raw)))?;
    // Everything beyond the account fields is treated as initial profile data.
    let profile: Map<String, Value> = params
        .as_object()
        .map(|m| {
            m.iter()
                .filter(|(k, _)| !REGISTER_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    let new_user = NewUser {
        email: get_required_str(params, "email")?,
        password: params
            .get("password")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        name: get_required_str(params, "name")?,
        role,
        profile,
    };
    let user = session::register(store, new_user)?;
    Ok(json!({ "user": Session::from(&user) }))
}

fn auth_login(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let email = get_required_str(params, "email")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;
    let current = session.login(store, &email, password)?;
    Ok(json!({
        "session": current,
        "views": roles::reachable_views(current.role)
    }))
}

fn auth_logout(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.logout(store)?;
    Ok(json!({ "session": null }))
}

fn auth_session(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    Ok(json!({ "session": state.session.current_session() }))
}

fn auth_views(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let current = state.session.require_login()?;
    Ok(json!({
        "role": current.role,
        "views": roles::reachable_views(current.role)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.register" => Some(respond(state, req, auth_register)),
        "auth.login" => Some(respond(state, req, auth_login)),
        "auth.logout" => Some(respond(state, req, auth_logout)),
        "auth.session" => Some(respond(state, req, auth_session)),
        "auth.views" => Some(respond(state, req, auth_views)),
        _ => None,
    }
}

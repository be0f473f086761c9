use crate::ipc::helpers::{get_object, open_workspace, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Session;
use crate::session::{apply_profile_patch, find_user, missing_profile_fields};
use serde_json::{json, Map, Value};
use tracing::info;

fn profile_get(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let email = session.require_login()?.email.clone();
    let user = find_user(store, &email)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    Ok(json!({
        "profile": Session::from(&user),
        "missingFields": missing_profile_fields(&user)
    }))
}

fn profile_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let email = session.require_login()?.email.clone();
    let patch = get_object(params, "patch")?;
    let user = find_user(store, &email)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    let updated = apply_profile_patch(&user, &patch)?;
    store.save(&updated)?;
    session.refresh(store, &email)?;
    Ok(json!({
        "profile": Session::from(&updated),
        "missingFields": missing_profile_fields(&updated)
    }))
}

fn profile_complete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let email = session.require_login()?.email.clone();
    let patch = match params.get("patch") {
        None | Some(Value::Null) => Map::new(),
        Some(_) => get_object(params, "patch")?,
    };
    let user = find_user(store, &email)?.ok_or_else(|| HandlerErr::not_found("user not found"))?;
    let mut updated = apply_profile_patch(&user, &patch)?;
    let missing = missing_profile_fields(&updated);
    if !missing.is_empty() {
        return Err(HandlerErr::bad_params("profile is missing required fields")
            .with_details(json!({ "missing": missing })));
    }
    updated.profile_completed = true;
    store.save(&updated)?;
    session.refresh(store, &email)?;
    info!(email = %email, "profile completed");
    Ok(json!({ "profile": Session::from(&updated) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "profile.get" => Some(respond(state, req, profile_get)),
        "profile.update" => Some(respond(state, req, profile_update)),
        "profile.complete" => Some(respond(state, req, profile_complete)),
        _ => None,
    }
}

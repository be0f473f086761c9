use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_str, open_workspace, respond, HandlerErr,
};
use crate::error::StoreError;
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_email, Collection, Role, Session, User};
use crate::roles::ViewId;
use crate::session::{ensure_admin_remains, find_user};
use serde_json::{json, Map, Value};
use tracing::info;

fn users_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Users)?;
    let role = match get_optional_str(params, "role")? {
        Some(r) => {
            Some(Role::parse(&r).ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", r)))?)
        }
        None => None,
    };
    let approved = get_optional_bool(params, "approved")?;

    let users: Vec<Session> = store
        .load::<User>()
        .iter()
        .filter(|u| role.map_or(true, |r| u.role == r))
        .filter(|u| approved.map_or(true, |a| u.approved == a))
        .map(Session::from)
        .collect();
    Ok(json!({ "users": users }))
}

fn users_approve(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let actor = session.authorize(ViewId::Users)?.email.clone();
    let email = normalize_email(&get_required_str(params, "email")?);
    let approved = get_optional_bool(params, "approved")?.unwrap_or(true);
    if email == actor && !approved {
        return Err(HandlerErr::bad_params("cannot revoke your own approval"));
    }
    if !approved {
        ensure_admin_remains(store, &email, false)?;
    }

    let mut patch = Map::new();
    patch.insert("approved".into(), Value::Bool(approved));
    let record = store.patch_by_key(Collection::Users, "email", &email, patch)?;
    session.refresh(store, &email)?;
    info!(email = %email, approved, "user approval changed");

    let user: User = serde_json::from_value(Value::Object(record)).map_err(|e| {
        StoreError::CorruptedStore {
            collection: Collection::Users.name().to_string(),
            reason: format!("user {}: {}", email, e),
        }
    })?;
    Ok(json!({ "user": Session::from(&user) }))
}

fn users_set_role(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let actor = session.authorize(ViewId::Users)?.email.clone();
    let email = normalize_email(&get_required_str(params, "email")?);
    let role_raw = get_required_str(params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_raw)))?;
    if email == actor && role != Role::Admin {
        return Err(HandlerErr::bad_params("cannot remove your own admin role"));
    }

    let mut user = find_user(store, &email)?
        .ok_or_else(|| HandlerErr::not_found("user not found"))?;
    ensure_admin_remains(store, &email, role == Role::Admin && user.approved)?;
    user.role = role;
    store.save(&user)?;
    session.refresh(store, &email)?;
    info!(email = %email, role = %role, "user role changed");
    Ok(json!({ "user": Session::from(&user) }))
}

/// Removes only the user record. Projects, attendance and fees that mention
/// the email are left in place.
fn users_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let actor = session.authorize(ViewId::Users)?.email.clone();
    let email = normalize_email(&get_required_str(params, "email")?);
    if email == actor {
        return Err(HandlerErr::bad_params("cannot delete your own account"));
    }
    ensure_admin_remains(store, &email, false)?;
    let deleted = store.delete_by_key(Collection::Users, "email", &email)?;
    if deleted {
        info!(email = %email, "user deleted");
    }
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "users.list" => Some(respond(state, req, users_list)),
        "users.approve" => Some(respond(state, req, users_approve)),
        "users.setRole" => Some(respond(state, req, users_set_role)),
        "users.delete" => Some(respond(state, req, users_delete)),
        _ => None,
    }
}

use crate::ipc::helpers::{
    get_object, get_optional_str, get_required_str, merge_entity, now_rfc3339, open_workspace,
    respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Lead, LeadStatus};
use crate::roles::ViewId;
use crate::stats;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const LOCKED_LEAD_FIELDS: &[&str] = &["id", "createdAt"];

fn crm_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Crm)?;
    let status = get_optional_str(params, "status")?.map(LeadStatus::from);
    let leads: Vec<Lead> = store
        .load::<Lead>()
        .into_iter()
        .filter(|l| status.as_ref().map_or(true, |s| &l.status == s))
        .collect();
    Ok(json!({ "leads": leads }))
}

fn crm_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Crm)?;
    let lead = Lead {
        id: Uuid::new_v4().to_string(),
        name: get_required_str(params, "name")?,
        email: get_optional_str(params, "email")?,
        phone: get_optional_str(params, "phone")?,
        course: get_optional_str(params, "course")?,
        status: get_optional_str(params, "status")?
            .map(LeadStatus::from)
            .unwrap_or(LeadStatus::New),
        notes: get_optional_str(params, "notes")?,
        created_at: Some(now_rfc3339()),
        extra: Map::new(),
    };
    store.save(&lead)?;
    Ok(json!({ "lead": lead }))
}

fn crm_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Crm)?;
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    let lead = store
        .try_find::<Lead>(&id)?
        .ok_or_else(|| HandlerErr::not_found("lead not found"))?;
    let updated: Lead = merge_entity(&lead, &patch, LOCKED_LEAD_FIELDS)?;
    store.save(&updated)?;
    Ok(json!({ "lead": updated }))
}

fn crm_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Crm)?;
    let id = get_required_str(params, "id")?;
    let deleted = store.remove::<Lead>(&id)?;
    Ok(json!({ "deleted": deleted }))
}

fn crm_stats(state: &mut AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    session.authorize(ViewId::Crm)?;
    let leads = store.load::<Lead>();
    Ok(json!({
        "total": leads.len(),
        "byStatus": stats::lead_counts(&leads)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "crm.list" => Some(respond(state, req, crm_list)),
        "crm.create" => Some(respond(state, req, crm_create)),
        "crm.update" => Some(respond(state, req, crm_update)),
        "crm.delete" => Some(respond(state, req, crm_delete)),
        "crm.stats" => Some(respond(state, req, crm_stats)),
        _ => None,
    }
}

use crate::backup;
use crate::ipc::helpers::{get_required_str, open_workspace, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Collection, Role};
use crate::session::SessionState;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

fn require_admin(session: &SessionState) -> Result<String, HandlerErr> {
    let current = session.require_login()?;
    if current.role != Role::Admin {
        return Err(HandlerErr::forbidden("store maintenance is limited to admins"));
    }
    Ok(current.email.clone())
}

fn store_export(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    require_admin(session)?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let summary = backup::export_store_bundle(store, &out_path)
        .map_err(|e| HandlerErr::new("backup_failed", format!("{e:#}")))?;
    info!(path = %out_path.to_string_lossy(), "store exported");
    Ok(json!({
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "recordCounts": summary.record_counts,
        "outPath": out_path.to_string_lossy()
    }))
}

fn store_import(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    let actor = require_admin(session)?;
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let summary = backup::import_store_bundle(store, &in_path)
        .map_err(|e| HandlerErr::new("backup_failed", format!("{e:#}")))?;
    // The importing admin may no longer exist in the restored users.
    session.refresh(store, &actor)?;
    warn!(path = %in_path.to_string_lossy(), "store replaced from bundle");
    Ok(json!({
        "bundleFormatDetected": summary.bundle_format_detected,
        "recordCounts": summary.record_counts,
        "session": session.current_session()
    }))
}

fn store_reset(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let (store, session) = open_workspace(state)?;
    require_admin(session)?;
    let name = get_required_str(params, "collection")?;
    let collection = Collection::parse(&name)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown collection: {}", name)))?;
    if collection == Collection::Users {
        return Err(HandlerErr::bad_params("the users collection cannot be reset"));
    }
    let removed = store.reset_collection(collection)?;
    Ok(json!({ "collection": collection.name(), "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "store.export" => Some(respond(state, req, store_export)),
        "store.import" => Some(respond(state, req, store_import)),
        "store.reset" => Some(respond(state, req, store_reset)),
        _ => None,
    }
}

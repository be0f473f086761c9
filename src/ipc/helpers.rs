use crate::error::{AuthError, StoreError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionState;
use crate::storage::SqliteStorage;
use crate::store::RecordStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

pub type Store = RecordStore<SqliteStorage>;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<AuthError> for HandlerErr {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Store(inner) => inner.into(),
            other => Self::new(other.code(), other.to_string()),
        }
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let details = match &e {
            StoreError::CorruptedStore { collection, .. } => Some(json!({ "collection": collection })),
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

/// Run `f` and wrap its outcome in the response envelope for `req`.
pub fn respond<F>(state: &mut AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&mut AppState, &Value) -> Result<Value, HandlerErr>,
{
    match f(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn open_workspace(state: &mut AppState) -> Result<(&mut Store, &mut SessionState), HandlerErr> {
    let AppState { store, session, .. } = state;
    let store = store
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    Ok((store, session))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn get_optional_amount(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_f64()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
            if !n.is_finite() || n < 0.0 {
                return Err(HandlerErr::bad_params(format!("{} must be >= 0", key)));
            }
            Ok(Some(n))
        }
    }
}

pub fn get_required_amount(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    get_optional_amount(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_object(params: &Value, key: &str) -> Result<Map<String, Value>, HandlerErr> {
    match params.get(key) {
        Some(Value::Object(m)) => Ok(m.clone()),
        None | Some(Value::Null) => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an object", key))),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::from(StoreError::from(e)))
}

/// Merge `patch` over `entity`'s JSON form and decode the result, rejecting
/// any `locked` field.
pub fn merge_entity<T>(entity: &T, patch: &Map<String, Value>, locked: &[&str]) -> Result<T, HandlerErr>
where
    T: Serialize + DeserializeOwned,
{
    if let Some(field) = patch.keys().find(|k| locked.contains(&k.as_str())) {
        return Err(HandlerErr::bad_params(format!("{} cannot be changed", field)));
    }
    let Value::Object(mut obj) = to_json(entity)? else {
        return Err(HandlerErr::new("storage_failed", "record must encode as an object"));
    };
    for (k, v) in patch {
        obj.insert(k.clone(), v.clone());
    }
    serde_json::from_value(Value::Object(obj))
        .map_err(|e| HandlerErr::bad_params(format!("invalid patch: {}", e)))
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

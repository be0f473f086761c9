//! Login state and account lifecycle on top of the `users` collection.
//!
//! Passwords are kept and compared as plaintext and the session mirrored
//! under `currentUser` is trusted as-is. Both are inherited limitations of
//! the portal's local-storage design; anything facing real users needs
//! salted hashing and a server-held session instead.

use crate::error::{AuthError, StoreError};
use crate::model::{normalize_email, Collection, Role, Session, User};
use crate::roles::{self, ViewId};
use crate::storage::KeyValueStorage;
use crate::store::{Record, RecordStore};
use serde_json::{Map, Value};
use tracing::{info, warn};

pub const CURRENT_USER_KEY: &str = "currentUser";

/// Fields a user may never set on their own record through a profile patch.
pub const PROTECTED_FIELDS: &[&str] = &[
    "email",
    "password",
    "role",
    "approved",
    "profileCompleted",
    "createdAt",
];

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub profile: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<Session>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up the session mirrored in storage by an earlier run.
    pub fn restore<S: KeyValueStorage>(store: &RecordStore<S>) -> Self {
        match store.get_json::<Session>(CURRENT_USER_KEY) {
            Ok(current) => Self { current },
            Err(e) => {
                warn!(error = %e, "ignoring unreadable session");
                Self::default()
            }
        }
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn authorize(&self, view: ViewId) -> Result<&Session, AuthError> {
        roles::authorize(self.current.as_ref(), view)
    }

    pub fn require_login(&self) -> Result<&Session, AuthError> {
        self.current.as_ref().ok_or(AuthError::Unauthenticated)
    }

    pub fn login<S: KeyValueStorage>(
        &mut self,
        store: &mut RecordStore<S>,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let user = find_user(store, &email)?.ok_or_else(|| {
            info!(email = %email, "login rejected: unknown email");
            AuthError::InvalidCredentials
        })?;
        if user.password != password {
            info!(email = %email, "login rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.approved {
            info!(email = %email, "login rejected: not approved");
            return Err(AuthError::NotApproved);
        }

        let session = Session::from(&user);
        store.set_json(CURRENT_USER_KEY, &session)?;
        self.current = Some(session.clone());
        info!(email = %email, role = %session.role, "login");
        Ok(session)
    }

    pub fn logout<S: KeyValueStorage>(&mut self, store: &mut RecordStore<S>) -> Result<(), AuthError> {
        store.remove_item(CURRENT_USER_KEY)?;
        if let Some(s) = self.current.take() {
            info!(email = %s.email, "logout");
        }
        Ok(())
    }

    /// Rebuild the session after `email`'s record changed. Clears it when the
    /// record is gone or lost its approval.
    pub fn refresh<S: KeyValueStorage>(
        &mut self,
        store: &mut RecordStore<S>,
        email: &str,
    ) -> Result<(), AuthError> {
        let Some(current_email) = self.current.as_ref().map(|s| s.email.clone()) else {
            return Ok(());
        };
        if current_email != normalize_email(email) {
            return Ok(());
        }
        match find_user(store, &current_email)? {
            Some(user) if user.approved => {
                let session = Session::from(&user);
                store.set_json(CURRENT_USER_KEY, &session)?;
                self.current = Some(session);
            }
            _ => self.logout(store)?,
        }
        Ok(())
    }
}

fn record_email(record: &Record) -> Option<String> {
    record.get("email").and_then(|v| v.as_str()).map(normalize_email)
}

fn is_approved_admin(record: &Record) -> bool {
    record.get("role").and_then(|v| v.as_str()).and_then(Role::parse) == Some(Role::Admin)
        && record.get("approved").and_then(|v| v.as_bool()) == Some(true)
}

/// Look a user up by email against the raw collection. A matching record
/// that does not decode is `CorruptedStore`, never "absent".
pub fn find_user<S: KeyValueStorage>(
    store: &RecordStore<S>,
    email: &str,
) -> Result<Option<User>, StoreError> {
    let email = normalize_email(email);
    let Some(record) = store
        .try_get_collection(Collection::Users)?
        .into_iter()
        .find(|r| record_email(r).as_deref() == Some(email.as_str()))
    else {
        return Ok(None);
    };
    serde_json::from_value(Value::Object(record))
        .map(Some)
        .map_err(|e| StoreError::CorruptedStore {
            collection: Collection::Users.name().to_string(),
            reason: format!("user {}: {}", email, e),
        })
}

/// Refuse a change that would leave no approved admin. `remains_admin` is
/// whether `email` is still an approved admin once the change is applied.
pub fn ensure_admin_remains<S: KeyValueStorage>(
    store: &RecordStore<S>,
    email: &str,
    remains_admin: bool,
) -> Result<(), AuthError> {
    if remains_admin {
        return Ok(());
    }
    let email = normalize_email(email);
    let records = store.try_get_collection(Collection::Users)?;
    let (target, others): (Vec<&Record>, Vec<&Record>) = records
        .iter()
        .filter(|r| is_approved_admin(r))
        .partition(|r| record_email(r).as_deref() == Some(email.as_str()));
    if !target.is_empty() && others.is_empty() {
        return Err(AuthError::InvalidInput(
            "at least one approved admin must remain".into(),
        ));
    }
    Ok(())
}

/// Merge `patch` into `user` via its JSON form, refusing protected fields.
pub fn apply_profile_patch(user: &User, patch: &Map<String, Value>) -> Result<User, AuthError> {
    if let Some(field) = patch.keys().find(|k| PROTECTED_FIELDS.contains(&k.as_str())) {
        return Err(AuthError::InvalidInput(format!(
            "{} cannot be changed through a profile update",
            field
        )));
    }
    let Value::Object(mut obj) = serde_json::to_value(user).map_err(crate::error::StoreError::from)? else {
        return Err(AuthError::InvalidInput("user must encode as an object".into()));
    };
    for (k, v) in patch {
        obj.insert(k.clone(), v.clone());
    }
    serde_json::from_value(Value::Object(obj))
        .map_err(|e| AuthError::InvalidInput(format!("invalid profile field: {}", e)))
}

/// Role-specific fields still missing from `user`'s profile.
pub fn missing_profile_fields(user: &User) -> Vec<&'static str> {
    let filled = |field: &str| match field {
        "college" => user.college.as_deref().is_some_and(|s| !s.trim().is_empty()),
        "course" => user.course.as_deref().is_some_and(|s| !s.trim().is_empty()),
        "qualification" => user
            .qualification
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty()),
        "department" => user
            .department
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty()),
        "subjects" => user.subjects.iter().any(|s| !s.trim().is_empty()),
        other => user.extra.get(other).is_some_and(|v| !v.is_null()),
    };
    user.role
        .required_profile_fields()
        .iter()
        .copied()
        .filter(|f| !filled(*f))
        .collect()
}

pub fn register<S: KeyValueStorage>(
    store: &mut RecordStore<S>,
    new_user: NewUser,
) -> Result<User, AuthError> {
    let email = normalize_email(&new_user.email);
    let name = new_user.name.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidInput("a valid email is required".into()));
    }
    if name.is_empty() {
        return Err(AuthError::InvalidInput("name must not be empty".into()));
    }
    if new_user.password.is_empty() {
        return Err(AuthError::InvalidInput("password must not be empty".into()));
    }

    // Checked against raw records so an undecodable account still owns its email.
    let records = store.try_get_collection(Collection::Users)?;
    if records
        .iter()
        .any(|r| record_email(r).as_deref() == Some(email.as_str()))
    {
        return Err(AuthError::DuplicateEmail(email));
    }
    // Only the first admin is approved on sign-up.
    let approved = new_user.role == Role::Admin && !records.iter().any(is_approved_admin);

    let base = User {
        email: email.clone(),
        name,
        role: new_user.role,
        password: new_user.password,
        approved,
        profile_completed: false,
        phone: None,
        college: None,
        course: None,
        subjects: Vec::new(),
        qualification: None,
        department: None,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
        extra: Map::new(),
    };
    let user = apply_profile_patch(&base, &new_user.profile)?;
    store.save(&user)?;
    info!(email = %email, role = %user.role, approved, "user registered");
    Ok(user)
}

/// Ensure an approved admin exists, creating or promoting `email` if none does.
/// Returns whether anything was written.
pub fn bootstrap_admin<S: KeyValueStorage>(
    store: &mut RecordStore<S>,
    email: &str,
    password: &str,
) -> Result<bool, AuthError> {
    let records = store.try_get_collection(Collection::Users)?;
    if records.iter().any(is_approved_admin) {
        return Ok(false);
    }
    let email = normalize_email(email);
    let user = match find_user(store, &email)? {
        Some(mut existing) => {
            existing.role = Role::Admin;
            existing.approved = true;
            existing.profile_completed = true;
            existing.password = password.to_string();
            existing
        }
        None => User {
            email: email.clone(),
            name: "Administrator".to_string(),
            role: Role::Admin,
            password: password.to_string(),
            approved: true,
            profile_completed: true,
            phone: None,
            college: None,
            course: None,
            subjects: Vec::new(),
            qualification: None,
            department: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            extra: Map::new(),
        },
    };
    store.save(&user)?;
    warn!(email = %email, "bootstrap admin written");
    Ok(true)
}

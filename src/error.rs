use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection {collection} holds malformed data: {reason}")]
    CorruptedStore { collection: String, reason: String },
    #[error("no record in {collection} with {key_field} = {key_value}")]
    NotFound {
        collection: String,
        key_field: String,
        key_value: String,
    },
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::CorruptedStore { .. } => "corrupted_store",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Storage(_) => "storage_failed",
            StoreError::Encode(_) => "storage_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is awaiting approval")]
    NotApproved,
    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("login required")]
    Unauthenticated,
    #[error("role {role} cannot access {view}")]
    Forbidden { role: String, view: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::NotApproved => "not_approved",
            AuthError::DuplicateEmail(_) => "duplicate_email",
            AuthError::InvalidInput(_) => "bad_params",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::Store(e) => e.code(),
        }
    }
}

use crate::config::BootstrapAdmin;
use crate::db;
use crate::session::{self, SessionState};
use crate::storage::SqliteStorage;
use crate::store::RecordStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<RecordStore<SqliteStorage>>,
    pub session: SessionState,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppState {
    pub fn new(bootstrap_admin: Option<BootstrapAdmin>) -> Self {
        Self {
            workspace: None,
            store: None,
            session: SessionState::new(),
            bootstrap_admin,
        }
    }

    /// Open (or create) the workspace database and pick up its session.
    pub fn select_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        let mut store = RecordStore::new(SqliteStorage::new(conn));
        if let Some(admin) = self.bootstrap_admin.as_ref() {
            session::bootstrap_admin(&mut store, &admin.email, &admin.password)?;
        }
        self.session = SessionState::restore(&store);
        self.store = Some(store);
        self.workspace = Some(path.to_path_buf());
        info!(
            workspace = %path.to_string_lossy(),
            session = self.session.current_session().map(|s| s.email.as_str()).unwrap_or("-"),
            "workspace opened"
        );
        Ok(())
    }
}

use crate::error::AuthError;
use crate::model::{Role, Session};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewId {
    Projects,
    Users,
    Fees,
    Report,
    Attendance,
    Profile,
    Crm,
}

impl ViewId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Users => "users",
            Self::Fees => "fees",
            Self::Report => "report",
            Self::Attendance => "attendance",
            Self::Profile => "profile",
            Self::Crm => "crm",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn reachable_views(role: Role) -> &'static [ViewId] {
    match role {
        Role::Admin => &[ViewId::Projects, ViewId::Users, ViewId::Fees, ViewId::Report],
        Role::Instructor => &[ViewId::Projects, ViewId::Attendance, ViewId::Report],
        Role::Student => &[ViewId::Projects, ViewId::Profile, ViewId::Attendance],
        Role::Accounting => &[ViewId::Fees, ViewId::Report, ViewId::Profile],
        Role::Sales => &[ViewId::Crm, ViewId::Report, ViewId::Profile],
    }
}

pub fn can_access(role: Role, view: ViewId) -> bool {
    reachable_views(role).contains(&view)
}

/// Gate for data operations: a session must exist and its role must reach `view`.
pub fn authorize(session: Option<&Session>, view: ViewId) -> Result<&Session, AuthError> {
    let session = session.ok_or(AuthError::Unauthenticated)?;
    if !can_access(session.role, view) {
        return Err(AuthError::Forbidden {
            role: session.role.to_string(),
            view: view.to_string(),
        });
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn session(role: Role) -> Session {
        Session {
            email: "u@x.com".into(),
            name: "U".into(),
            role,
            approved: true,
            profile_completed: true,
            phone: None,
            college: None,
            course: None,
            subjects: vec![],
            qualification: None,
            department: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn table_matches_role_views() {
        assert!(can_access(Role::Admin, ViewId::Users));
        assert!(can_access(Role::Admin, ViewId::Fees));
        assert!(!can_access(Role::Admin, ViewId::Attendance));
        assert!(can_access(Role::Instructor, ViewId::Attendance));
        assert!(!can_access(Role::Instructor, ViewId::Users));
        assert!(can_access(Role::Student, ViewId::Profile));
        assert!(!can_access(Role::Student, ViewId::Fees));
        assert!(can_access(Role::Accounting, ViewId::Fees));
        assert!(!can_access(Role::Accounting, ViewId::Crm));
        assert!(can_access(Role::Sales, ViewId::Crm));
        assert!(!can_access(Role::Sales, ViewId::Projects));
    }

    #[test]
    fn accounting_and_sales_sets_differ() {
        assert_ne!(
            reachable_views(Role::Accounting),
            reachable_views(Role::Sales)
        );
    }

    #[test]
    fn authorize_requires_session_and_membership() {
        assert!(matches!(
            authorize(None, ViewId::Report),
            Err(AuthError::Unauthenticated)
        ));
        let s = session(Role::Student);
        assert!(matches!(
            authorize(Some(&s), ViewId::Users),
            Err(AuthError::Forbidden { .. })
        ));
        assert_eq!(
            authorize(Some(&s), ViewId::Projects).map(|s| s.role).ok(),
            Some(Role::Student)
        );
    }
}

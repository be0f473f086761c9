//! Typed records, roles and collection names shared by the store and the handlers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
    Accounting,
    Sales,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Instructor,
        Role::Student,
        Role::Accounting,
        Role::Sales,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "instructor" => Some(Self::Instructor),
            "student" => Some(Self::Student),
            "accounting" => Some(Self::Accounting),
            "sales" => Some(Self::Sales),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Instructor => "instructor",
            Self::Student => "student",
            Self::Accounting => "accounting",
            Self::Sales => "sales",
        }
    }

    /// Profile fields that must be filled before a profile counts as complete.
    pub fn required_profile_fields(self) -> &'static [&'static str] {
        match self {
            Self::Admin => &[],
            Self::Instructor => &["qualification", "subjects"],
            Self::Student => &["college", "course"],
            Self::Accounting | Self::Sales => &["department"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Projects,
    Attendance,
    Fees,
    CrmLeads,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Projects,
        Collection::Attendance,
        Collection::Fees,
        Collection::CrmLeads,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == s)
    }

    /// Storage key the collection blob lives under.
    pub fn name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::Attendance => "attendance",
            Self::Fees => "fees",
            Self::CrmLeads => "crm_leads",
        }
    }

    pub fn key_field(self) -> &'static str {
        match self {
            Self::Users => "email",
            Self::Projects => "id",
            Self::Attendance => "date",
            Self::Fees => "studentEmail",
            Self::CrmLeads => "id",
        }
    }
}

/// A typed record living in one collection, keyed by a single string field.
pub trait Entity: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    /// Stored and compared as plaintext. Not suitable for real deployments.
    pub password: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub profile_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(
        default,
        deserialize_with = "subjects_from_any",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        &self.email
    }
}

/// The public part of a user: everything except the password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub profile_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(
        default,
        deserialize_with = "subjects_from_any",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&User> for Session {
    fn from(u: &User) -> Self {
        let mut extra = u.extra.clone();
        extra.remove("password");
        Session {
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            approved: u.approved,
            profile_completed: u.profile_completed,
            phone: u.phone.clone(),
            college: u.college.clone(),
            course: u.course.clone(),
            subjects: u.subjects.clone(),
            qualification: u.qualification.clone(),
            department: u.department.clone(),
            extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub student_email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub email: String,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSession {
    /// `YYYY-MM-DD`; one session per date.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_by: Option<String>,
    #[serde(default)]
    pub records: Vec<AttendanceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttendanceSession {
    pub fn entry_for(&self, email: &str) -> Option<&AttendanceEntry> {
        self.records.iter().find(|e| e.email == email)
    }
}

impl Entity for AttendanceSession {
    const COLLECTION: Collection = Collection::Attendance;

    fn key(&self) -> &str {
        &self.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: f64,
    pub paid_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    pub student_email: String,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payments: Vec<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeeRecord {
    /// Always derived; never stored alongside the record.
    pub fn pending_amount(&self) -> f64 {
        (self.total_amount - self.paid_amount).max(0.0)
    }
}

impl Entity for FeeRecord {
    const COLLECTION: Collection = Collection::Fees;

    fn key(&self) -> &str {
        &self.student_email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeadStatus {
    New,
    FollowUp,
    Contacted,
    Converted,
    Lost,
    Other(String),
}

impl LeadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::FollowUp => "follow-up",
            Self::Contacted => "contacted",
            Self::Converted => "converted",
            Self::Lost => "lost",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for LeadStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "follow-up" | "followup" | "follow_up" => Self::FollowUp,
            "contacted" => Self::Contacted,
            "converted" => Self::Converted,
            "lost" => Self::Lost,
            _ => Self::Other(s),
        }
    }
}

impl From<LeadStatus> for String {
    fn from(s: LeadStatus) -> Self {
        s.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for Lead {
    const COLLECTION: Collection = Collection::CrmLeads;

    fn key(&self) -> &str {
        &self.id
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Accepts `subjects` as a list, a comma-separated string, or null.
fn subjects_from_any<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    let subjects = match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::List(items)) => items,
        Some(Raw::Text(text)) => text.split(',').map(str::to_string).collect(),
    };
    Ok(subjects
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

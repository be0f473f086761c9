pub mod attendance;
pub mod auth;
pub mod core;
pub mod crm;
pub mod fees;
pub mod maintenance;
pub mod profile;
pub mod projects;
pub mod reports;
pub mod users;

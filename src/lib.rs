pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod ipc;
pub mod model;
pub mod roles;
pub mod session;
pub mod stats;
pub mod storage;
pub mod store;

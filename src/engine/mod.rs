// Taskgate Engine - Core module structure
pub mod config;
pub mod database;
pub mod migrations;
pub mod error;
pub mod rbac;
pub mod identity;
pub mod session;
pub mod todos;
pub mod seed;
pub mod api;
pub mod telemetry;
pub mod cli;

pub use config::Config;
pub use database::Database;
pub use error::{AuthError, AuthResult};

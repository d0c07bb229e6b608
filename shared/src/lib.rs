pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod models;
pub mod report;
pub mod templates;

pub use config::{ApiConfig, Config, ScoringConfig};
pub use database::get_db_connection;
pub use error::SignalError;
pub use models::*;
pub use report::SignalSummary;

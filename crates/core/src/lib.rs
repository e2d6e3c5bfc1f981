//! Retention data model, error taxonomy, and configuration.
//!
//! Shared by the rule engine and the execution engine. Nothing in here
//! performs I/O except the env-driven [`Config`] loader.

pub mod artifact;
pub mod config;
pub mod error;
pub mod execution;
pub mod history;
pub mod policy;
pub mod query;

pub use artifact::*;
pub use config::Config;
pub use error::*;
pub use execution::*;
pub use history::*;
pub use policy::*;
pub use query::Query;

/// Timestamp type used on every record.
pub type Time = chrono::DateTime<chrono::Utc>;

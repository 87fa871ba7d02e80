//! Storage module for the record store and configuration.

pub mod config;
pub mod database;
pub mod schema;
pub mod types;

pub use config::{AppConfig, ConfigError};
pub use database::{Database, DatabaseError};
pub use types::{NewSprint, Route, Sprint, Tournament, User, UserUpdate};

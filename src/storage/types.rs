//! Record types stored by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// The password field holds whatever opaque credential the embedding web
/// layer hashes and compares; this core never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address, unique across users
    pub email: String,
    /// Opaque credential
    #[serde(skip_serializing)]
    pub password: String,
}

/// A (start, finish) traversal challenge.
///
/// Routes are write-once: created on first use of a given endpoint pair and
/// never updated through this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Unique identifier
    pub id: i64,
    /// Starting point
    pub start: String,
    /// Finishing point
    pub finish: String,
    /// User who first registered this route
    pub creator_id: i64,
}

/// A single timed attempt on a route.
///
/// Sprints are append-only. `duration_ms` is only meaningful when `success`
/// is set; failed attempts never appear in ranking queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    /// Unique identifier
    pub id: i64,
    /// User who ran the attempt
    pub user_id: i64,
    /// Route the attempt traversed
    pub route_id: i64,
    /// Tournament the attempt was logged under, if any
    pub tournament_id: Option<i64>,
    /// Ordered intermediate waypoints
    pub path: Vec<String>,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds
    pub duration_ms: i64,
    /// Whether the finish was reached
    pub success: bool,
}

impl Sprint {
    /// Number of steps taken, including start and finish.
    pub fn steps(&self) -> usize {
        self.path.len()
    }
}

/// A not-yet-stored attempt, as submitted by the recording collaborator.
#[derive(Debug, Clone)]
pub struct NewSprint {
    pub user_id: i64,
    pub route_id: i64,
    pub tournament_id: Option<i64>,
    pub path: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
}

/// A password-joinable, time-boxed grouping of routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    /// Unique identifier
    pub id: i64,
    /// Scoring window start
    pub starts_at: DateTime<Utc>,
    /// Scoring window end
    pub ends_at: DateTime<Utc>,
    /// Join secret; any holder may join as participant
    #[serde(skip_serializing)]
    pub join_secret: String,
    /// Private tournaments are hidden from open listings
    pub private: bool,
}

/// User record fields accepted by a settings update.
///
/// `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

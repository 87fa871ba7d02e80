//! sprintrank - rating and leaderboard engine for timed route sprints.
//!
//! Tracks timed attempts ("sprints") by users traversing named routes,
//! groups attempts into password-joinable tournaments, and answers who holds
//! the best time on a route and who leads a tournament's point standings.
//! The embedding web layer handles transport, rendering and sessions; this
//! crate owns the aggregation logic and the authorization-gated mutation
//! protocol over tournament relations.

pub mod leaderboards;
pub mod storage;
pub mod tournaments;

// Re-export commonly used types
pub use leaderboards::rankings::LeaderboardService;
pub use leaderboards::standings::StandingsService;
pub use storage::config::AppConfig;
pub use storage::database::{Database, DatabaseError};
pub use tournaments::gate::RelationGate;
pub use tournaments::service::TournamentService;

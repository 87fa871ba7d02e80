//! Leaderboards module
//!
//! Best-attempt selection, per-route rankings and point standings.

pub mod rankings;
pub mod standings;

// Re-export commonly used types
pub use rankings::{
    format_duration_ms, BestAttempt, LeaderboardEntry, LeaderboardError, LeaderboardService,
};
pub use standings::{Standing, StandingsService};

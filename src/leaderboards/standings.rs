//! Tournament and global point standings.
//!
//! Each route in scope awards exactly one point: to the user holding the
//! fastest successful attempt on it. Standings are the per-user point sums
//! ordered highest first.

use std::collections::HashMap;
use std::sync::Arc;

use crate::leaderboards::rankings::{query_best_attempts, LeaderboardError};
use crate::storage::Database;

/// One row of a points table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub user_name: String,
    pub points: u32,
}

/// Standings service.
pub struct StandingsService {
    db: Arc<Database>,
}

impl StandingsService {
    /// Create a new standings service.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Point standings for a tournament, highest points first.
    ///
    /// Only sprints logged under the tournament count, and only routes
    /// associated with it award points. Routes without a single successful
    /// tournament-scoped attempt award nothing.
    pub fn tournament_standings(
        &self,
        tournament_id: i64,
    ) -> Result<Vec<Standing>, LeaderboardError> {
        let route_ids: Vec<i64> = self
            .db
            .tournament_routes(tournament_id)?
            .into_iter()
            .map(|route| route.id)
            .collect();

        self.score_routes(&route_ids, Some(tournament_id))
    }

    /// Site-wide point standings over every route, highest points first.
    pub fn global_standings(&self) -> Result<Vec<Standing>, LeaderboardError> {
        let route_ids = self.db.list_route_ids()?;
        self.score_routes(&route_ids, None)
    }

    fn score_routes(
        &self,
        route_ids: &[i64],
        tournament_id: Option<i64>,
    ) -> Result<Vec<Standing>, LeaderboardError> {
        let mut points: HashMap<i64, u32> = HashMap::new();

        for &route_id in route_ids {
            let attempts =
                query_best_attempts(self.db.connection(), route_id, tournament_id)?;

            // Ascending by duration; the winner is the first row.
            let Some(winner) = attempts.first() else {
                continue;
            };
            *points.entry(winner.user_id).or_insert(0) += 1;
        }

        let mut standings = Vec::with_capacity(points.len());
        for (user_id, pts) in points {
            let user_name = self.resolve_name(user_id);
            standings.push(Standing {
                user_name,
                points: pts,
            });
        }

        // Highest points first; name tie-break keeps the order deterministic.
        standings.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });

        Ok(standings)
    }

    /// Resolve a user's display name, falling back to a placeholder.
    ///
    /// A missing or unreadable user must never abort scoring.
    fn resolve_name(&self, user_id: i64) -> String {
        match self.db.get_user(user_id) {
            Ok(Some(user)) => user.name,
            Ok(None) => {
                tracing::warn!("Scoring points for unknown user {}", user_id);
                format!("User #{}", user_id)
            }
            Err(e) => {
                tracing::warn!("Name lookup failed for user {}: {}", user_id, e);
                format!("User #{}", user_id)
            }
        }
    }
}

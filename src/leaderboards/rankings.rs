//! Best-attempt selection and per-route leaderboards.
//!
//! A best attempt is a user's fastest *successful* sprint on a route,
//! optionally scoped to a tournament. Failed sprints never rank.

use std::sync::Arc;

use rusqlite::{params, Connection};

use crate::storage::{Database, DatabaseError};

/// A user's fastest successful sprint on a route.
#[derive(Debug, Clone)]
pub struct BestAttempt {
    pub user_id: i64,
    /// Minimum successful duration for this user in scope
    pub duration_ms: i64,
    /// Id of a sprint achieving that minimum
    pub sprint_id: i64,
    /// Waypoints of that sprint
    pub path: Vec<String>,
}

impl BestAttempt {
    /// Number of steps in the winning path.
    pub fn steps(&self) -> usize {
        self.path.len()
    }
}

/// One row of a route leaderboard.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    /// 1-based placement
    pub rank: u32,
    pub user_id: i64,
    pub duration_ms: i64,
    pub sprint_id: i64,
    pub steps: usize,
}

/// Leaderboard service.
pub struct LeaderboardService {
    db: Arc<Database>,
}

impl LeaderboardService {
    /// Create a new leaderboard service.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get each user's best successful attempt on a route, fastest first.
    ///
    /// With a tournament id, only sprints logged under that tournament count.
    /// A route with no successful sprints in scope yields an empty list,
    /// never an error.
    pub fn best_attempts(
        &self,
        route_id: i64,
        tournament_id: Option<i64>,
    ) -> Result<Vec<BestAttempt>, LeaderboardError> {
        query_best_attempts(self.db.connection(), route_id, tournament_id)
    }

    /// Get the unscoped leaderboard for a route with 1-based ranks.
    pub fn route_leaderboard(
        &self,
        route_id: i64,
    ) -> Result<Vec<LeaderboardEntry>, LeaderboardError> {
        let attempts = self.best_attempts(route_id, None)?;

        let mut entries = Vec::with_capacity(attempts.len());
        let mut rank = 0u32;
        for attempt in attempts {
            rank += 1;
            entries.push(LeaderboardEntry {
                rank,
                user_id: attempt.user_id,
                duration_ms: attempt.duration_ms,
                sprint_id: attempt.sprint_id,
                steps: attempt.path.len(),
            });
        }

        Ok(entries)
    }

    /// Get a user's 1-based placement on a route.
    ///
    /// `None` when the user has no successful sprint on the route.
    pub fn placement(&self, route_id: i64, user_id: i64) -> Result<Option<u32>, LeaderboardError> {
        let entries = self.route_leaderboard(route_id)?;
        Ok(entries
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.rank))
    }
}

/// Shared best-attempt query, also used by the standings scorer.
///
/// SQLite's bare-column resolution on `MIN(duration_ms)` returns the id and
/// path of a row achieving the minimum; ties at the same duration pick one
/// such sprint deterministically.
pub(crate) fn query_best_attempts(
    conn: &Connection,
    route_id: i64,
    tournament_id: Option<i64>,
) -> Result<Vec<BestAttempt>, LeaderboardError> {
    let sql = match tournament_id {
        Some(_) => {
            "SELECT user_id, MIN(duration_ms) AS best_ms, id, path_json
             FROM sprints
             WHERE success = 1 AND route_id = ?1 AND tournament_id = ?2
             GROUP BY user_id
             ORDER BY best_ms ASC, user_id ASC"
        }
        None => {
            "SELECT user_id, MIN(duration_ms) AS best_ms, id, path_json
             FROM sprints
             WHERE success = 1 AND route_id = ?1
             GROUP BY user_id
             ORDER BY best_ms ASC, user_id ASC"
        }
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| LeaderboardError::QueryFailed(e.to_string()))?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(i64, i64, i64, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    };

    let mut attempts = Vec::new();
    let mut push_rows = |rows: rusqlite::MappedRows<'_, _>| -> Result<(), LeaderboardError> {
        for row in rows {
            let (user_id, duration_ms, sprint_id, path_json): (i64, i64, i64, String) =
                row.map_err(|e| LeaderboardError::QueryFailed(e.to_string()))?;
            let path: Vec<String> = serde_json::from_str(&path_json)
                .map_err(|e| LeaderboardError::InvalidPath(e.to_string()))?;
            attempts.push(BestAttempt {
                user_id,
                duration_ms,
                sprint_id,
                path,
            });
        }
        Ok(())
    };

    match tournament_id {
        Some(tid) => {
            let rows = stmt
                .query_map(params![route_id, tid], map_row)
                .map_err(|e| LeaderboardError::QueryFailed(e.to_string()))?;
            push_rows(rows)?;
        }
        None => {
            let rows = stmt
                .query_map(params![route_id], map_row)
                .map_err(|e| LeaderboardError::QueryFailed(e.to_string()))?;
            push_rows(rows)?;
        }
    }

    Ok(attempts)
}

/// Format a millisecond duration the way leaderboards display it.
pub fn format_duration_ms(duration_ms: i64) -> String {
    let total_s = duration_ms / 1000;
    let ms = duration_ms % 1000;
    let min = total_s / 60;
    let s = total_s % 60;
    format!("{} min, {} s, {} ms", min, s, ms)
}

/// Leaderboard errors.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid sprint path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewSprint;
    use chrono::Utc;

    fn seed_db() -> (Arc<Database>, i64, i64, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_user("A", "a@example.com", "x").unwrap();
        let b = db.insert_user("B", "b@example.com", "x").unwrap();
        let c = db.insert_user("C", "c@example.com", "x").unwrap();
        let route = db.get_or_create_route("Start", "Finish", a).unwrap().id;
        (Arc::new(db), a, b, c, route)
    }

    fn sprint(user: i64, route: i64, duration_ms: i64, success: bool) -> NewSprint {
        NewSprint {
            user_id: user,
            route_id: route,
            tournament_id: None,
            path: vec!["Start".into(), "Finish".into()],
            started_at: Utc::now(),
            duration_ms,
            success,
        }
    }

    #[test]
    fn test_best_attempts_orders_and_excludes_failures() {
        let (db, a, b, c, route) = seed_db();
        db.insert_sprint(&sprint(a, route, 5000, true)).unwrap();
        db.insert_sprint(&sprint(b, route, 4000, true)).unwrap();
        db.insert_sprint(&sprint(c, route, 9000, false)).unwrap();

        let service = LeaderboardService::new(db);
        let attempts = service.best_attempts(route, None).unwrap();

        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].user_id, b);
        assert_eq!(attempts[0].duration_ms, 4000);
        assert_eq!(attempts[1].user_id, a);
        assert_eq!(attempts[1].duration_ms, 5000);
    }

    #[test]
    fn test_best_attempts_one_entry_per_user_at_true_minimum() {
        let (db, a, _, _, route) = seed_db();
        db.insert_sprint(&sprint(a, route, 7000, true)).unwrap();
        db.insert_sprint(&sprint(a, route, 3000, true)).unwrap();
        db.insert_sprint(&sprint(a, route, 5000, true)).unwrap();
        // Faster but failed, must not count
        db.insert_sprint(&sprint(a, route, 1000, false)).unwrap();

        let service = LeaderboardService::new(db);
        let attempts = service.best_attempts(route, None).unwrap();

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].duration_ms, 3000);
    }

    #[test]
    fn test_best_attempts_empty_route_is_not_an_error() {
        let (db, _, _, _, route) = seed_db();
        let service = LeaderboardService::new(db);
        assert!(service.best_attempts(route, None).unwrap().is_empty());
    }

    #[test]
    fn test_route_leaderboard_ranks_and_placement() {
        let (db, a, b, c, route) = seed_db();
        db.insert_sprint(&sprint(a, route, 5000, true)).unwrap();
        db.insert_sprint(&sprint(b, route, 4000, true)).unwrap();
        db.insert_sprint(&sprint(c, route, 9000, false)).unwrap();

        let service = LeaderboardService::new(db);
        let board = service.route_leaderboard(route).unwrap();

        assert_eq!(board.len(), 2);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].user_id, b);
        assert_eq!(board[1].rank, 2);
        assert_eq!(board[1].user_id, a);

        assert_eq!(service.placement(route, b).unwrap(), Some(1));
        assert_eq!(service.placement(route, a).unwrap(), Some(2));
        assert_eq!(service.placement(route, c).unwrap(), None);
    }

    #[test]
    fn test_tournament_scope_filters_attempts() {
        let (db, a, b, _, route) = seed_db();
        let now = Utc::now();
        db.connection()
            .execute(
                "INSERT INTO tournaments (starts_at, ends_at, join_secret, private)
                 VALUES (?1, ?2, 's', 1)",
                params![now.to_rfc3339(), now.to_rfc3339()],
            )
            .unwrap();
        let tid = db.connection().last_insert_rowid();

        let mut scoped = sprint(a, route, 6000, true);
        scoped.tournament_id = Some(tid);
        db.insert_sprint(&scoped).unwrap();
        // Faster, but outside the tournament
        db.insert_sprint(&sprint(b, route, 2000, true)).unwrap();

        let service = LeaderboardService::new(db);
        let attempts = service.best_attempts(route, Some(tid)).unwrap();

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].user_id, a);
        assert_eq!(attempts[0].duration_ms, 6000);
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0 min, 0 s, 0 ms");
        assert_eq!(format_duration_ms(4500), "0 min, 4 s, 500 ms");
        assert_eq!(format_duration_ms(125_250), "2 min, 5 s, 250 ms");
    }
}

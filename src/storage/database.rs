//! Record store operations using rusqlite.
//!
//! The `Database` wrapper owns the connection and exposes the point and set
//! reads/writes the rating engine and mutation gate consume. Relation writes
//! that require authorization live in `tournaments::gate`, which scopes them
//! in transactions obtained from [`Database::begin`].

use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};
use crate::storage::types::{NewSprint, Route, Sprint, Tournament, User, UserUpdate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Result as SqliteResult};
use std::path::PathBuf;
use thiserror::Error;

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &PathBuf) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .pragma_update(None, "foreign_keys", true)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.schema_version()?;
        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction on the shared connection.
    ///
    /// Callers must not nest transactions; the gate and tournament services
    /// each hold one at a time for the span of a single mutation.
    pub fn begin(&self) -> Result<rusqlite::Transaction<'_>, DatabaseError> {
        self.conn
            .unchecked_transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    // ========== User operations ==========

    /// Insert a new user, returning the generated id.
    pub fn insert_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<i64, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO users (name, email, password) VALUES (?1, ?2, ?3)",
                params![name, email, password],
            )
            .map_err(map_sqlite_error)?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, name, email, password FROM users WHERE id = ?1",
            params![id],
            map_user_row,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get a user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, name, email, password FROM users WHERE email = ?1",
            params![email],
            map_user_row,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Apply a settings update to a user. Unset fields keep their value.
    ///
    /// Read and write share one transaction, so the merged row is the one
    /// the update was computed from.
    pub fn update_user(&self, id: i64, update: &UserUpdate) -> Result<(), DatabaseError> {
        let tx = self.begin()?;

        let current = match tx.query_row(
            "SELECT id, name, email, password FROM users WHERE id = ?1",
            params![id],
            map_user_row,
        ) {
            Ok(user) => user,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(DatabaseError::NotFound(format!("User {}", id)));
            }
            Err(e) => return Err(DatabaseError::QueryFailed(e.to_string())),
        };

        let name = update.name.as_deref().unwrap_or(&current.name);
        let email = update.email.as_deref().unwrap_or(&current.email);
        let password = update.password.as_deref().unwrap_or(&current.password);

        tx.execute(
            "UPDATE users SET name = ?2, email = ?3, password = ?4 WHERE id = ?1",
            params![id, name, email, password],
        )
        .map_err(map_sqlite_error)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    // ========== Route operations ==========

    /// Insert a new route, returning the generated id.
    ///
    /// Fails with [`DatabaseError::ConstraintViolation`] if the
    /// (start, finish) pair already exists; callers that want idempotence use
    /// [`Database::get_or_create_route`].
    pub fn insert_route(
        &self,
        start: &str,
        finish: &str,
        creator_id: i64,
    ) -> Result<i64, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO routes (start, finish, creator_id) VALUES (?1, ?2, ?3)",
                params![start, finish, creator_id],
            )
            .map_err(map_sqlite_error)?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get a route by id.
    pub fn get_route(&self, id: i64) -> Result<Option<Route>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, start, finish, creator_id FROM routes WHERE id = ?1",
            params![id],
            map_route_row,
        );

        match result {
            Ok(route) => Ok(Some(route)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get a route by its (start, finish) endpoints.
    pub fn get_route_by_endpoints(
        &self,
        start: &str,
        finish: &str,
    ) -> Result<Option<Route>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, start, finish, creator_id FROM routes WHERE start = ?1 AND finish = ?2",
            params![start, finish],
            map_route_row,
        );

        match result {
            Ok(route) => Ok(Some(route)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get the route for the given endpoints, creating it on first use.
    ///
    /// A repeated (start, finish) pair resolves to the existing row rather
    /// than surfacing the uniqueness conflict.
    pub fn get_or_create_route(
        &self,
        start: &str,
        finish: &str,
        creator_id: i64,
    ) -> Result<Route, DatabaseError> {
        if let Some(route) = self.get_route_by_endpoints(start, finish)? {
            return Ok(route);
        }

        match self.insert_route(start, finish, creator_id) {
            Ok(id) => Ok(Route {
                id,
                start: start.to_string(),
                finish: finish.to_string(),
                creator_id,
            }),
            // Lost a race with a concurrent insert of the same pair
            Err(DatabaseError::ConstraintViolation(_)) => self
                .get_route_by_endpoints(start, finish)?
                .ok_or_else(|| DatabaseError::NotFound(format!("Route {start} -> {finish}"))),
            Err(e) => Err(e),
        }
    }

    /// Get all route ids.
    pub fn list_route_ids(&self) -> Result<Vec<i64>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM routes ORDER BY id")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(ids)
    }

    /// Get the most-attempted routes, busiest first.
    pub fn popular_routes(&self, limit: u32) -> Result<Vec<Route>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.start, r.finish, r.creator_id
                 FROM routes r LEFT JOIN sprints s ON s.route_id = r.id
                 GROUP BY r.id
                 ORDER BY COUNT(s.id) DESC, r.id ASC
                 LIMIT ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], map_route_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut routes = Vec::new();
        for row in rows {
            routes.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(routes)
    }

    // ========== Sprint operations ==========

    /// Insert a completed or abandoned attempt, returning the generated id.
    pub fn insert_sprint(&self, sprint: &NewSprint) -> Result<i64, DatabaseError> {
        let path_json = serde_json::to_string(&sprint.path)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO sprints (user_id, route_id, tournament_id, path_json,
                 started_at, duration_ms, success)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sprint.user_id,
                    sprint.route_id,
                    sprint.tournament_id,
                    path_json,
                    sprint.started_at.to_rfc3339(),
                    sprint.duration_ms,
                    sprint.success as i32,
                ],
            )
            .map_err(map_sqlite_error)?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get a sprint by id.
    pub fn get_sprint(&self, id: i64) -> Result<Option<Sprint>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, user_id, route_id, tournament_id, path_json, started_at,
             duration_ms, success FROM sprints WHERE id = ?1",
            params![id],
            map_sprint_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_sprint()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get a user's full attempt history, newest first.
    pub fn user_history(&self, user_id: i64) -> Result<Vec<Sprint>, DatabaseError> {
        self.sprint_query(
            "SELECT id, user_id, route_id, tournament_id, path_json, started_at,
             duration_ms, success FROM sprints WHERE user_id = ?1
             ORDER BY started_at DESC",
            params![user_id],
        )
    }

    /// Get a user's attempt history on one route, newest first.
    pub fn user_route_history(
        &self,
        user_id: i64,
        route_id: i64,
    ) -> Result<Vec<Sprint>, DatabaseError> {
        self.sprint_query(
            "SELECT id, user_id, route_id, tournament_id, path_json, started_at,
             duration_ms, success FROM sprints WHERE user_id = ?1 AND route_id = ?2
             ORDER BY started_at DESC",
            params![user_id, route_id],
        )
    }

    fn sprint_query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Sprint>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params, map_sprint_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut sprints = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            sprints.push(row.into_sprint()?);
        }

        Ok(sprints)
    }

    // ========== Tournament operations ==========

    /// Get a tournament by id.
    pub fn get_tournament(&self, id: i64) -> Result<Option<Tournament>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id, starts_at, ends_at, join_secret, private
             FROM tournaments WHERE id = ?1",
            params![id],
            map_tournament_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_tournament()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Get public tournaments whose scoring window has not ended.
    pub fn open_tournaments(&self, now: DateTime<Utc>) -> Result<Vec<Tournament>, DatabaseError> {
        self.tournament_query(
            "SELECT id, starts_at, ends_at, join_secret, private
             FROM tournaments WHERE private = 0 AND ends_at > ?1
             ORDER BY starts_at",
            params![now.to_rfc3339()],
        )
    }

    /// Get tournaments in which the user participates.
    pub fn user_tournaments(&self, user_id: i64) -> Result<Vec<Tournament>, DatabaseError> {
        self.tournament_query(
            "SELECT id, starts_at, ends_at, join_secret, private
             FROM tournaments WHERE id IN (
                 SELECT tournament_id FROM tournament_participants WHERE user_id = ?1
             ) ORDER BY starts_at",
            params![user_id],
        )
    }

    /// Get tournaments the user is a creator of.
    pub fn creator_tournaments(&self, user_id: i64) -> Result<Vec<Tournament>, DatabaseError> {
        self.tournament_query(
            "SELECT id, starts_at, ends_at, join_secret, private
             FROM tournaments WHERE id IN (
                 SELECT tournament_id FROM tournament_creators WHERE user_id = ?1
             ) ORDER BY starts_at",
            params![user_id],
        )
    }

    fn tournament_query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Tournament>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params, map_tournament_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut tournaments = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            tournaments.push(row.into_tournament()?);
        }

        Ok(tournaments)
    }

    /// Get the routes associated with a tournament.
    pub fn tournament_routes(&self, tournament_id: i64) -> Result<Vec<Route>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, start, finish, creator_id FROM routes WHERE id IN (
                     SELECT route_id FROM tournament_routes WHERE tournament_id = ?1
                 ) ORDER BY id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![tournament_id], map_route_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut routes = Vec::new();
        for row in rows {
            routes.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(routes)
    }

    /// Get the participants of a tournament.
    pub fn participants(&self, tournament_id: i64) -> Result<Vec<User>, DatabaseError> {
        self.user_set_query(
            "SELECT id, name, email, password FROM users WHERE id IN (
                 SELECT user_id FROM tournament_participants WHERE tournament_id = ?1
             ) ORDER BY name",
            tournament_id,
        )
    }

    /// Get the creators of a tournament.
    pub fn creators(&self, tournament_id: i64) -> Result<Vec<User>, DatabaseError> {
        self.user_set_query(
            "SELECT id, name, email, password FROM users WHERE id IN (
                 SELECT user_id FROM tournament_creators WHERE tournament_id = ?1
             ) ORDER BY name",
            tournament_id,
        )
    }

    fn user_set_query(&self, sql: &str, tournament_id: i64) -> Result<Vec<User>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![tournament_id], map_user_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(users)
    }

    // ========== Existence checks ==========

    /// Is the user currently listed as a creator of the tournament?
    pub fn is_creator(&self, tournament_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tournament_creators
                 WHERE tournament_id = ?1 AND user_id = ?2",
                params![tournament_id, user_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count > 0)
    }

    /// Is the user currently a participant of the tournament?
    pub fn is_participant(&self, tournament_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tournament_participants
                 WHERE tournament_id = ?1 AND user_id = ?2",
                params![tournament_id, user_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count > 0)
    }

    /// Resolve the tournament whose join secret matches, if any.
    pub fn find_tournament_by_secret(&self, secret: &str) -> Result<Option<i64>, DatabaseError> {
        let result = self.conn.query_row(
            "SELECT id FROM tournaments WHERE join_secret = ?1",
            params![secret],
            |row| row.get(0),
        );

        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }
}

fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
    })
}

fn map_route_row(row: &rusqlite::Row) -> rusqlite::Result<Route> {
    Ok(Route {
        id: row.get(0)?,
        start: row.get(1)?,
        finish: row.get(2)?,
        creator_id: row.get(3)?,
    })
}

fn map_sprint_row(row: &rusqlite::Row) -> rusqlite::Result<SprintRow> {
    Ok(SprintRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        route_id: row.get(2)?,
        tournament_id: row.get(3)?,
        path_json: row.get(4)?,
        started_at: row.get(5)?,
        duration_ms: row.get(6)?,
        success: row.get(7)?,
    })
}

fn map_tournament_row(row: &rusqlite::Row) -> rusqlite::Result<TournamentRow> {
    Ok(TournamentRow {
        id: row.get(0)?,
        starts_at: row.get(1)?,
        ends_at: row.get(2)?,
        join_secret: row.get(3)?,
        private: row.get(4)?,
    })
}

/// Map a rusqlite error, surfacing constraint violations distinctly.
fn map_sqlite_error(e: rusqlite::Error) -> DatabaseError {
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(e.to_string())
        }
        _ => DatabaseError::QueryFailed(e.to_string()),
    }
}

/// Intermediate struct for reading sprint rows from the database.
struct SprintRow {
    id: i64,
    user_id: i64,
    route_id: i64,
    tournament_id: Option<i64>,
    path_json: String,
    started_at: String,
    duration_ms: i64,
    success: i32,
}

impl SprintRow {
    fn into_sprint(self) -> Result<Sprint, DatabaseError> {
        let path: Vec<String> = serde_json::from_str(&self.path_json).map_err(|e| {
            DatabaseError::DeserializationError(format!("Invalid path JSON: {}", e))
        })?;

        let started_at = DateTime::parse_from_rfc3339(&self.started_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid start date: {}", e))
            })?;

        Ok(Sprint {
            id: self.id,
            user_id: self.user_id,
            route_id: self.route_id,
            tournament_id: self.tournament_id,
            path,
            started_at,
            duration_ms: self.duration_ms,
            success: self.success != 0,
        })
    }
}

/// Intermediate struct for reading tournament rows from the database.
struct TournamentRow {
    id: i64,
    starts_at: String,
    ends_at: String,
    join_secret: String,
    private: i32,
}

impl TournamentRow {
    fn into_tournament(self) -> Result<Tournament, DatabaseError> {
        let starts_at = DateTime::parse_from_rfc3339(&self.starts_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid start date: {}", e))
            })?;

        let ends_at = DateTime::parse_from_rfc3339(&self.ends_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DatabaseError::DeserializationError(format!("Invalid end date: {}", e)))?;

        Ok(Tournament {
            id: self.id,
            starts_at,
            ends_at,
            join_secret: self.join_secret,
            private: self.private != 0,
        })
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

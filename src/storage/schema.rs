//! Database schema definitions for sprintrank.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Users table
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);

-- Routes table: a (start, finish) traversal challenge, write-once
CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start TEXT NOT NULL,
    finish TEXT NOT NULL,
    creator_id INTEGER NOT NULL REFERENCES users(id),
    UNIQUE(start, finish)
);

-- Tournaments table
CREATE TABLE IF NOT EXISTS tournaments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    join_secret TEXT NOT NULL,
    private INTEGER NOT NULL DEFAULT 1
);

-- Sprints table: one timed attempt, append-only
CREATE TABLE IF NOT EXISTS sprints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    route_id INTEGER NOT NULL REFERENCES routes(id),
    tournament_id INTEGER REFERENCES tournaments(id) ON DELETE SET NULL,
    path_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sprints_route_id ON sprints(route_id);
CREATE INDEX IF NOT EXISTS idx_sprints_user_id ON sprints(user_id);
CREATE INDEX IF NOT EXISTS idx_sprints_tournament_id ON sprints(tournament_id);

-- Tournament membership relations (composite keys, no payload)
CREATE TABLE IF NOT EXISTS tournament_participants (
    tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    PRIMARY KEY (tournament_id, user_id)
);

CREATE TABLE IF NOT EXISTS tournament_creators (
    tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    PRIMARY KEY (tournament_id, user_id)
);

CREATE TABLE IF NOT EXISTS tournament_routes (
    tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
    route_id INTEGER NOT NULL REFERENCES routes(id),
    PRIMARY KEY (tournament_id, route_id)
);
"#;

/// SQL for creating the schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

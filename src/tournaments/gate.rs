//! Authorization-gated tournament relation mutations.
//!
//! Every write that changes tournament membership, creatorship or route
//! association runs as Unauthorized -> Authorized -> Committed: the acting
//! user's creator status is verified inside the same transaction as the
//! write, so a racing creator removal can never leave an unauthorized write
//! applied. Any failure rolls the whole operation back.

use std::sync::Arc;

use rusqlite::{params, Connection};

use crate::storage::{Database, DatabaseError, Tournament};

/// Relation mutation gate.
pub struct RelationGate {
    db: Arc<Database>,
}

impl RelationGate {
    /// Create a new gate over the shared record store.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Add a participant. Re-adding an existing participant is a no-op.
    pub fn add_participant(
        &self,
        tournament_id: i64,
        user_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;
        ensure_user_exists(&tx, user_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO tournament_participants (tournament_id, user_id)
             VALUES (?1, ?2)",
            params![tournament_id, user_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Added participant {} to tournament {}", user_id, tournament_id);
        Ok(())
    }

    /// Remove a participant. Removing a non-participant is a no-op.
    pub fn remove_participant(
        &self,
        tournament_id: i64,
        user_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;

        tx.execute(
            "DELETE FROM tournament_participants WHERE tournament_id = ?1 AND user_id = ?2",
            params![tournament_id, user_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Removed participant {} from tournament {}", user_id, tournament_id);
        Ok(())
    }

    /// Add a creator. Re-adding an existing creator is a no-op.
    pub fn add_creator(
        &self,
        tournament_id: i64,
        user_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;
        ensure_user_exists(&tx, user_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO tournament_creators (tournament_id, user_id)
             VALUES (?1, ?2)",
            params![tournament_id, user_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Added creator {} to tournament {}", user_id, tournament_id);
        Ok(())
    }

    /// Remove a creator.
    ///
    /// A tournament keeps at least one creator: removing the last one is
    /// refused with [`GateError::Conflict`].
    pub fn remove_creator(
        &self,
        tournament_id: i64,
        user_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;

        let target_is_creator: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tournament_creators
                 WHERE tournament_id = ?1 AND user_id = ?2",
                params![tournament_id, user_id],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if target_is_creator == 0 {
            // Nothing to remove
            return Ok(());
        }

        let creators: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tournament_creators WHERE tournament_id = ?1",
                params![tournament_id],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if creators <= 1 {
            return Err(GateError::Conflict(format!(
                "tournament {} would be left without a creator",
                tournament_id
            )));
        }

        tx.execute(
            "DELETE FROM tournament_creators WHERE tournament_id = ?1 AND user_id = ?2",
            params![tournament_id, user_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Removed creator {} from tournament {}", user_id, tournament_id);
        Ok(())
    }

    /// Associate a route with a tournament. Re-adding is a no-op.
    pub fn add_route(
        &self,
        tournament_id: i64,
        route_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;
        ensure_route_exists(&tx, route_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO tournament_routes (tournament_id, route_id)
             VALUES (?1, ?2)",
            params![tournament_id, route_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Added route {} to tournament {}", route_id, tournament_id);
        Ok(())
    }

    /// Remove a route association. Removing an absent association is a no-op.
    pub fn remove_route(
        &self,
        tournament_id: i64,
        route_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;

        tx.execute(
            "DELETE FROM tournament_routes WHERE tournament_id = ?1 AND route_id = ?2",
            params![tournament_id, route_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Removed route {} from tournament {}", route_id, tournament_id);
        Ok(())
    }

    /// Update a tournament's schedule, join secret or privacy flag.
    pub fn update_tournament(
        &self,
        tournament: &Tournament,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament.id, acting_user_id)?;

        tx.execute(
            "UPDATE tournaments SET starts_at = ?2, ends_at = ?3, join_secret = ?4,
             private = ?5 WHERE id = ?1",
            params![
                tournament.id,
                tournament.starts_at.to_rfc3339(),
                tournament.ends_at.to_rfc3339(),
                tournament.join_secret,
                tournament.private as i32,
            ],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("Updated tournament {}", tournament.id);
        Ok(())
    }

    /// Delete a tournament and purge its three relation sets.
    ///
    /// Relations go first, then the tournament row; the whole removal is one
    /// transaction and commits only if every step succeeds.
    pub fn delete_tournament(
        &self,
        tournament_id: i64,
        acting_user_id: i64,
    ) -> Result<(), GateError> {
        let tx = self.db.begin()?;
        authorize(&tx, tournament_id, acting_user_id)?;

        for sql in [
            "DELETE FROM tournament_participants WHERE tournament_id = ?1",
            "DELETE FROM tournament_creators WHERE tournament_id = ?1",
            "DELETE FROM tournament_routes WHERE tournament_id = ?1",
            "DELETE FROM tournaments WHERE id = ?1",
        ] {
            tx.execute(sql, params![tournament_id]).map_err(sql_err)?;
        }

        tx.commit().map_err(tx_err)?;
        tracing::info!("Deleted tournament {}", tournament_id);
        Ok(())
    }

    /// Join a tournament by its join secret.
    ///
    /// Any holder of the secret may join; no creator check applies. Joining
    /// a tournament the user already participates in succeeds without
    /// change. Returns the joined tournament's id.
    pub fn join_by_password(&self, secret: &str, user_id: i64) -> Result<i64, GateError> {
        let tx = self.db.begin()?;

        let tournament_id: i64 = match tx.query_row(
            "SELECT id FROM tournaments WHERE join_secret = ?1",
            params![secret],
            |row| row.get(0),
        ) {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(GateError::NotFound(
                    "no tournament matches the supplied password".to_string(),
                ));
            }
            Err(e) => return Err(sql_err(e)),
        };

        ensure_user_exists(&tx, user_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO tournament_participants (tournament_id, user_id)
             VALUES (?1, ?2)",
            params![tournament_id, user_id],
        )
        .map_err(sql_err)?;

        tx.commit().map_err(tx_err)?;
        tracing::info!("User {} joined tournament {}", user_id, tournament_id);
        Ok(tournament_id)
    }
}

/// Verify the acting user may mutate the tournament, inside the caller's
/// transaction.
fn authorize(conn: &Connection, tournament_id: i64, acting_user_id: i64) -> Result<(), GateError> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tournaments WHERE id = ?1",
            params![tournament_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    if exists == 0 {
        return Err(GateError::NotFound(format!(
            "tournament {} does not exist",
            tournament_id
        )));
    }

    let is_creator: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tournament_creators
             WHERE tournament_id = ?1 AND user_id = ?2",
            params![tournament_id, acting_user_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    if is_creator == 0 {
        tracing::warn!(
            "User {} denied mutation of tournament {}: not a creator",
            acting_user_id,
            tournament_id
        );
        return Err(GateError::Unauthorized {
            user_id: acting_user_id,
            tournament_id,
        });
    }

    Ok(())
}

fn ensure_user_exists(conn: &Connection, user_id: i64) -> Result<(), GateError> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    if exists == 0 {
        return Err(GateError::NotFound(format!("user {} does not exist", user_id)));
    }
    Ok(())
}

fn ensure_route_exists(conn: &Connection, route_id: i64) -> Result<(), GateError> {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM routes WHERE id = ?1",
            params![route_id],
            |row| row.get(0),
        )
        .map_err(sql_err)?;
    if exists == 0 {
        return Err(GateError::NotFound(format!(
            "route {} does not exist",
            route_id
        )));
    }
    Ok(())
}

fn sql_err(e: rusqlite::Error) -> GateError {
    GateError::Storage(DatabaseError::QueryFailed(e.to_string()))
}

fn tx_err(e: rusqlite::Error) -> GateError {
    GateError::Storage(DatabaseError::TransactionFailed(e.to_string()))
}

/// Gate errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("User {user_id} is not a creator of tournament {tournament_id}")]
    Unauthorized { user_id: i64, tournament_id: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

//! Tournament lifecycle: creation and listings.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::storage::{AppConfig, Database, DatabaseError, Tournament};
use crate::tournaments::gate::GateError;

/// Tournament lifecycle service.
pub struct TournamentService {
    db: Arc<Database>,
    config: AppConfig,
}

impl TournamentService {
    /// Create a new tournament service.
    pub fn new(db: Arc<Database>, config: AppConfig) -> Self {
        Self { db, config }
    }

    /// Create a tournament with the acting user as its first creator.
    ///
    /// The join secret is generated and guaranteed unique; the schedule
    /// defaults to the configured window starting now; new tournaments are
    /// private. The tournament row and its first creator row commit in one
    /// transaction, so a tournament is never observable without a creator.
    pub fn create(&self, acting_user_id: i64) -> Result<Tournament, GateError> {
        if self.db.get_user(acting_user_id)?.is_none() {
            return Err(GateError::NotFound(format!(
                "user {} does not exist",
                acting_user_id
            )));
        }

        let join_secret = self.unique_join_secret()?;
        let starts_at = Utc::now();
        let ends_at = starts_at + Duration::days(self.config.tournament_duration_days);

        let tx = self.db.begin()?;
        tx.execute(
            "INSERT INTO tournaments (starts_at, ends_at, join_secret, private)
             VALUES (?1, ?2, ?3, 1)",
            params![starts_at.to_rfc3339(), ends_at.to_rfc3339(), join_secret],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO tournament_creators (tournament_id, user_id) VALUES (?1, ?2)",
            params![id, acting_user_id],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!("User {} created tournament {}", acting_user_id, id);
        Ok(Tournament {
            id,
            starts_at,
            ends_at,
            join_secret,
            private: true,
        })
    }

    /// Public tournaments whose scoring window has not ended.
    pub fn open_tournaments(&self) -> Result<Vec<Tournament>, GateError> {
        Ok(self.db.open_tournaments(Utc::now())?)
    }

    /// Tournaments the user participates in.
    pub fn user_tournaments(&self, user_id: i64) -> Result<Vec<Tournament>, GateError> {
        Ok(self.db.user_tournaments(user_id)?)
    }

    /// Tournaments the user is a creator of.
    pub fn creator_tournaments(&self, user_id: i64) -> Result<Vec<Tournament>, GateError> {
        Ok(self.db.creator_tournaments(user_id)?)
    }

    /// Generate a join secret no existing tournament uses.
    fn unique_join_secret(&self) -> Result<String, GateError> {
        loop {
            let secret = generate_secret(self.config.join_secret_length);
            if self.db.find_tournament_by_secret(&secret)?.is_none() {
                return Ok(secret);
            }
        }
    }
}

/// Random alphanumeric secret of the requested length.
fn generate_secret(length: usize) -> String {
    let mut secret = String::with_capacity(length);
    while secret.len() < length {
        secret.push_str(&Uuid::new_v4().simple().to_string());
    }
    secret.truncate(length);
    secret
}

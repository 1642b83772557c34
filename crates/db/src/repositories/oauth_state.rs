use chrono::{DateTime, Utc};
use sqlx::Row;

use herald_core::install::OAuthState;

use super::{OAuthStateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOAuthStateRepository {
    pool: DbPool,
}

impl SqlOAuthStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OAuthStateRepository for SqlOAuthStateRepository {
    async fn issue(&self, state: OAuthState) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO slack_oauth_state (state, issued_at, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&state.state)
        .bind(state.issued_at.to_rfc3339())
        .bind(state.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state, issued_at, expires_at FROM slack_oauth_state WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Single use: the row is removed whether or not it is still valid.
        sqlx::query("DELETE FROM slack_oauth_state WHERE state = ?")
            .bind(state)
            .execute(&self.pool)
            .await?;

        let record = decode_state(row)?;
        if record.is_expired(now) {
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM slack_oauth_state WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn decode_state(row: sqlx::sqlite::SqliteRow) -> Result<OAuthState, RepositoryError> {
    let issued_at = parse_timestamp(&row.try_get::<String, _>("issued_at")?)?;
    let expires_at = parse_timestamp(&row.try_get::<String, _>("expires_at")?)?;

    Ok(OAuthState { state: row.try_get("state")?, issued_at, expires_at })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

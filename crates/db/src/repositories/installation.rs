use chrono::{DateTime, Utc};
use sqlx::Row;

use herald_core::install::{Installation, TeamId, UserId};

use super::{InstallationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlInstallationRepository {
    pool: DbPool,
}

impl SqlInstallationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InstallationRepository for SqlInstallationRepository {
    async fn save(&self, installation: Installation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO slack_installation (
                team_id, team_name, enterprise_id, bot_token, bot_user_id, bot_scopes,
                installer_user_id, user_token, user_scopes, installed_at
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(team_id, installer_user_id) DO UPDATE SET
                team_name = excluded.team_name,
                enterprise_id = excluded.enterprise_id,
                bot_token = excluded.bot_token,
                bot_user_id = excluded.bot_user_id,
                bot_scopes = excluded.bot_scopes,
                user_token = excluded.user_token,
                user_scopes = excluded.user_scopes,
                installed_at = excluded.installed_at",
        )
        .bind(&installation.team_id.0)
        .bind(installation.team_name.as_deref())
        .bind(installation.enterprise_id.as_deref())
        .bind(&installation.bot_token)
        .bind(installation.bot_user_id.as_deref())
        .bind(&installation.bot_scopes)
        .bind(&installation.installer_user_id.0)
        .bind(installation.user_token.as_deref())
        .bind(installation.user_scopes.as_deref())
        .bind(installation.installed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_for_team(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT team_id, team_name, enterprise_id, bot_token, bot_user_id, bot_scopes,
                    installer_user_id, user_token, user_scopes, installed_at
             FROM slack_installation
             WHERE team_id = ?
             ORDER BY installed_at DESC, id DESC
             LIMIT 1",
        )
        .bind(&team_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_installation).transpose()
    }

    async fn find_user_token(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<String>, RepositoryError> {
        let token = sqlx::query_scalar::<_, Option<String>>(
            "SELECT user_token FROM slack_installation
             WHERE team_id = ? AND installer_user_id = ?",
        )
        .bind(&team_id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.flatten().filter(|value| !value.trim().is_empty()))
    }

    async fn delete_for_team(&self, team_id: &TeamId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM slack_installation WHERE team_id = ?")
            .bind(&team_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn decode_installation(row: sqlx::sqlite::SqliteRow) -> Result<Installation, RepositoryError> {
    let installed_at_raw = row.try_get::<String, _>("installed_at")?;
    let installed_at = DateTime::parse_from_rfc3339(&installed_at_raw)
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid installed_at `{installed_at_raw}`: {error}"))
        })?
        .with_timezone(&Utc);

    Ok(Installation {
        team_id: TeamId(row.try_get("team_id")?),
        team_name: row.try_get("team_name")?,
        enterprise_id: row.try_get("enterprise_id")?,
        bot_token: row.try_get("bot_token")?,
        bot_user_id: row.try_get("bot_user_id")?,
        bot_scopes: row.try_get("bot_scopes")?,
        installer_user_id: UserId(row.try_get("installer_user_id")?),
        user_token: row.try_get("user_token")?,
        user_scopes: row.try_get("user_scopes")?,
        installed_at,
    })
}

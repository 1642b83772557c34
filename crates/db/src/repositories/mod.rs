use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use herald_core::install::{Installation, OAuthState, TeamId, UserId};

pub mod installation;
pub mod memory;
pub mod oauth_state;

pub use installation::SqlInstallationRepository;
pub use memory::{InMemoryInstallationRepository, InMemoryOAuthStateRepository};
pub use oauth_state::SqlOAuthStateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait InstallationRepository: Send + Sync {
    /// Upserts keyed on (team, installer); a reinstall supersedes the
    /// previous record.
    async fn save(&self, installation: Installation) -> Result<(), RepositoryError>;

    /// Latest installation for a workspace, regardless of installer.
    async fn find_for_team(&self, team_id: &TeamId)
        -> Result<Option<Installation>, RepositoryError>;

    /// Delegated user token for (team, user); `None` when the user has not
    /// authorized the app.
    async fn find_user_token(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<String>, RepositoryError>;

    async fn delete_for_team(&self, team_id: &TeamId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait OAuthStateRepository: Send + Sync {
    async fn issue(&self, state: OAuthState) -> Result<(), RepositoryError>;

    /// Fetch-and-delete: a nonce can be consumed at most once, and expired
    /// or unknown nonces yield `None`.
    async fn consume(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

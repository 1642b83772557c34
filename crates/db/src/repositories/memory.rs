use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use herald_core::install::{Installation, OAuthState, TeamId, UserId};

use super::{InstallationRepository, OAuthStateRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryInstallationRepository {
    installations: RwLock<HashMap<(String, String), Installation>>,
}

#[async_trait::async_trait]
impl InstallationRepository for InMemoryInstallationRepository {
    async fn save(&self, installation: Installation) -> Result<(), RepositoryError> {
        let mut installations = self.installations.write().await;
        let key = (installation.team_id.0.clone(), installation.installer_user_id.0.clone());
        installations.insert(key, installation);
        Ok(())
    }

    async fn find_for_team(
        &self,
        team_id: &TeamId,
    ) -> Result<Option<Installation>, RepositoryError> {
        let installations = self.installations.read().await;
        Ok(installations
            .values()
            .filter(|installation| installation.team_id == *team_id)
            .max_by_key(|installation| installation.installed_at)
            .cloned())
    }

    async fn find_user_token(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<String>, RepositoryError> {
        let installations = self.installations.read().await;
        Ok(installations
            .get(&(team_id.0.clone(), user_id.0.clone()))
            .and_then(|installation| installation.user_token.clone())
            .filter(|token| !token.trim().is_empty()))
    }

    async fn delete_for_team(&self, team_id: &TeamId) -> Result<u64, RepositoryError> {
        let mut installations = self.installations.write().await;
        let before = installations.len();
        installations.retain(|(team, _), _| team != &team_id.0);
        Ok((before - installations.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryOAuthStateRepository {
    states: RwLock<HashMap<String, OAuthState>>,
}

#[async_trait::async_trait]
impl OAuthStateRepository for InMemoryOAuthStateRepository {
    async fn issue(&self, state: OAuthState) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(state.state.clone(), state);
        Ok(())
    }

    async fn consume(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OAuthState>, RepositoryError> {
        let mut states = self.states.write().await;
        Ok(states.remove(state).filter(|record| !record.is_expired(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, record| !record.is_expired(now));
        Ok((before - states.len()) as u64)
    }
}

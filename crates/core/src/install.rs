//! Domain records for the OAuth install store.
//!
//! Both record kinds follow the shapes Slack's install flow reads and
//! writes: an [`Installation`] per authorized workspace/installer pair and a
//! short-lived [`OAuthState`] nonce correlating a redirect back to the
//! request that started it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted credentials and scopes for a workspace that authorized the app.
///
/// A reinstall by the same installer supersedes the previous record; other
/// installers' grants in the same workspace are unaffected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub team_id: TeamId,
    pub team_name: Option<String>,
    pub enterprise_id: Option<String>,
    pub bot_token: String,
    pub bot_user_id: Option<String>,
    pub bot_scopes: String,
    pub installer_user_id: UserId,
    pub user_token: Option<String>,
    pub user_scopes: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl Installation {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.team_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "installation team_id must not be empty".to_string(),
            ));
        }
        if self.installer_user_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "installation installer_user_id must not be empty".to_string(),
            ));
        }
        if self.bot_token.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "installation bot_token must not be empty".to_string(),
            ));
        }
        if self.user_token.is_some()
            && self.user_scopes.as_deref().map(str::trim).unwrap_or_default().is_empty()
        {
            return Err(DomainError::InvariantViolation(
                "a delegated user token requires non-empty user scopes".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_user_token(&self) -> bool {
        self.user_token.as_deref().map(str::trim).is_some_and(|token| !token.is_empty())
    }
}

pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Single-use nonce correlating an OAuth redirect to the request that
/// initiated it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub state: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn issue(state: String, now: DateTime<Utc>) -> Self {
        Self { state, issued_at: now, expires_at: now + Duration::minutes(OAUTH_STATE_TTL_MINUTES) }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Installation, OAuthState, TeamId, UserId};

    fn installation_fixture() -> Installation {
        Installation {
            team_id: TeamId("T0001".to_string()),
            team_name: Some("Acme".to_string()),
            enterprise_id: None,
            bot_token: "xoxb-test".to_string(),
            bot_user_id: Some("U0BOT".to_string()),
            bot_scopes: "commands".to_string(),
            installer_user_id: UserId("U0001".to_string()),
            user_token: Some("xoxp-test".to_string()),
            user_scopes: Some("chat:write".to_string()),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn valid_installation_passes_validation() {
        assert!(installation_fixture().validate().is_ok());
    }

    #[test]
    fn user_token_without_scopes_is_rejected() {
        let mut installation = installation_fixture();
        installation.user_scopes = None;
        assert!(installation.validate().is_err());
    }

    #[test]
    fn blank_user_token_does_not_count_as_delegated() {
        let mut installation = installation_fixture();
        installation.user_token = Some("   ".to_string());
        assert!(!installation.has_user_token());
    }

    #[test]
    fn state_expires_after_ttl() {
        let now = Utc::now();
        let state = OAuthState::issue("nonce".to_string(), now);

        assert!(!state.is_expired(now));
        assert!(!state.is_expired(now + Duration::minutes(9)));
        assert!(state.is_expired(now + Duration::minutes(10)));
    }
}

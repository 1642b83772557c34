use std::collections::HashSet;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use herald_core::errors::DomainError;
use herald_core::install::{Installation, OAuthState, TeamId, UserId};
use herald_db::repositories::{InstallationRepository, OAuthStateRepository, RepositoryError};

use crate::api::{OAuthAccessRequest, OAuthAccessResponse, SlackApiClient, SlackApiError};

pub const AUTHORIZE_URL: &str = "https://slack.com/oauth/v2/authorize";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid or expired oauth state token")]
    InvalidState,
    #[error("authorization code missing from redirect")]
    MissingCode,
    #[error("oauth provider returned error: {0}")]
    Provider(String),
    #[error(transparent)]
    Exchange(#[from] SlackApiError),
    #[error("token exchange response was missing {0}")]
    IncompleteExchange(&'static str),
    #[error("install store failure: {0}")]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug)]
pub struct InstallSettings {
    pub client_id: String,
    pub client_secret: String,
    /// `{public_host}/slack/oauth_redirect`, registered with the Slack app.
    pub redirect_url: String,
    /// `{public_host}/slack/install`, embedded in permission-needed replies.
    pub install_url: String,
    pub bot_scopes: String,
    pub user_scopes: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallBegin {
    pub authorize_url: String,
    pub state: String,
}

/// Query parameters Slack appends to the redirect leg.
#[derive(Clone, Debug, Default)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub struct InstallService<I, S> {
    api: SlackApiClient,
    installations: I,
    states: S,
    settings: InstallSettings,
}

impl<I, S> InstallService<I, S>
where
    I: InstallationRepository,
    S: OAuthStateRepository,
{
    pub fn new(api: SlackApiClient, installations: I, states: S, settings: InstallSettings) -> Self {
        Self { api, installations, states, settings }
    }

    pub fn install_url(&self) -> &str {
        &self.settings.install_url
    }

    /// Issues a state nonce and builds the authorize URL the browser is sent
    /// to.
    pub async fn begin_install(&self) -> Result<InstallBegin, InstallError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let record = OAuthState::issue(nonce.clone(), Utc::now());
        self.states.issue(record).await?;

        info!(
            event_name = "oauth.install.begin",
            correlation_id = %nonce,
            "issued oauth state nonce"
        );

        Ok(InstallBegin { authorize_url: self.authorize_url(&nonce), state: nonce })
    }

    /// Turns the redirect leg into a persisted installation: the state nonce
    /// is consumed (single use, expiry enforced), the code is exchanged, and
    /// a reinstall supersedes the previous record for the same installer.
    pub async fn complete_install(
        &self,
        params: RedirectParams,
    ) -> Result<Installation, InstallError> {
        if let Some(error) = params.error.filter(|value| !value.trim().is_empty()) {
            return Err(InstallError::Provider(error));
        }

        let state = params.state.as_deref().unwrap_or_default();
        let consumed = self.states.consume(state, Utc::now()).await?;
        if consumed.is_none() {
            return Err(InstallError::InvalidState);
        }

        let code = params
            .code
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(InstallError::MissingCode)?;

        let response = self
            .api
            .oauth_v2_access(OAuthAccessRequest {
                code,
                client_id: &self.settings.client_id,
                client_secret: &self.settings.client_secret,
                redirect_uri: &self.settings.redirect_url,
            })
            .await?;

        let installation = build_installation(response)?;
        installation.validate()?;
        self.installations.save(installation.clone()).await?;

        info!(
            event_name = "oauth.install.completed",
            correlation_id = %state,
            team_id = %installation.team_id,
            installer_user_id = %installation.installer_user_id,
            delegated = installation.has_user_token(),
            "installation persisted"
        );

        Ok(installation)
    }

    pub async fn purge_expired_states(&self) -> Result<u64, InstallError> {
        Ok(self.states.purge_expired(Utc::now()).await?)
    }

    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{AUTHORIZE_URL}?client_id={client_id}&scope={scope}&user_scope={user_scope}&redirect_uri={redirect_uri}&state={state}",
            client_id = encode_query(&self.settings.client_id),
            scope = encode_query(&normalize_scope(&self.settings.bot_scopes)),
            user_scope = encode_query(&normalize_scope(&self.settings.user_scopes)),
            redirect_uri = encode_query(&self.settings.redirect_url),
            state = encode_query(state),
        )
    }
}

fn build_installation(response: OAuthAccessResponse) -> Result<Installation, InstallError> {
    let team = response.team.ok_or(InstallError::IncompleteExchange("team identity"))?;
    let bot_token = response
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or(InstallError::IncompleteExchange("bot access token"))?;
    let authed_user =
        response.authed_user.ok_or(InstallError::IncompleteExchange("authed user identity"))?;

    let user_token = authed_user.access_token.filter(|token| !token.trim().is_empty());
    let user_scopes = if user_token.is_some() { authed_user.scope } else { None };

    Ok(Installation {
        team_id: TeamId(team.id),
        team_name: team.name,
        enterprise_id: response.enterprise.map(|enterprise| enterprise.id),
        bot_token,
        bot_user_id: response.bot_user_id,
        bot_scopes: response.scope.unwrap_or_default(),
        installer_user_id: UserId(authed_user.id),
        user_token,
        user_scopes,
        installed_at: Utc::now(),
    })
}

fn normalize_scope(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut parts = Vec::new();
    for part in raw
        .split(|c: char| c.is_ascii_whitespace() || c == ',' || c == ';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
    {
        if seen.insert(part.to_string()) {
            parts.push(part.to_string());
        }
    }
    parts.join(" ")
}

fn encode_query(value: &str) -> String {
    value.replace('+', "%2B").replace(' ', "%20").replace('/', "%2F").replace(':', "%3A")
}

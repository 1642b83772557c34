use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use herald_core::install::{TeamId, UserId};
use herald_db::repositories::InstallationRepository;

use crate::api::SlackApiClient;
use crate::replies::{self, CommandReply};

pub const SAY_COMMAND: &str = "/say";
pub const SHRUG_COMMAND: &str = "/shrug";

const SHRUG_KAOMOJI: &str = r"¯\_(ツ)_/¯";

/// Form fields of a slash command webhook delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub response_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub command: String,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeraldCommand {
    Say { text: String },
    Shrug { text: String },
    Unknown { command: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("slash payload is not valid form data")]
    MalformedBody,
    #[error("slash payload is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

/// Decodes the `application/x-www-form-urlencoded` slash command body.
pub fn parse_slash_payload(body: &[u8]) -> Result<SlashCommandPayload, CommandParseError> {
    let raw = std::str::from_utf8(body).map_err(|_| CommandParseError::MalformedBody)?;
    let mut payload = SlashCommandPayload::default();

    for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key).ok_or(CommandParseError::MalformedBody)?;
        let value = decode_component(value).ok_or(CommandParseError::MalformedBody)?;

        match key.as_str() {
            "command" => payload.command = value,
            "text" => payload.text = value,
            "team_id" => payload.team_id = value,
            "channel_id" => payload.channel_id = value,
            "user_id" => payload.user_id = value,
            "trigger_id" => payload.trigger_id = value,
            "response_url" => payload.response_url = value,
            _ => {}
        }
    }

    if payload.command.trim().is_empty() {
        return Err(CommandParseError::MissingField("command"));
    }
    if payload.team_id.trim().is_empty() {
        return Err(CommandParseError::MissingField("team_id"));
    }
    if payload.channel_id.trim().is_empty() {
        return Err(CommandParseError::MissingField("channel_id"));
    }
    if payload.user_id.trim().is_empty() {
        return Err(CommandParseError::MissingField("user_id"));
    }

    Ok(payload)
}

fn decode_component(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut cursor = 0;

    while cursor < bytes.len() {
        match bytes[cursor] {
            b'+' => {
                output.push(b' ');
                cursor += 1;
            }
            b'%' => {
                let hi = (bytes.get(cursor + 1).copied()? as char).to_digit(16)?;
                let lo = (bytes.get(cursor + 2).copied()? as char).to_digit(16)?;
                output.push(((hi << 4) | lo) as u8);
                cursor += 3;
            }
            byte => {
                output.push(byte);
                cursor += 1;
            }
        }
    }

    String::from_utf8(output).ok()
}

pub fn classify_command(payload: &SlashCommandPayload) -> HeraldCommand {
    let text = payload.text.trim().to_owned();
    match payload.command.trim() {
        SAY_COMMAND => HeraldCommand::Say { text },
        SHRUG_COMMAND => HeraldCommand::Shrug { text },
        other => HeraldCommand::Unknown { command: other.to_owned() },
    }
}

pub fn normalize_envelope(payload: &SlashCommandPayload, request_id: &str) -> CommandEnvelope {
    CommandEnvelope {
        command: payload.command.trim().to_owned(),
        team_id: payload.team_id.clone(),
        channel_id: payload.channel_id.clone(),
        user_id: payload.user_id.clone(),
        request_id: request_id.to_owned(),
    }
}

/// Posts a message on the invoking user's behalf, or explains how to grant
/// the permission.
#[async_trait]
pub trait UserPostService: Send + Sync {
    async fn post_as_user(
        &self,
        envelope: &CommandEnvelope,
        text: &str,
    ) -> Result<CommandReply, CommandRouteError>;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: UserPostService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        payload: &SlashCommandPayload,
        request_id: &str,
    ) -> Result<CommandReply, CommandRouteError> {
        let envelope = normalize_envelope(payload, request_id);

        match classify_command(payload) {
            HeraldCommand::Say { text } if text.is_empty() => Ok(replies::usage(SAY_COMMAND)),
            HeraldCommand::Say { text } => self.service.post_as_user(&envelope, &text).await,
            HeraldCommand::Shrug { text } => {
                let message = if text.is_empty() {
                    SHRUG_KAOMOJI.to_owned()
                } else {
                    format!("{text} {SHRUG_KAOMOJI}")
                };
                self.service.post_as_user(&envelope, &message).await
            }
            HeraldCommand::Unknown { command } => Ok(replies::unsupported_command(&command)),
        }
    }
}

/// The real [`UserPostService`]: looks up the delegated token for the
/// invoking (team, user) pair and issues `chat.postMessage` with it.
pub struct DelegatedPostService<R> {
    api: SlackApiClient,
    installations: R,
    install_url: String,
}

impl<R> DelegatedPostService<R> {
    pub fn new(api: SlackApiClient, installations: R, install_url: impl Into<String>) -> Self {
        Self { api, installations, install_url: install_url.into() }
    }
}

#[async_trait]
impl<R> UserPostService for DelegatedPostService<R>
where
    R: InstallationRepository,
{
    async fn post_as_user(
        &self,
        envelope: &CommandEnvelope,
        text: &str,
    ) -> Result<CommandReply, CommandRouteError> {
        let token = self
            .installations
            .find_user_token(
                &TeamId(envelope.team_id.clone()),
                &UserId(envelope.user_id.clone()),
            )
            .await
            .map_err(|error| CommandRouteError::Service(error.to_string()))?;

        let Some(token) = token else {
            info!(
                event_name = "command.permission_needed",
                correlation_id = %envelope.request_id,
                team_id = %envelope.team_id,
                user_id = %envelope.user_id,
                command = %envelope.command,
                "no delegated user token on file; replying with install link"
            );
            return Ok(replies::permission_needed(&self.install_url));
        };

        match self.api.chat_post_message(&token, &envelope.channel_id, text).await {
            Ok(posted) => {
                info!(
                    event_name = "command.posted_as_user",
                    correlation_id = %envelope.request_id,
                    team_id = %envelope.team_id,
                    user_id = %envelope.user_id,
                    channel_id = %posted.channel,
                    ts = %posted.ts,
                    "message posted on the user's behalf"
                );
                Ok(replies::posted_confirmation(&posted.channel))
            }
            Err(error) => {
                warn!(
                    event_name = "command.post_failed",
                    correlation_id = %envelope.request_id,
                    team_id = %envelope.team_id,
                    user_id = %envelope.user_id,
                    error = %error,
                    "chat.postMessage failed; relaying failure to invoker"
                );
                Ok(replies::post_failure(&error.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use herald_core::install::{Installation, TeamId, UserId};
    use herald_db::repositories::{InMemoryInstallationRepository, InstallationRepository};

    use super::{
        classify_command, parse_slash_payload, CommandParseError, CommandRouter,
        DelegatedPostService, HeraldCommand, SlashCommandPayload,
    };
    use crate::api::SlackApiClient;
    use crate::replies::ResponseType;

    fn payload(command: &str, text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: command.to_string(),
            text: text.to_string(),
            team_id: "T0001".to_string(),
            channel_id: "C0001".to_string(),
            user_id: "U0001".to_string(),
            trigger_id: "trigger-1".to_string(),
            response_url: "https://hooks.slack.test/commands/T0001/1/abc".to_string(),
        }
    }

    fn delegated_installation() -> Installation {
        Installation {
            team_id: TeamId("T0001".to_string()),
            team_name: None,
            enterprise_id: None,
            bot_token: "xoxb-bot".to_string(),
            bot_user_id: None,
            bot_scopes: "commands".to_string(),
            installer_user_id: UserId("U0001".to_string()),
            user_token: Some("xoxp-user".to_string()),
            user_scopes: Some("chat:write".to_string()),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn form_body_decodes_into_payload() {
        let body = b"command=%2Fsay&text=hello+there&team_id=T0001&channel_id=C0001\
                     &user_id=U0001&trigger_id=tr1&response_url=https%3A%2F%2Fhooks.slack.test%2Fx";

        let payload = parse_slash_payload(body).expect("parse payload");

        assert_eq!(payload.command, "/say");
        assert_eq!(payload.text, "hello there");
        assert_eq!(payload.team_id, "T0001");
        assert_eq!(payload.response_url, "https://hooks.slack.test/x");
    }

    #[test]
    fn form_body_without_team_is_rejected() {
        let body = b"command=%2Fsay&text=hi&channel_id=C0001&user_id=U0001";

        let result = parse_slash_payload(body);

        assert_eq!(result, Err(CommandParseError::MissingField("team_id")));
    }

    #[test]
    fn commands_classify_by_name() {
        assert_eq!(
            classify_command(&payload("/say", "  hello  ")),
            HeraldCommand::Say { text: "hello".to_string() }
        );
        assert_eq!(
            classify_command(&payload("/shrug", "")),
            HeraldCommand::Shrug { text: String::new() }
        );
        assert_eq!(
            classify_command(&payload("/ping", "pong")),
            HeraldCommand::Unknown { command: "/ping".to_string() }
        );
    }

    #[tokio::test]
    async fn command_without_delegated_token_yields_install_link() {
        let installations = InMemoryInstallationRepository::default();
        let service = DelegatedPostService::new(
            SlackApiClient::new(),
            installations,
            "https://herald.test/slack/install",
        );
        let router = CommandRouter::new(service);

        let reply = router.route(&payload("/say", "hello"), "req-1").await.expect("route command");

        assert_eq!(reply.response_type, ResponseType::Ephemeral);
        assert!(reply.text.contains("https://herald.test/slack/install"));
    }

    #[tokio::test]
    async fn failed_outbound_post_is_relayed_to_the_invoker() {
        let installations = InMemoryInstallationRepository::default();
        installations.save(delegated_installation()).await.expect("save installation");

        // An unroutable API endpoint stands in for an outage; the handler
        // reports the failure instead of propagating it.
        let service = DelegatedPostService::new(
            SlackApiClient::with_base_url("http://127.0.0.1:1"),
            installations,
            "https://herald.test/slack/install",
        );
        let router = CommandRouter::new(service);

        let reply = router.route(&payload("/say", "hello"), "req-2").await.expect("route command");

        assert_eq!(reply.response_type, ResponseType::Ephemeral);
        assert!(reply.text.contains("could not be posted"));
    }

    #[tokio::test]
    async fn empty_say_text_yields_usage_hint() {
        let service = DelegatedPostService::new(
            SlackApiClient::new(),
            InMemoryInstallationRepository::default(),
            "https://herald.test/slack/install",
        );
        let router = CommandRouter::new(service);

        let reply = router.route(&payload("/say", "   "), "req-3").await.expect("route command");

        assert!(reply.text.contains("Usage"));
    }

    #[tokio::test]
    async fn unknown_command_yields_unsupported_reply() {
        let service = DelegatedPostService::new(
            SlackApiClient::new(),
            InMemoryInstallationRepository::default(),
            "https://herald.test/slack/install",
        );
        let router = CommandRouter::new(service);

        let reply = router.route(&payload("/ping", "pong"), "req-4").await.expect("route command");

        assert!(reply.text.contains("Unsupported command"));
    }
}

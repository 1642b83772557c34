//! Slash command response payloads, serialized as the inline webhook reply.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub response_type: ResponseType,
    pub text: String,
}

impl CommandReply {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { response_type: ResponseType::Ephemeral, text: text.into() }
    }

    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { response_type: ResponseType::InChannel, text: text.into() }
    }
}

/// Instructional reply when no delegated user token is on file.
pub fn permission_needed(install_url: &str) -> CommandReply {
    CommandReply::ephemeral(format!(
        ":key: Herald needs your permission to post as you. \
         <{install_url}|Authorize Herald>, then run the command again."
    ))
}

pub fn posted_confirmation(channel_id: &str) -> CommandReply {
    CommandReply::ephemeral(format!(":white_check_mark: Posted to <#{channel_id}> as you."))
}

/// Failure notice relayed to the invoker when the outbound post fails.
pub fn post_failure(detail: &str) -> CommandReply {
    CommandReply::ephemeral(format!(
        ":warning: Your message could not be posted: `{detail}`. Please try again."
    ))
}

pub fn usage(command: &str) -> CommandReply {
    CommandReply::ephemeral(format!("Usage: `{command} <message>`"))
}

pub fn unsupported_command(command: &str) -> CommandReply {
    CommandReply::ephemeral(format!("Unsupported command `{command}`. Try `/say` or `/shrug`."))
}

//! Slack Integration - OAuth install flow and user-delegated posting
//!
//! This crate provides the Slack interface for herald:
//! - **Web API** (`api`) - `chat.postMessage`, `oauth.v2.access`, `auth.test`
//! - **Request Signing** (`signature`) - `v0` HMAC verification of webhook deliveries
//! - **OAuth** (`oauth`) - install begin/complete with persisted state nonces
//! - **Slash Commands** (`commands`) - `/say` and `/shrug`, posted as the invoking user
//! - **Replies** (`replies`) - ephemeral/in-channel slash command response payloads
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Point the slash commands and event subscriptions at `POST /slack/events`
//! 3. Register `{public_host}/slack/oauth_redirect` as the OAuth redirect URL
//! 4. Set env vars: `HERALD_SLACK_CLIENT_ID`, `HERALD_SLACK_CLIENT_SECRET`,
//!    `HERALD_SLACK_SIGNING_SECRET`, `HERALD_SLACK_PUBLIC_HOST`
//!
//! # Key Types
//!
//! - `SlackApiClient` - reqwest client for the Web API
//! - `SignatureVerifier` - rejects forged or stale webhook deliveries
//! - `InstallService` - issues state nonces and turns redirects into installations
//! - `CommandRouter` - routes slash commands through a `UserPostService`

pub mod api;
pub mod commands;
pub mod oauth;
pub mod replies;
pub mod signature;

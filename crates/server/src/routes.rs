//! HTTP surface for the Slack integration: webhook deliveries plus the two
//! OAuth install legs. Every delivery to `/slack/events` passes the request
//! signature gate before any payload parsing.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use herald_db::repositories::{SqlInstallationRepository, SqlOAuthStateRepository};
use herald_slack::commands::{parse_slash_payload, CommandRouter, DelegatedPostService};
use herald_slack::oauth::{InstallError, InstallService, RedirectParams};
use herald_slack::signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};

type ServerInstallService = InstallService<SqlInstallationRepository, SqlOAuthStateRepository>;
type ServerCommandRouter = CommandRouter<DelegatedPostService<SqlInstallationRepository>>;

#[derive(Clone)]
pub struct SlackRoutesState {
    install_service: Arc<ServerInstallService>,
    command_router: Arc<ServerCommandRouter>,
    verifier: Arc<SignatureVerifier>,
}

impl SlackRoutesState {
    pub fn new(
        install_service: ServerInstallService,
        command_router: ServerCommandRouter,
        verifier: SignatureVerifier,
    ) -> Self {
        Self {
            install_service: Arc::new(install_service),
            command_router: Arc::new(command_router),
            verifier: Arc::new(verifier),
        }
    }
}

pub fn router(state: SlackRoutesState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/install", get(install))
        .route("/slack/oauth_redirect", get(oauth_redirect))
        .with_state(state)
}

/// Inbound payloads Slack delivers to the events endpoint as JSON.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventEnvelope {
    UrlVerification { challenge: String },
    EventCallback { team_id: Option<String>, event: Option<Value> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Serialize)]
struct ChallengeResponse {
    challenge: String,
}

async fn events(
    State(state): State<SlackRoutesState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4().simple().to_string();

    let Some(timestamp) = header_value(&headers, TIMESTAMP_HEADER) else {
        return unauthorized(&request_id, "missing request timestamp header");
    };
    let Some(signature) = header_value(&headers, SIGNATURE_HEADER) else {
        return unauthorized(&request_id, "missing request signature header");
    };

    if let Err(failure) = state.verifier.verify(timestamp, signature, &body, Utc::now()) {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            correlation_id = %request_id,
            error = %failure,
            "rejected webhook delivery"
        );
        return unauthorized(&request_id, "request signature verification failed");
    }

    let content_type = header_value(&headers, CONTENT_TYPE.as_str()).unwrap_or_default();
    if content_type.starts_with("application/json") {
        return handle_event_payload(&request_id, &body);
    }

    handle_slash_payload(&state, &request_id, &body).await
}

fn handle_event_payload(request_id: &str, body: &[u8]) -> Response {
    match serde_json::from_slice::<EventEnvelope>(body) {
        Ok(EventEnvelope::UrlVerification { challenge }) => {
            info!(
                event_name = "ingress.slack.url_verification",
                correlation_id = %request_id,
                "echoing url verification challenge"
            );
            Json(ChallengeResponse { challenge }).into_response()
        }
        Ok(EventEnvelope::EventCallback { team_id, event }) => {
            let event_type = event
                .as_ref()
                .and_then(|value| value.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            // Event callbacks are acknowledged and otherwise ignored; the
            // command surface is the app's only interactive path.
            info!(
                event_name = "ingress.slack.event_acknowledged",
                correlation_id = %request_id,
                team_id = team_id.as_deref().unwrap_or("unknown"),
                event_type,
                "acknowledged event callback"
            );
            StatusCode::OK.into_response()
        }
        Ok(EventEnvelope::Unsupported) | Err(_) => {
            warn!(
                event_name = "ingress.slack.payload_rejected",
                correlation_id = %request_id,
                "unparseable event payload"
            );
            (StatusCode::BAD_REQUEST, "unsupported event payload").into_response()
        }
    }
}

async fn handle_slash_payload(
    state: &SlackRoutesState,
    request_id: &str,
    body: &[u8],
) -> Response {
    let payload = match parse_slash_payload(body) {
        Ok(payload) => payload,
        Err(failure) => {
            warn!(
                event_name = "ingress.slack.payload_rejected",
                correlation_id = %request_id,
                error = %failure,
                "unparseable slash command payload"
            );
            return (StatusCode::BAD_REQUEST, "unsupported command payload").into_response();
        }
    };

    info!(
        event_name = "ingress.slack.command_received",
        correlation_id = %request_id,
        command = %payload.command,
        team_id = %payload.team_id,
        user_id = %payload.user_id,
        "received slash command"
    );

    match state.command_router.route(&payload, request_id).await {
        Ok(reply) => Json(reply).into_response(),
        Err(failure) => {
            error!(
                event_name = "ingress.slack.command_failed",
                correlation_id = %request_id,
                error = %failure,
                "command routing failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "command handling failed").into_response()
        }
    }
}

async fn install(State(state): State<SlackRoutesState>) -> Response {
    match state.install_service.begin_install().await {
        Ok(begin) => Redirect::temporary(&begin.authorize_url).into_response(),
        Err(failure) => {
            error!(
                event_name = "oauth.install.begin_failed",
                error = %failure,
                "could not start install flow"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Html(result_page("Installation unavailable", "The install flow could not be started. Please try again shortly."))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthRedirectQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_redirect(
    State(state): State<SlackRoutesState>,
    Query(query): Query<OAuthRedirectQuery>,
) -> Response {
    let params =
        RedirectParams { code: query.code, state: query.state, error: query.error };

    match state.install_service.complete_install(params).await {
        Ok(installation) => {
            let workspace =
                installation.team_name.as_deref().unwrap_or(installation.team_id.0.as_str());
            Html(result_page(
                "Herald is installed",
                &format!(
                    "Herald is now authorized for <strong>{workspace}</strong>. \
                     You can close this tab and run <code>/say</code> in Slack."
                ),
            ))
            .into_response()
        }
        Err(failure) => {
            warn!(
                event_name = "oauth.install.redirect_failed",
                error = %failure,
                "install redirect was not completed"
            );
            let (status, detail) = match failure {
                InstallError::InvalidState => (
                    StatusCode::BAD_REQUEST,
                    "This install link has expired or was already used. Start again from the install page.",
                ),
                InstallError::MissingCode => {
                    (StatusCode::BAD_REQUEST, "The redirect did not carry an authorization code.")
                }
                InstallError::Provider(_) => {
                    (StatusCode::BAD_REQUEST, "Slack reported an authorization error.")
                }
                InstallError::Exchange(_) | InstallError::IncompleteExchange(_) => (
                    StatusCode::BAD_GATEWAY,
                    "The token exchange with Slack failed. Please try again shortly.",
                ),
                InstallError::Store(_) | InstallError::Domain(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The installation could not be saved. Please try again shortly.",
                ),
            };
            (status, Html(result_page("Installation failed", detail))).into_response()
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn unauthorized(request_id: &str, detail: &'static str) -> Response {
    warn!(
        event_name = "ingress.slack.unauthorized",
        correlation_id = %request_id,
        detail,
        "rejected unauthenticated webhook delivery"
    );
    (StatusCode::UNAUTHORIZED, detail).into_response()
}

fn result_page(title: &str, detail: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n<p>{detail}</p>\n</body>\n</html>\n"
    )
}

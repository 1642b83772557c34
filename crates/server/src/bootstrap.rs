use chrono::Utc;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, warn};

use herald_core::config::{AppConfig, ConfigError, LoadOptions};
use herald_db::repositories::{
    OAuthStateRepository, SqlInstallationRepository, SqlOAuthStateRepository,
};
use herald_db::{connect, ensure_ready, DbPool, SchemaReadiness};
use herald_slack::api::SlackApiClient;
use herald_slack::commands::{CommandRouter, DelegatedPostService};
use herald_slack::oauth::{InstallService, InstallSettings};
use herald_slack::signature::SignatureVerifier;

use crate::routes::SlackRoutesState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub routes_state: SlackRoutesState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("install store provisioning failed: {0}")]
    Provisioning(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let readiness = ensure_ready(&db_pool).await.map_err(BootstrapError::Provisioning)?;
    info!(
        event_name = "system.bootstrap.install_store_ready",
        correlation_id = "bootstrap",
        provisioned = matches!(readiness, SchemaReadiness::Provisioned),
        "install store schema ready"
    );

    // Abandoned install flows leave stale nonces behind.
    match SqlOAuthStateRepository::new(db_pool.clone()).purge_expired(Utc::now()).await {
        Ok(purged) if purged > 0 => info!(
            event_name = "system.bootstrap.oauth_states_purged",
            correlation_id = "bootstrap",
            purged,
            "purged expired oauth state nonces"
        ),
        Ok(_) => {}
        Err(error) => warn!(
            event_name = "system.bootstrap.oauth_state_purge_failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not purge expired oauth state nonces"
        ),
    }

    let routes_state = build_routes_state(&config, &db_pool);

    Ok(Application { config, db_pool, routes_state })
}

fn build_routes_state(config: &AppConfig, db_pool: &DbPool) -> SlackRoutesState {
    let api = SlackApiClient::new();
    let public_host = config.slack.public_host.trim_end_matches('/');
    let install_url = format!("{public_host}/slack/install");

    let settings = InstallSettings {
        client_id: config.slack.client_id.clone(),
        client_secret: config.slack.client_secret.expose_secret().to_string(),
        redirect_url: config.oauth_redirect_url(),
        install_url: install_url.clone(),
        bot_scopes: config.slack.bot_scopes.clone(),
        user_scopes: config.slack.user_scopes.clone(),
    };

    let install_service = InstallService::new(
        api.clone(),
        SqlInstallationRepository::new(db_pool.clone()),
        SqlOAuthStateRepository::new(db_pool.clone()),
        settings,
    );
    let command_router = CommandRouter::new(DelegatedPostService::new(
        api,
        SqlInstallationRepository::new(db_pool.clone()),
        install_url,
    ));
    let verifier = SignatureVerifier::new(config.slack.signing_secret.expose_secret());

    SlackRoutesState::new(install_service, command_router, verifier)
}

#[cfg(test)]
mod tests {
    use herald_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_client_id: Some("1111.2222".to_string()),
                slack_client_secret: Some("client-secret".to_string()),
                slack_signing_secret: Some("signing-secret".to_string()),
                slack_public_host: Some("https://herald.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_client_id: Some("1111.2222".to_string()),
                slack_client_secret: Some("client-secret".to_string()),
                slack_signing_secret: Some("signing-secret".to_string()),
                slack_public_host: Some("herald.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.public_host"));
    }

    #[tokio::test]
    async fn bootstrap_provisions_the_install_store() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('slack_installation', 'slack_oauth_state')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected install store tables to be available after bootstrap");
        assert_eq!(table_count, 2, "bootstrap should expose both install store tables");

        app.db_pool.close().await;
    }
}

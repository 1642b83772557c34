use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub signing_secret: SecretString,
    pub public_host: String,
    pub bot_scopes: String,
    pub user_scopes: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_client_id: Option<String>,
    pub slack_client_secret: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_public_host: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://herald.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                client_id: String::new(),
                client_secret: String::new().into(),
                signing_secret: String::new().into(),
                public_host: String::new(),
                bot_scopes: "commands".to_string(),
                user_scopes: "chat:write".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("herald.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(client_id) = slack.client_id {
                self.slack.client_id = client_id;
            }
            if let Some(client_secret_value) = slack.client_secret {
                self.slack.client_secret = secret_value(client_secret_value);
            }
            if let Some(signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret_value);
            }
            if let Some(public_host) = slack.public_host {
                self.slack.public_host = public_host;
            }
            if let Some(bot_scopes) = slack.bot_scopes {
                self.slack.bot_scopes = bot_scopes;
            }
            if let Some(user_scopes) = slack.user_scopes {
                self.slack.user_scopes = user_scopes;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HERALD_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HERALD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("HERALD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HERALD_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HERALD_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HERALD_SLACK_CLIENT_ID") {
            self.slack.client_id = value;
        }
        if let Some(value) = read_env("HERALD_SLACK_CLIENT_SECRET") {
            self.slack.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("HERALD_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("HERALD_SLACK_PUBLIC_HOST") {
            self.slack.public_host = value;
        }
        if let Some(value) = read_env("HERALD_SLACK_BOT_SCOPES") {
            self.slack.bot_scopes = value;
        }
        if let Some(value) = read_env("HERALD_SLACK_USER_SCOPES") {
            self.slack.user_scopes = value;
        }

        if let Some(value) = read_env("HERALD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HERALD_SERVER_PORT") {
            self.server.port = parse_u16("HERALD_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HERALD_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HERALD_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("HERALD_LOGGING_LEVEL").or_else(|| read_env("HERALD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HERALD_LOGGING_FORMAT").or_else(|| read_env("HERALD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(client_id) = overrides.slack_client_id {
            self.slack.client_id = client_id;
        }
        if let Some(client_secret) = overrides.slack_client_secret {
            self.slack.client_secret = secret_value(client_secret);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(public_host) = overrides.slack_public_host {
            self.slack.public_host = public_host;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Redirect URI registered with the Slack app and sent on both OAuth legs.
    pub fn oauth_redirect_url(&self) -> String {
        format!("{}/slack/oauth_redirect", self.slack.public_host.trim_end_matches('/'))
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("herald.toml"), PathBuf::from("config/herald.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if slack.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.client_id is required. Get it from https://api.slack.com/apps > Your App > Basic Information".to_string()
        ));
    }

    if slack.client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.client_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information".to_string()
        ));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information".to_string()
        ));
    }

    let public_host = slack.public_host.trim();
    if public_host.is_empty() {
        return Err(ConfigError::Validation(
            "slack.public_host is required so the OAuth redirect URL can be built (e.g. `https://herald.example.com`)".to_string()
        ));
    }
    if !public_host.starts_with("http://") && !public_host.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.public_host must start with http:// or https://".to_string(),
        ));
    }

    if slack.bot_scopes.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_scopes must name at least one scope (default `commands`)".to_string(),
        ));
    }
    if slack.user_scopes.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.user_scopes must name at least one scope (default `chat:write`)".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    client_id: Option<String>,
    client_secret: Option<String>,
    signing_secret: Option<String>,
    public_host: Option<String>,
    bot_scopes: Option<String>,
    user_scopes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn set_required_slack_vars() {
        env::set_var("HERALD_SLACK_CLIENT_ID", "1234567890.0987654321");
        env::set_var("HERALD_SLACK_CLIENT_SECRET", "client-secret-test");
        env::set_var("HERALD_SLACK_SIGNING_SECRET", "signing-secret-test");
        env::set_var("HERALD_SLACK_PUBLIC_HOST", "https://herald.test");
    }

    const REQUIRED_SLACK_VARS: &[&str] = &[
        "HERALD_SLACK_CLIENT_ID",
        "HERALD_SLACK_CLIENT_SECRET",
        "HERALD_SLACK_SIGNING_SECRET",
        "HERALD_SLACK_PUBLIC_HOST",
    ];

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SLACK_CLIENT_SECRET", "secret-from-env");
        env::set_var("TEST_SLACK_SIGNING_SECRET", "signing-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("herald.toml");
            fs::write(
                &path,
                r#"
[slack]
client_id = "1111.2222"
client_secret = "${TEST_SLACK_CLIENT_SECRET}"
signing_secret = "${TEST_SLACK_SIGNING_SECRET}"
public_host = "https://herald.test"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.slack.client_secret.expose_secret() == "secret-from-env",
                "client secret should be loaded from environment",
            )?;
            ensure(
                config.slack.signing_secret.expose_secret() == "signing-from-env",
                "signing secret should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SLACK_CLIENT_SECRET", "TEST_SLACK_SIGNING_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_slack_vars();
        env::set_var("HERALD_LOG_LEVEL", "warn");
        env::set_var("HERALD_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_SLACK_VARS);
        clear_vars(&["HERALD_LOG_LEVEL", "HERALD_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_slack_vars();
        env::set_var("HERALD_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("herald.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[slack]
client_id = "file.client"
client_secret = "file-client-secret"
signing_secret = "file-signing-secret"
public_host = "https://file.test"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.slack.client_id == "1234567890.0987654321",
                "env client id should win over file and defaults",
            )?;
            ensure(
                config.slack.public_host == "https://herald.test",
                "env public host should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_SLACK_VARS);
        clear_vars(&["HERALD_DATABASE_URL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_slack_vars();
        env::set_var("HERALD_SLACK_PUBLIC_HOST", "herald.test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.public_host")
            );
            ensure(has_message, "validation failure should mention slack.public_host")
        })();

        clear_vars(REQUIRED_SLACK_VARS);
        result
    }

    #[test]
    fn oauth_redirect_url_strips_trailing_slash() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_slack_vars();
        env::set_var("HERALD_SLACK_PUBLIC_HOST", "https://herald.test/");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.oauth_redirect_url() == "https://herald.test/slack/oauth_redirect",
                "redirect url should join the path without a double slash",
            )
        })();

        clear_vars(REQUIRED_SLACK_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_slack_vars();
        env::set_var("HERALD_SLACK_CLIENT_SECRET", "client-secret-value");
        env::set_var("HERALD_SLACK_SIGNING_SECRET", "signing-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("client-secret-value"),
                "debug output should not contain the client secret",
            )?;
            ensure(
                !debug.contains("signing-secret-value"),
                "debug output should not contain the signing secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_SLACK_VARS);
        result
    }
}

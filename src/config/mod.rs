//! Configuration module for the gifting backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// JWT secret used when none is configured. Rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "change-me";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Google OAuth client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    pub environment: Environment,
    /// HMAC secret for signing session tokens
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    /// Frontend origin, used for CORS and the post-login redirect
    pub frontend_url: String,
    /// None when the Google client id, secret or callback URL is missing
    pub oauth: Option<OAuthConfig>,
    /// Populate demo data on startup
    pub seed: bool,
}

/// Invalid or missing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {}: {:?}", var, value),
            ConfigError::Missing(var) => write!(f, "{} must be set in production", var),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("GIFTING_DB_PATH")
            .unwrap_or_else(|_| "./data/gifting.sqlite".to_string())
            .into();

        let bind_addr_raw =
            env::var("GIFTING_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
        let bind_addr = bind_addr_raw.parse().map_err(|_| ConfigError::Invalid {
            var: "GIFTING_BIND_ADDR",
            value: bind_addr_raw.clone(),
        })?;

        let log_level = env::var("GIFTING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("GIFTING_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    var: "GIFTING_LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let environment = match env::var("GIFTING_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let jwt_secret = match env::var("GIFTING_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == Environment::Production => {
                return Err(ConfigError::Missing("GIFTING_JWT_SECRET"))
            }
            _ => DEFAULT_JWT_SECRET.to_string(),
        };

        let jwt_ttl_hours = match env::var("GIFTING_JWT_TTL_HOURS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::Invalid {
                    var: "GIFTING_JWT_TTL_HOURS",
                    value: raw,
                })?,
            Err(_) => 24,
        };

        let frontend_url = env::var("GIFTING_FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let oauth = match (
            env::var("GIFTING_GOOGLE_CLIENT_ID"),
            env::var("GIFTING_GOOGLE_CLIENT_SECRET"),
            env::var("GIFTING_OAUTH_CALLBACK_URL"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(callback_url)) => Some(OAuthConfig {
                client_id,
                client_secret,
                callback_url,
                auth_url: env::var("GIFTING_GOOGLE_AUTH_URL")
                    .unwrap_or_else(|_| crate::auth::oauth::GOOGLE_AUTH_URL.to_string()),
                token_url: env::var("GIFTING_GOOGLE_TOKEN_URL")
                    .unwrap_or_else(|_| crate::auth::oauth::GOOGLE_TOKEN_URL.to_string()),
                userinfo_url: env::var("GIFTING_GOOGLE_USERINFO_URL")
                    .unwrap_or_else(|_| crate::auth::oauth::GOOGLE_USERINFO_URL.to_string()),
            }),
            _ => None,
        };

        let seed = matches!(
            env::var("GIFTING_SEED").as_deref(),
            Ok("1") | Ok("true") | Ok("yes")
        );

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            log_format,
            environment,
            jwt_secret,
            jwt_ttl_hours,
            frontend_url,
            oauth,
            seed,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "GIFTING_DB_PATH",
        "GIFTING_BIND_ADDR",
        "GIFTING_LOG_LEVEL",
        "GIFTING_LOG_FORMAT",
        "GIFTING_ENV",
        "GIFTING_JWT_SECRET",
        "GIFTING_JWT_TTL_HOURS",
        "GIFTING_FRONTEND_URL",
        "GIFTING_GOOGLE_CLIENT_ID",
        "GIFTING_GOOGLE_CLIENT_SECRET",
        "GIFTING_OAUTH_CALLBACK_URL",
        "GIFTING_SEED",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/gifting.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3001");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert!(config.oauth.is_none());
        assert!(!config.seed);
    }

    #[test]
    fn test_production_requires_secret() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("GIFTING_ENV", "production");

        let result = Config::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::Missing("GIFTING_JWT_SECRET"))));
    }

    #[test]
    fn test_invalid_bind_addr() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("GIFTING_BIND_ADDR", "not-an-address");

        let result = Config::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { var: "GIFTING_BIND_ADDR", .. })
        ));
    }

    #[test]
    fn test_oauth_requires_all_three_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("GIFTING_GOOGLE_CLIENT_ID", "client");
        env::set_var("GIFTING_GOOGLE_CLIENT_SECRET", "secret");

        let partial = Config::from_env().unwrap();
        assert!(partial.oauth.is_none());

        env::set_var("GIFTING_OAUTH_CALLBACK_URL", "http://localhost:3001/api/v1/auth/callback");
        let full = Config::from_env().unwrap();
        clear_env();

        let oauth = full.oauth.unwrap();
        assert_eq!(oauth.client_id, "client");
        assert_eq!(oauth.token_url, crate::auth::oauth::GOOGLE_TOKEN_URL);
    }
}

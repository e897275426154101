//! Environment-driven server configuration.
//!
//! Values are read once at startup. [`ServerConfig::from_lookup`] takes the
//! variable source as a closure so tests never touch the process environment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

const MIN_PROD_SECRET_LEN: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
    #[error("Invalid secret key: {0}")]
    InvalidSecret(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl AppEnv {
    /// Production-like environments refuse to start without auth.
    pub fn is_prod_like(&self) -> bool {
        matches!(self, AppEnv::Staging | AppEnv::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Test => "test",
            AppEnv::Staging => "staging",
            AppEnv::Production => "production",
        }
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "staging" => Ok(AppEnv::Staging),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Build and deployment metadata reported by `/version`.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    pub git_sha: Option<String>,
    pub fly_alloc_id: Option<String>,
    pub fly_machine_id: Option<String>,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub env: AppEnv,
    pub addr: String,
    pub database_url: String,
    /// `None` disables auth entirely.
    pub jwt_secret: Option<SecretString>,
    pub token_ttl: Duration,
    pub login_token_ttl: Duration,
    pub rate_limit: RateLimitConfig,
    /// `*` allows any origin.
    pub cors_origins: Vec<String>,
    pub metrics_enabled: bool,
    pub build: BuildInfo,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: AppEnv::Development,
            addr: "0.0.0.0:3000".to_string(),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: None,
            token_ttl: Duration::from_secs(3600),
            login_token_ttl: Duration::from_secs(8 * 3600),
            rate_limit: RateLimitConfig::default(),
            cors_origins: vec!["*".to_string()],
            metrics_enabled: true,
            build: BuildInfo::default(),
        }
    }
}

impl ServerConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let env = parse_or("APP_ENV", get("APP_ENV"), defaults.env)?;
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or("PORT", get("PORT"), 3000)?;

        let config = Self {
            env,
            addr: format!("{host}:{port}"),
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret: get("JWT_SECRET").map(SecretString::from),
            token_ttl: Duration::from_secs(parse_or(
                "TOKEN_TTL_SECS",
                get("TOKEN_TTL_SECS"),
                defaults.token_ttl.as_secs(),
            )?),
            login_token_ttl: Duration::from_secs(parse_or(
                "LOGIN_TOKEN_TTL_SECS",
                get("LOGIN_TOKEN_TTL_SECS"),
                defaults.login_token_ttl.as_secs(),
            )?),
            rate_limit: RateLimitConfig {
                max_requests: parse_or(
                    "RATE_LIMIT_MAX",
                    get("RATE_LIMIT_MAX"),
                    defaults.rate_limit.max_requests,
                )?,
                window: Duration::from_secs(parse_or(
                    "RATE_LIMIT_WINDOW_SECS",
                    get("RATE_LIMIT_WINDOW_SECS"),
                    defaults.rate_limit.window.as_secs(),
                )?),
            },
            cors_origins: get("CORS_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.cors_origins),
            metrics_enabled: get("METRICS_ENABLED")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            build: BuildInfo {
                git_sha: get("GIT_SHA"),
                fly_alloc_id: get("FLY_ALLOC_ID"),
                fly_machine_id: get("FLY_MACHINE_ID"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn auth_enabled(&self) -> bool {
        self.jwt_secret.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.env.is_prod_like() {
            match &self.jwt_secret {
                None => return Err(ConfigError::MissingRequired("JWT_SECRET".to_string())),
                Some(secret) if secret.expose_secret().len() < MIN_PROD_SECRET_LEN => {
                    return Err(ConfigError::InvalidSecret(format!(
                        "JWT_SECRET must be at least {MIN_PROD_SECRET_LEN} characters"
                    )));
                }
                Some(_) => {}
            }
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ParseError {
                name: "RATE_LIMIT_MAX".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::ParseError {
                name: "RATE_LIMIT_WINDOW_SECS".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.token_ttl.is_zero() || self.login_token_ttl.is_zero() {
            return Err(ConfigError::ParseError {
                name: "TOKEN_TTL_SECS".to_string(),
                reason: "token lifetimes must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Development default values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "postgres://wm:wm@localhost:6432/wm";
    pub const DEV_HOST: &str = "127.0.0.1";
    pub const DEV_PORT: u16 = 8080;
    pub const WORKFLOW_TIMEOUT_SECS: u64 = 1800;
    pub const BUILD_TIMEOUT_SECS: u64 = 84600;
    pub const CACHE_DEFAULT_TIMEOUT_SECS: u64 = 300;
    pub const TASK_EXPIRATION_SECS: u64 = 1800;
    pub const CI_CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const CI_REQUEST_TIMEOUT_SECS: u64 = 30;
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Check if this is a development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Check if this is a production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Cache and scheduling timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Workflow metadata cache timeout (drives `check_workflows`)
    pub workflow: Duration,
    /// Build cache timeout (drives `check_last_build` and `periodic_builds`)
    pub build: Duration,
    /// Default TTL for cached project metadata
    pub cache_default: Duration,
    /// Age after which a pending job invocation is dropped
    pub task_expiration: Duration,
    /// Connect timeout for CI backend requests
    pub ci_connect: Duration,
    /// Total timeout for CI backend requests
    pub ci_request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            workflow: Duration::from_secs(defaults::WORKFLOW_TIMEOUT_SECS),
            build: Duration::from_secs(defaults::BUILD_TIMEOUT_SECS),
            cache_default: Duration::from_secs(defaults::CACHE_DEFAULT_TIMEOUT_SECS),
            task_expiration: Duration::from_secs(defaults::TASK_EXPIRATION_SECS),
            ci_connect: Duration::from_secs(defaults::CI_CONNECT_TIMEOUT_SECS),
            ci_request: Duration::from_secs(defaults::CI_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime environment
    pub environment: Environment,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL (PostgreSQL connection string)
    pub database_url: String,
    /// Cache and scheduling timeouts
    pub timeouts: Timeouts,
    /// Start the reconciliation scheduler together with the server
    pub scheduler_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (RUST_ENV=development) every variable has a default.
    /// In production mode (RUST_ENV=production) DATABASE_URL must be set and
    /// must not be the development default.
    ///
    /// Environment variables:
    /// - `RUST_ENV`: Environment (development/production) - REQUIRED
    /// - `WM_HOST`: Server host (default: 127.0.0.1)
    /// - `WM_PORT`: Server port (default: 8080)
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `WM_WORKFLOW_TIMEOUT_SECS`: Workflow cache timeout (default: 1800)
    /// - `WM_BUILD_TIMEOUT_SECS`: Build cache timeout (default: 84600)
    /// - `WM_CACHE_DEFAULT_TIMEOUT_SECS`: Project metadata TTL (default: 300)
    /// - `WM_TASK_EXPIRATION_SECS`: Max age of a pending job invocation (default: 1800)
    /// - `WM_CI_CONNECT_TIMEOUT_SECS`: CI connect timeout (default: 5)
    /// - `WM_CI_REQUEST_TIMEOUT_SECS`: CI request timeout (default: 30)
    /// - `WM_SCHEDULER_ENABLED`: Run the scheduler in-process (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str = env::var("RUST_ENV").map_err(|_| ConfigError::MissingEnvVar("RUST_ENV"))?;

        let environment = Environment::parse(&env_str).ok_or(ConfigError::InvalidValue(
            "RUST_ENV must be 'development' or 'production'",
        ))?;

        let host = env::var("WM_HOST").unwrap_or_else(|_| defaults::DEV_HOST.to_string());

        let port = env::var("WM_PORT")
            .unwrap_or_else(|_| defaults::DEV_PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue("WM_PORT must be a valid port number"))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string());

        let timeouts = Timeouts {
            workflow: secs_var(
                "WM_WORKFLOW_TIMEOUT_SECS",
                defaults::WORKFLOW_TIMEOUT_SECS,
                "WM_WORKFLOW_TIMEOUT_SECS must be a positive number",
            )?,
            build: secs_var(
                "WM_BUILD_TIMEOUT_SECS",
                defaults::BUILD_TIMEOUT_SECS,
                "WM_BUILD_TIMEOUT_SECS must be a positive number",
            )?,
            cache_default: secs_var(
                "WM_CACHE_DEFAULT_TIMEOUT_SECS",
                defaults::CACHE_DEFAULT_TIMEOUT_SECS,
                "WM_CACHE_DEFAULT_TIMEOUT_SECS must be a positive number",
            )?,
            task_expiration: secs_var(
                "WM_TASK_EXPIRATION_SECS",
                defaults::TASK_EXPIRATION_SECS,
                "WM_TASK_EXPIRATION_SECS must be a positive number",
            )?,
            ci_connect: secs_var(
                "WM_CI_CONNECT_TIMEOUT_SECS",
                defaults::CI_CONNECT_TIMEOUT_SECS,
                "WM_CI_CONNECT_TIMEOUT_SECS must be a positive number",
            )?,
            ci_request: secs_var(
                "WM_CI_REQUEST_TIMEOUT_SECS",
                defaults::CI_REQUEST_TIMEOUT_SECS,
                "WM_CI_REQUEST_TIMEOUT_SECS must be a positive number",
            )?,
        };

        let scheduler_enabled = match env::var("WM_SCHEDULER_ENABLED") {
            Ok(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue(
                "WM_SCHEDULER_ENABLED must be true or false",
            ))?,
            Err(_) => true,
        };

        let config = Config {
            environment,
            host,
            port,
            database_url,
            timeouts,
            scheduler_enabled,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database_url == defaults::DEV_DATABASE_URL {
            errors.push(format!(
                "DATABASE_URL is using development default '{}'. Set a production PostgreSQL URL.",
                defaults::DEV_DATABASE_URL
            ));
        }

        if self.timeouts.cache_default > self.timeouts.build {
            errors.push(
                "WM_CACHE_DEFAULT_TIMEOUT_SECS exceeds WM_BUILD_TIMEOUT_SECS; polls would read stale metadata."
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

fn secs_var(
    name: &'static str,
    default: u64,
    message: &'static str,
) -> Result<Duration, ConfigError> {
    let secs = match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue(message))?,
        Err(_) => default,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidValue(message));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}

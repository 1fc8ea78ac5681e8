//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use bigdecimal::BigDecimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub recharge: RechargeConfig,
    pub monitor: MonitorConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Bearer token verification settings
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// PhonePe deployment the merchant credentials belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            GatewayEnvironment::Production => "https://api.phonepe.com/apis/hermes",
            GatewayEnvironment::Sandbox => "https://api-preprod.phonepe.com/apis/pg-sandbox",
        }
    }
}

impl FromStr for GatewayEnvironment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "PROD" | "PRODUCTION" => Ok(GatewayEnvironment::Production),
            "UAT" | "SANDBOX" => Ok(GatewayEnvironment::Sandbox),
            _ => Err(ConfigError::InvalidValue("PHONEPE_ENV".to_string())),
        }
    }
}

/// Payment gateway credentials and endpoints
#[derive(Clone)]
pub struct GatewayConfig {
    pub merchant_id: String,
    pub salt_key: String,
    pub salt_index: String,
    pub environment: GatewayEnvironment,
    pub base_url: String,
    /// Browser is sent back here after the hosted payment page
    pub frontend_url: String,
    /// Public base URL of this service, used for the server-to-server callback
    pub backend_url: String,
    pub redirect_mode: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("merchant_id", &self.merchant_id)
            .field("salt_key", &"<redacted>")
            .field("salt_index", &self.salt_index)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("frontend_url", &self.frontend_url)
            .field("backend_url", &self.backend_url)
            .field("redirect_mode", &self.redirect_mode)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// How `POST /recharge/verify` bodies are shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Client polls with `{rechargeId, merchantTransactionId}`
    Poll,
    /// Gateway posts `{merchantTransactionId, code, transactionId}`
    Callback,
}

impl FromStr for VerificationMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "poll" | "polling" => Ok(VerificationMode::Poll),
            "callback" => Ok(VerificationMode::Callback),
            _ => Err(ConfigError::InvalidValue(
                "RECHARGE_VERIFY_MODE".to_string(),
            )),
        }
    }
}

/// Recharge workflow limits
#[derive(Debug, Clone)]
pub struct RechargeConfig {
    pub min_amount: BigDecimal,
    pub max_amount: BigDecimal,
    pub verification_mode: VerificationMode,
}

impl Default for RechargeConfig {
    fn default() -> Self {
        Self {
            min_amount: BigDecimal::from(1),
            max_amount: BigDecimal::from(100_000),
            verification_mode: VerificationMode::Poll,
        }
    }
}

/// Pending-recharge reconciliation worker settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Pending records younger than this are left to the callback
    pub min_age: Duration,
    /// Pending records older than this are no longer polled
    pub window: Duration,
    pub batch_size: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            min_age: Duration::from_secs(120),
            window: Duration::from_secs(24 * 3600),
            batch_size: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            recharge: RechargeConfig::from_env()?,
            monitor: MonitorConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.gateway.validate()?;
        self.recharge.validate()?;
        self.monitor.validate()?;

        Ok(())
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingVariable(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_or("SERVER_PORT", 8080)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parsed_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: parsed_or("DB_MIN_CONNECTIONS", 1)?,
            connection_timeout: parsed_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
        })
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment: GatewayEnvironment = required("PHONEPE_ENV")?.parse()?;
        let base_url = env::var("PHONEPE_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| environment.default_base_url().to_string());

        Ok(GatewayConfig {
            merchant_id: required("PHONEPE_MERCHANT_ID")?,
            salt_key: required("PHONEPE_SALT_KEY")?,
            salt_index: required("PHONEPE_SALT_INDEX")?,
            environment,
            base_url,
            frontend_url: required("FRONTEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            backend_url: required("BACKEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            redirect_mode: env::var("PHONEPE_REDIRECT_MODE")
                .ok()
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty()),
            timeout_secs: parsed_or("PHONEPE_TIMEOUT_SECS", 30)?,
            max_retries: parsed_or("PHONEPE_MAX_RETRIES", 0)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.base_url) {
            return Err(ConfigError::InvalidValue(
                "PHONEPE_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if !is_http_url(&self.frontend_url) {
            return Err(ConfigError::InvalidValue(
                "FRONTEND_URL must be a valid URL".to_string(),
            ));
        }
        if !is_http_url(&self.backend_url) {
            return Err(ConfigError::InvalidValue(
                "BACKEND_URL must be a valid URL".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PHONEPE_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl RechargeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RechargeConfig::default();
        Ok(RechargeConfig {
            min_amount: parsed_or("RECHARGE_MIN_AMOUNT", defaults.min_amount)?,
            max_amount: parsed_or("RECHARGE_MAX_AMOUNT", defaults.max_amount)?,
            verification_mode: parsed_or("RECHARGE_VERIFY_MODE", defaults.verification_mode)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_amount < BigDecimal::from(1) {
            return Err(ConfigError::ValidationFailed(
                "RECHARGE_MIN_AMOUNT must be at least 1".to_string(),
            ));
        }
        if self.max_amount < self.min_amount {
            return Err(ConfigError::ValidationFailed(
                "RECHARGE_MAX_AMOUNT must be >= RECHARGE_MIN_AMOUNT".to_string(),
            ));
        }

        Ok(())
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = MonitorConfig::default();
        Ok(MonitorConfig {
            enabled: parsed_or("RECHARGE_MONITOR_ENABLED", defaults.enabled)?,
            poll_interval: Duration::from_secs(parsed_or(
                "RECHARGE_MONITOR_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            min_age: Duration::from_secs(parsed_or(
                "RECHARGE_MONITOR_MIN_AGE_SECS",
                defaults.min_age.as_secs(),
            )?),
            window: Duration::from_secs(
                parsed_or::<u64>(
                    "RECHARGE_MONITOR_WINDOW_HOURS",
                    defaults.window.as_secs() / 3600,
                )?
                .checked_mul(3600)
                .ok_or_else(|| {
                    ConfigError::InvalidValue("RECHARGE_MONITOR_WINDOW_HOURS".to_string())
                })?,
            ),
            batch_size: parsed_or("RECHARGE_MONITOR_BATCH_SIZE", defaults.batch_size)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RECHARGE_MONITOR_POLL_INTERVAL_SECS".to_string(),
            ));
        }
        if self.batch_size <= 0 {
            return Err(ConfigError::InvalidValue(
                "RECHARGE_MONITOR_BATCH_SIZE".to_string(),
            ));
        }
        if self.window <= self.min_age {
            return Err(ConfigError::ValidationFailed(
                "RECHARGE_MONITOR_WINDOW_HOURS must exceed RECHARGE_MONITOR_MIN_AGE_SECS"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://job-tracker.db?mode=rwc";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Connection parameters for the Cosmos DB container holding job documents.
#[derive(Clone, PartialEq, Eq)]
pub struct CosmosConfig {
    pub endpoint: String,
    pub key: String,
    pub database: String,
    pub container: String,
}

impl fmt::Debug for CosmosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

/// Which document store backs the job endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Sqlite { database_url: String },
    Cosmos(CosmosConfig),
}

impl StoreConfig {
    /// Resolves the backend from `JOB_STORE`, falling back to Cosmos when
    /// `COSMOS_DB_ENDPOINT` is set and SQLite otherwise.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = match env::var("JOB_STORE") {
            Ok(value) => value.trim().to_ascii_lowercase(),
            Err(_) if env::var("COSMOS_DB_ENDPOINT").is_ok() => "cosmos".to_string(),
            Err(_) => "sqlite".to_string(),
        };

        match kind.as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite {
                database_url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            }),
            "cosmos" => Ok(Self::Cosmos(CosmosConfig {
                endpoint: required_var("COSMOS_DB_ENDPOINT")?,
                key: required_var("COSMOS_DB_KEY")?,
                database: required_var("COSMOS_DB_DATABASE_NAME")?,
                container: required_var("COSMOS_DB_CONTAINER_NAME")?,
            })),
            other => Err(ConfigError::InvalidStore(other.to_string())),
        }
    }

    /// Returns the backend name used for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite { .. } => "sqlite",
            Self::Cosmos(_) => "cosmos",
        }
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let store = StoreConfig::from_env()?;

        Ok(Self {
            bind_addr,
            environment,
            store,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidStore(String),
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidStore(value) => write!(
                f,
                "JOB_STORE must be one of 'memory', 'sqlite', or 'cosmos' (got {value})"
            ),
            Self::MissingVar(name) => write!(f, "{name} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {}

//! # Configuration
//!
//! Process configuration, layered with the `config` crate:
//!
//! ```text
//! built-in defaults → optional file (toml/yaml/json) → DEALDESK__* environment
//! ```
//!
//! Nested keys use a double underscore, e.g. `DEALDESK__STORE__BACKEND=rest`
//! or `DEALDESK__STRATEGY__TTL_SECS=3600`. A `.env` file in the working
//! directory is read first.

use crate::application::error::InfrastructureError;
use crate::application::services::automated_response::DEFAULT_DEDUPE_CAPACITY;
use crate::application::services::negotiation::NegotiationSettings;
use crate::domain::services::strategy_calculator::StrategyPolicy;
use crate::domain::value_objects::PartyId;
use crate::infrastructure::persistence::RetryPolicy;
use crate::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DEALDESK";

/// Which data store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; lost on exit.
    #[default]
    Memory,
    /// PostgreSQL, JSONB rows.
    Postgres,
    /// Hosted PostgREST-style HTTP API.
    Rest,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::Rest => "rest",
        })
    }
}

/// Data store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind.
    pub backend: StoreBackend,
    /// Database URL or REST base URL.
    pub url: Option<String>,
    /// API key for the REST backend.
    pub api_key: Option<String>,
    /// Request timeout for the REST backend.
    pub timeout_ms: u64,
    /// Pool size for the Postgres backend.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            api_key: None,
            timeout_ms: 5_000,
            max_connections: 10,
        }
    }
}

/// Automated response settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Responses remembered for duplicate offers.
    pub dedupe_capacity: usize,
    /// Attempts per write before a contended deal is given up on.
    pub max_cas_retries: u32,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            dedupe_capacity: DEFAULT_DEDUPE_CAPACITY,
            max_cas_retries: 5,
        }
    }
}

/// Message log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Refresh interval of message polling.
    pub poll_interval_secs: u64,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
        }
    }
}

/// Background expiry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Sweep interval; no sweeper runs when unset.
    pub sweep_interval_secs: Option<u64>,
}

/// Market data settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Region used when a caller names none.
    pub default_region: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_region: "default".to_string(),
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Data store.
    pub store: StoreConfig,
    /// Transient-failure retries at the store boundary.
    pub retry: RetryPolicy,
    /// Strategy policy.
    pub strategy: StrategyPolicy,
    /// Automated responses.
    pub automation: AutomationConfig,
    /// Message log.
    pub messages: MessagesConfig,
    /// Background expiry.
    pub expiry: ExpiryConfig,
    /// Logging.
    pub telemetry: TelemetryConfig,
    /// Market data.
    pub market: MarketConfig,
}

impl AppConfig {
    /// Loads `.env`, then defaults, `file` and `DEALDESK__*` variables.
    ///
    /// # Errors
    ///
    /// Returns `InfrastructureError::Configuration` if a source cannot be
    /// read or the result is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, InfrastructureError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    /// Like [`AppConfig::load`] without `.env`, reading `{prefix}__*` variables.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::load`].
    pub fn load_with_prefix(file: Option<&Path>, prefix: &str) -> Result<Self, InfrastructureError> {
        Self::from_sources(file, environment(prefix))
    }

    fn from_sources(
        file: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, InfrastructureError> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let loaded: Self = builder
            .add_source(environment)
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Rejects settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InfrastructureError::Configuration` naming the first bad value.
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        self.retry
            .validate()
            .map_err(InfrastructureError::configuration)?;
        self.strategy
            .validate()
            .map_err(|e| InfrastructureError::configuration(format!("strategy: {e}")))?;
        if self.store.backend != StoreBackend::Memory
            && self.store.url.as_deref().is_none_or(|url| url.trim().is_empty())
        {
            return Err(InfrastructureError::configuration(format!(
                "store.url is required for the {} backend",
                self.store.backend
            )));
        }
        if self.store.timeout_ms == 0 || self.store.max_connections == 0 {
            return Err(InfrastructureError::configuration(
                "store.timeout_ms and store.max_connections must be positive",
            ));
        }
        if self.automation.max_cas_retries == 0 {
            return Err(InfrastructureError::configuration(
                "automation.max_cas_retries must be at least 1",
            ));
        }
        if self.messages.poll_interval_secs == 0 {
            return Err(InfrastructureError::configuration(
                "messages.poll_interval_secs must be positive",
            ));
        }
        if self.expiry.sweep_interval_secs == Some(0) {
            return Err(InfrastructureError::configuration(
                "expiry.sweep_interval_secs must be positive when set",
            ));
        }
        if self.market.default_region.trim().is_empty() {
            return Err(InfrastructureError::configuration(
                "market.default_region must not be empty",
            ));
        }
        Ok(())
    }

    /// Settings for the negotiation service.
    #[must_use]
    pub fn negotiation_settings(&self) -> NegotiationSettings {
        NegotiationSettings {
            max_cas_retries: self.automation.max_cas_retries,
            system_actor: PartyId::new("system"),
            default_region: self.market.default_region.clone(),
        }
    }

    /// Message polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.messages.poll_interval_secs)
    }

    /// Expiry sweep interval, if a sweeper should run.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.expiry.sweep_interval_secs.map(Duration::from_secs)
    }
}

fn environment(prefix: &str) -> config::Environment {
    config::Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn config_error(error: config::ConfigError) -> InfrastructureError {
    InfrastructureError::configuration(error.to_string())
}

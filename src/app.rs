//! # Application Wiring
//!
//! Builds the store, services and background tasks described by an
//! [`AppConfig`].
//!
//! ```text
//! AppConfig ─► DataStore (memory | postgres | rest) ─► RetryingDataStore
//!                   │
//!                   ├─► DealRepository ────────┐
//!                   └─► DealMessageRepository ─┴─► NegotiationService ─► AutomatedResponseEngine
//! ```

use crate::application::error::InfrastructureError;
use crate::application::services::automated_response::AutomatedResponseEngine;
use crate::application::services::market_metrics::MarketMetricsProvider;
use crate::application::services::message_log::DealMessageLog;
use crate::application::services::negotiation::NegotiationService;
use crate::application::services::notification::NotificationSink;
use crate::config::{AppConfig, StoreBackend, StoreConfig};
use crate::domain::services::strategy_calculator::StrategyCalculator;
use crate::infrastructure::persistence::in_memory::InMemoryDataStore;
use crate::infrastructure::persistence::postgres::PostgresDataStore;
use crate::infrastructure::persistence::rest::RestDataStore;
use crate::infrastructure::persistence::{
    DataStore, DealMessageRepository, DealRepository, RetryPolicy, RetryingDataStore,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running negotiation desk.
///
/// Dropping it stops the expiry sweeper, if one was started.
#[derive(Debug)]
pub struct DealDesk {
    service: NegotiationService,
    engine: AutomatedResponseEngine,
    store: Arc<dyn DataStore>,
    sweeper: Option<JoinHandle<()>>,
}

impl DealDesk {
    /// Connects the configured store and assembles the services.
    ///
    /// Starts the expiry sweeper when `expiry.sweep_interval_secs` is set,
    /// so it must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `InfrastructureError::Configuration` if the configuration is invalid
    /// - `InfrastructureError::Repository` if the store cannot be prepared
    pub async fn build(
        config: &AppConfig,
        metrics: Arc<dyn MarketMetricsProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, InfrastructureError> {
        config.validate()?;
        let backend = connect_store(&config.store).await?;
        let mut desk = Self::assemble(backend, config, metrics, notifier);
        if let Some(interval) = config.sweep_interval() {
            desk.sweeper = Some(desk.service.spawn_expiry_sweeper(interval));
        }
        info!(
            backend = %config.store.backend,
            sweeper = desk.sweeper.is_some(),
            "deal desk ready"
        );
        Ok(desk)
    }

    /// Assembles the services over an in-memory store with default settings.
    #[must_use]
    pub fn in_memory(
        metrics: Arc<dyn MarketMetricsProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let mut config = AppConfig::default();
        config.retry = RetryPolicy::none();
        Self::assemble(Arc::new(InMemoryDataStore::new()), &config, metrics, notifier)
    }

    fn assemble(
        backend: Arc<dyn DataStore>,
        config: &AppConfig,
        metrics: Arc<dyn MarketMetricsProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let store: Arc<dyn DataStore> = Arc::new(RetryingDataStore::new(backend, config.retry));
        let service = NegotiationService::new(
            DealRepository::new(Arc::clone(&store)),
            DealMessageLog::new(DealMessageRepository::new(Arc::clone(&store))),
            StrategyCalculator::new(config.strategy.clone()),
            metrics,
            Arc::clone(&notifier),
            config.negotiation_settings(),
        );
        let engine =
            AutomatedResponseEngine::new(service.clone(), notifier, config.automation.dedupe_capacity);
        Self {
            service,
            engine,
            store,
            sweeper: None,
        }
    }

    /// Returns the negotiation service.
    #[inline]
    #[must_use]
    pub fn service(&self) -> &NegotiationService {
        &self.service
    }

    /// Returns the automated response engine.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &AutomatedResponseEngine {
        &self.engine
    }

    /// Returns the message log.
    #[inline]
    #[must_use]
    pub fn message_log(&self) -> &DealMessageLog {
        self.service.message_log()
    }

    /// Returns the store, with retries applied.
    #[must_use]
    pub fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store)
    }
}

impl Drop for DealDesk {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Opens the backend named by `config`, creating tables where needed.
///
/// # Errors
///
/// - `InfrastructureError::Configuration` if a remote backend has no URL
/// - `InfrastructureError::Repository` if the backend cannot be prepared
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn DataStore>, InfrastructureError> {
    let url = || {
        config.url.as_deref().ok_or_else(|| {
            InfrastructureError::configuration(format!(
                "store.url is required for the {} backend",
                config.backend
            ))
        })
    };
    let store: Arc<dyn DataStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryDataStore::new()),
        StoreBackend::Postgres => {
            let store = PostgresDataStore::connect_lazy(url()?, config.max_connections)?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Rest => Arc::new(RestDataStore::new(
            url()?,
            config.api_key.as_deref(),
            config.timeout_ms,
        )?),
    };
    Ok(store)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::market_metrics::StaticMarketMetricsProvider;
    use crate::application::services::notification::InMemoryNotificationSink;
    use crate::domain::entities::deal::tests::sample_new_deal;
    use crate::domain::value_objects::timestamp::Timestamp;
    use crate::domain::value_objects::DealStatus;
    use std::time::Duration;

    fn metrics() -> Arc<dyn MarketMetricsProvider> {
        Arc::new(StaticMarketMetricsProvider::new())
    }

    #[tokio::test]
    async fn memory_backend_builds() {
        let desk = DealDesk::build(&AppConfig::default(), metrics(), Arc::new(InMemoryNotificationSink::new()))
            .await
            .unwrap();
        let deal = desk.service().create_deal(sample_new_deal()).await.unwrap();
        assert_eq!(desk.service().get_deal(deal.id()).await.unwrap(), deal);
    }

    #[tokio::test]
    async fn remote_backend_without_url_fails() {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackend::Rest;
        let err = DealDesk::build(&config, metrics(), Arc::new(InMemoryNotificationSink::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::Configuration(_)));
    }

    #[tokio::test]
    async fn configured_sweeper_runs() {
        let mut config = AppConfig::default();
        config.expiry.sweep_interval_secs = Some(1);
        let desk = DealDesk::build(&config, metrics(), Arc::new(InMemoryNotificationSink::new()))
            .await
            .unwrap();
        let deal = desk
            .service()
            .create_deal(sample_new_deal().with_deadline(Timestamp::now().sub_secs(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_200)).await;

        let messages = desk.message_log().list(deal.id()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            desk.service().get_deal(deal.id()).await.unwrap().status(),
            DealStatus::Expired
        );
    }
}

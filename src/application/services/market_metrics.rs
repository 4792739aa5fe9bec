//! # Market Metrics
//!
//! Port for the booking history and market averages a strategy is computed
//! from.
//!
//! This module provides:
//! - [`MarketMetricsProvider`]: Async trait for obtaining metrics
//! - [`StaticMarketMetricsProvider`]: In-memory table, for tests and the simulator
//! - [`FallbackMarketMetricsProvider`]: Chains multiple providers with fallback
//!
//! # Fallback Chain
//!
//! ```text
//! primary source → secondary source → ... → None
//! ```
//!
//! The first provider that returns a value is used. Provider failures are
//! logged and skipped. If none has a value, `None` is returned and the
//! strategy calculator decides whether the remaining data is enough.

use crate::application::error::ApplicationResult;
use crate::domain::entities::negotiation_strategy::{ArtistMetrics, MarketData};
use crate::domain::value_objects::{DealType, PartyId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of artist history and market averages.
///
/// Returns `Ok(None)` when the provider has no data for the key. Returns
/// `Err` only on infrastructure failures.
#[async_trait]
pub trait MarketMetricsProvider: Send + Sync + fmt::Debug {
    /// Returns the artist's booking history.
    ///
    /// # Errors
    ///
    /// Returns an `ApplicationError` if the provider encounters an
    /// infrastructure failure.
    async fn artist_metrics(&self, artist_id: &PartyId) -> ApplicationResult<Option<ArtistMetrics>>;

    /// Returns the average fee for deals of `deal_type` in `region`.
    ///
    /// # Errors
    ///
    /// Returns an `ApplicationError` if the provider encounters an
    /// infrastructure failure.
    async fn market_data(
        &self,
        deal_type: DealType,
        region: &str,
    ) -> ApplicationResult<Option<MarketData>>;
}

/// Fixed, in-memory metrics.
#[derive(Debug, Default)]
pub struct StaticMarketMetricsProvider {
    artists: RwLock<HashMap<PartyId, ArtistMetrics>>,
    markets: RwLock<HashMap<(DealType, String), MarketData>>,
}

impl StaticMarketMetricsProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artist's history.
    #[must_use]
    pub fn with_artist(self, artist_id: impl Into<PartyId>, metrics: ArtistMetrics) -> Self {
        self.set_artist(artist_id, metrics);
        self
    }

    /// Adds a market average.
    #[must_use]
    pub fn with_market(self, deal_type: DealType, region: impl Into<String>, data: MarketData) -> Self {
        self.set_market(deal_type, region, data);
        self
    }

    /// Replaces an artist's history.
    pub fn set_artist(&self, artist_id: impl Into<PartyId>, metrics: ArtistMetrics) {
        self.artists.write().insert(artist_id.into(), metrics);
    }

    /// Replaces a market average.
    pub fn set_market(&self, deal_type: DealType, region: impl Into<String>, data: MarketData) {
        self.markets.write().insert((deal_type, region.into()), data);
    }
}

#[async_trait]
impl MarketMetricsProvider for StaticMarketMetricsProvider {
    async fn artist_metrics(&self, artist_id: &PartyId) -> ApplicationResult<Option<ArtistMetrics>> {
        Ok(self.artists.read().get(artist_id).cloned())
    }

    async fn market_data(
        &self,
        deal_type: DealType,
        region: &str,
    ) -> ApplicationResult<Option<MarketData>> {
        Ok(self
            .markets
            .read()
            .get(&(deal_type, region.to_string()))
            .cloned())
    }
}

/// A metrics provider that tries multiple providers in order.
#[derive(Debug, Default)]
pub struct FallbackMarketMetricsProvider {
    providers: Vec<Arc<dyn MarketMetricsProvider>>,
}

impl FallbackMarketMetricsProvider {
    /// Creates a new fallback provider from an ordered list of providers.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn MarketMetricsProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl MarketMetricsProvider for FallbackMarketMetricsProvider {
    async fn artist_metrics(&self, artist_id: &PartyId) -> ApplicationResult<Option<ArtistMetrics>> {
        for provider in &self.providers {
            match provider.artist_metrics(artist_id).await {
                Ok(Some(metrics)) => return Ok(Some(metrics)),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        artist_id = %artist_id,
                        error = %e,
                        "artist metrics provider failed, trying next"
                    );
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn market_data(
        &self,
        deal_type: DealType,
        region: &str,
    ) -> ApplicationResult<Option<MarketData>> {
        for provider in &self.providers {
            match provider.market_data(deal_type, region).await {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        deal_type = %deal_type,
                        region,
                        error = %e,
                        "market data provider failed, trying next"
                    );
                    continue;
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::error::{ApplicationError, InfrastructureError};
    use rust_decimal::Decimal;

    #[derive(Debug)]
    struct FailingProvider;

    #[async_trait]
    impl MarketMetricsProvider for FailingProvider {
        async fn artist_metrics(&self, _: &PartyId) -> ApplicationResult<Option<ArtistMetrics>> {
            Err(ApplicationError::from(InfrastructureError::timeout("metrics")))
        }

        async fn market_data(&self, _: DealType, _: &str) -> ApplicationResult<Option<MarketData>> {
            Err(ApplicationError::from(InfrastructureError::network("metrics")))
        }
    }

    fn metrics() -> ArtistMetrics {
        ArtistMetrics::new(12, Decimal::new(900, 0), Decimal::new(1500, 0))
    }

    #[tokio::test]
    async fn static_provider_looks_up_by_key() {
        let provider = StaticMarketMetricsProvider::new()
            .with_artist("artist-1", metrics())
            .with_market(DealType::Booking, "AU-NSW", MarketData::new(Decimal::new(1000, 0)));

        let artist = provider.artist_metrics(&PartyId::new("artist-1")).await.unwrap();
        assert_eq!(artist, Some(metrics()));
        assert!(provider.artist_metrics(&PartyId::new("other")).await.unwrap().is_none());

        let market = provider.market_data(DealType::Booking, "AU-NSW").await.unwrap();
        assert_eq!(market.unwrap().market_average, Decimal::new(1000, 0));
        assert!(provider.market_data(DealType::Endorsement, "AU-NSW").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fallback_skips_failures_and_misses() {
        let empty: Arc<dyn MarketMetricsProvider> = Arc::new(StaticMarketMetricsProvider::new());
        let full: Arc<dyn MarketMetricsProvider> =
            Arc::new(StaticMarketMetricsProvider::new().with_artist("artist-1", metrics()));
        let chain = FallbackMarketMetricsProvider::new(vec![Arc::new(FailingProvider), empty, full]);

        let found = chain.artist_metrics(&PartyId::new("artist-1")).await.unwrap();
        assert_eq!(found, Some(metrics()));
    }

    #[tokio::test]
    async fn fallback_without_data_is_none() {
        let chain = FallbackMarketMetricsProvider::new(vec![Arc::new(FailingProvider)]);
        assert!(chain.market_data(DealType::Booking, "AU").await.unwrap().is_none());
        assert!(FallbackMarketMetricsProvider::default()
            .artist_metrics(&PartyId::new("a"))
            .await
            .unwrap()
            .is_none());
    }
}

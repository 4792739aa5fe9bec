//! dealdesk CLI
//!
//! Usage:
//!   dealdesk config              - Print the effective configuration
//!   dealdesk simulate [OFFERS]   - Run a negotiation against an in-memory store
//!
//! Configuration is read from `--config`, then `DEALDESK__*` variables
//! (a `.env` file is honoured).

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dealdesk::app::DealDesk;
use dealdesk::application::services::{
    AutomatedResponse, FanOutNotificationSink, InMemoryNotificationSink, NotificationSink,
    ResponseAction, StaticMarketMetricsProvider, TracingNotificationSink,
};
use dealdesk::config::{AppConfig, StoreBackend};
use dealdesk::domain::entities::{ArtistMetrics, DealParties, MarketData, NewDeal};
use dealdesk::domain::value_objects::{DealType, PartyId};
use dealdesk::telemetry::init_tracing;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "dealdesk", version, about = "Deal negotiation desk")]
struct Cli {
    /// Configuration file (toml, yaml or json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective configuration as JSON.
    Config,
    /// Negotiate one deal, answering each offer automatically.
    Simulate {
        /// Proposed fee.
        #[arg(long, default_value = "1500")]
        fee: Decimal,
        /// Artist's completed bookings.
        #[arg(long, default_value_t = 12)]
        bookings: u32,
        /// Artist's average fee.
        #[arg(long, default_value = "1400")]
        average_fee: Decimal,
        /// Market average for bookings in the default region.
        #[arg(long)]
        market_average: Option<Decimal>,
        /// Incoming offers, answered in order until the deal closes.
        #[arg(default_values_t = [Decimal::new(900, 0), Decimal::new(1300, 0), Decimal::new(1800, 0)])]
        offers: Vec<Decimal>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.telemetry).context("initialising tracing")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Simulate {
            fee,
            bookings,
            average_fee,
            market_average,
            offers,
        } => {
            simulate(
                &config,
                fee,
                ArtistMetrics::new(bookings, average_fee, average_fee),
                market_average,
                &offers,
            )
            .await
        }
    }
}

async fn simulate(
    config: &AppConfig,
    fee: Decimal,
    artist: ArtistMetrics,
    market_average: Option<Decimal>,
    offers: &[Decimal],
) -> Result<()> {
    if config.store.backend != StoreBackend::Memory {
        bail!("simulate only runs against the memory backend");
    }
    let mut metrics = StaticMarketMetricsProvider::new().with_artist("artist-1", artist);
    if let Some(average) = market_average {
        metrics = metrics.with_market(
            DealType::Booking,
            config.market.default_region.clone(),
            MarketData::new(average),
        );
    }
    let recorded = Arc::new(InMemoryNotificationSink::new());
    let sink: Arc<dyn NotificationSink> = Arc::new(
        FanOutNotificationSink::default()
            .with(Arc::new(TracingNotificationSink))
            .with(recorded.clone()),
    );
    let desk = DealDesk::build(config, Arc::new(metrics), sink).await?;
    let service = desk.service();

    let agency = PartyId::new("agency-1");
    let promoter = PartyId::new("promoter-1");
    let deal = service
        .create_deal(
            NewDeal::new(
                DealType::Booking,
                "Simulated booking",
                DealParties::new("agency-1", "artist-1", "promoter-1", "event-1"),
                fee,
            )
            .with_automation(None, None),
        )
        .await?;
    service.propose(deal.id(), agency).await?;
    let strategy = service
        .refresh_strategy(deal.id(), None)
        .await
        .context("computing strategy")?;
    println!(
        "strategy: {} min={} target={} max={}",
        strategy.negotiation_approach,
        strategy.recommended_minimum,
        strategy.recommended_target,
        strategy.recommended_maximum
    );

    for (n, amount) in offers.iter().enumerate() {
        let offer = service
            .send_offer(deal.id(), promoter.clone(), *amount)
            .await?;
        let key = offer.message.id().to_string();
        let AutomatedResponse { action, deal, .. } = desk
            .engine()
            .evaluate(deal.id(), *amount, promoter.clone(), Some(&key))
            .await?;
        println!("offer {}: {amount} -> {action} ({})", n + 1, deal.status());
        if action != ResponseAction::Escalated {
            break;
        }
    }

    println!("messages:");
    for message in desk.message_log().list(deal.id()).await? {
        println!(
            "  [{}] {} {}: {}",
            message.created_at(),
            message.sender_id(),
            message.message_type(),
            message.content()
        );
    }
    println!("notifications: {}", recorded.len());
    Ok(())
}

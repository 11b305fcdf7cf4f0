// Runs one full crawl pass over every enabled task and exits.

use chain_crawler::{
    cache, config::Config, connection, AddressRegistry, CrawlSettings, Crawler, HistoryClient,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Starting crawl pass: database {}, {} chain(s) configured",
        config.database_url,
        config.chains.len()
    );

    let db_pool = connection::establish_connection(&config.database_url).await?;
    let registry = AddressRegistry::new(db_pool.clone(), cache::init_cache(&config));
    let client = HistoryClient::new(&config)?;
    let crawler = Crawler::new(client, registry, CrawlSettings::from_config(&config));

    // Stop between pages on ctrl-c; the current page still commits
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current page");
            signal_token.cancel();
        }
    });

    let summary = crawler.run_pass(&shutdown).await?;
    info!(
        "Crawl pass finished: {} task(s), {} done, {} interrupted, {} halted",
        summary.tasks, summary.completed, summary.interrupted, summary.failed
    );

    db_pool.close().await;
    Ok(())
}
